use super::{QueryFilter, QueryPage, QueryRequest};
use crate::models::{QrRecord, RecordPatch, SyncStatus};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
}

/// Result of the most recent request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// Records, paging and error slot of one list or search.
///
/// Transitions are `Idle → Loading → Idle`. A failure keeps whatever
/// records were loaded before it.
#[derive(Debug, Clone)]
pub struct QueryState<F> {
    status: LoadStatus,
    last_outcome: Option<Outcome>,
    records: Vec<QrRecord>,
    page: u32,
    total: u64,
    next_cursor: Option<String>,
    filter: Option<F>,
    error: Option<String>,
    pending_append: bool,
    /// Pre-edit copies of records with an optimistic edit outstanding
    snapshots: HashMap<String, QrRecord>,
}

impl<F> Default for QueryState<F> {
    fn default() -> Self {
        QueryState {
            status: LoadStatus::Idle,
            last_outcome: None,
            records: Vec::new(),
            page: 1,
            total: 0,
            next_cursor: None,
            filter: None,
            error: None,
            pending_append: false,
            snapshots: HashMap::new(),
        }
    }
}

impl<F: QueryFilter> QueryState<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, request: &QueryRequest<F>) {
        self.status = LoadStatus::Loading;
        self.error = None;
        self.page = request.page;
        self.filter = Some(request.filter.clone());
        self.pending_append = request.append;
        if !request.append {
            self.records.clear();
            self.snapshots.clear();
        }
    }

    pub fn success(&mut self, page: QueryPage) {
        if self.pending_append {
            self.records.extend(page.items);
        } else {
            self.records = page.items;
        }
        self.page = page.page;
        self.total = page.total;
        self.next_cursor = page.next_cursor;
        self.pending_append = false;
        self.status = LoadStatus::Idle;
        self.last_outcome = Some(Outcome::Succeeded);
    }

    pub fn failure(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.pending_append = false;
        self.status = LoadStatus::Idle;
        self.last_outcome = Some(Outcome::Failed);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Patch the matching record in place and mark it pending.
    ///
    /// Returns the patched record, or `None` when nothing matches. Every
    /// other record is left untouched.
    pub fn apply_update(&mut self, patch: &RecordPatch) -> Option<QrRecord> {
        let idx = self.position(&patch.serial)?;
        let current = &self.records[idx];

        let mut patched = patch.apply(current);
        patched.sync = SyncStatus::Pending;

        // Keep the oldest snapshot when edits stack up
        self.snapshots
            .entry(patch.serial.clone())
            .or_insert_with(|| QrRecord {
                sync: SyncStatus::Synced,
                ..current.clone()
            });

        debug!("Optimistic edit applied to {}", patch.serial);
        self.records[idx] = patched.clone();
        Some(patched)
    }

    /// The backend accepted the edit. A returned server record replaces the
    /// local one.
    pub fn confirm_update(&mut self, serial: &str, server_record: Option<QrRecord>) {
        self.snapshots.remove(serial);
        if let Some(idx) = self.position(serial) {
            let record = &mut self.records[idx];
            if let Some(server) = server_record {
                let key = record.key.clone();
                *record = QrRecord { key, ..server };
            }
            record.sync = SyncStatus::Synced;
        }
    }

    /// The backend rejected the edit; the patch stays visible but unsynced
    pub fn fail_update(&mut self, serial: &str, error: impl Into<String>) {
        let error = error.into();
        warn!("Edit of {} not saved: {}", serial, error);
        if let Some(idx) = self.position(serial) {
            self.records[idx].sync = SyncStatus::Unsynced { error };
        }
    }

    /// Restore the pre-edit record. Returns `false` when there is nothing to
    /// roll back.
    pub fn revert_update(&mut self, serial: &str) -> bool {
        let Some(snapshot) = self.snapshots.remove(serial) else {
            return false;
        };
        match self.position(serial) {
            Some(idx) => {
                self.records[idx] = snapshot;
                true
            }
            None => false,
        }
    }

    fn position(&self, serial: &str) -> Option<usize> {
        self.records.iter().position(|r| r.match_key() == serial)
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    pub fn records(&self) -> &[QrRecord] {
        &self.records
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn next_cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref()
    }

    pub fn filter(&self) -> Option<&F> {
        self.filter.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Records whose latest edit was rejected
    pub fn unsynced(&self) -> impl Iterator<Item = &QrRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.sync, SyncStatus::Unsynced { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ListFilter;

    fn record(serial: &str) -> QrRecord {
        QrRecord {
            key: serial.to_string(),
            serial: serial.to_string(),
            image_url: String::new(),
            qr_url: format!("https://example.com/r/maruon/serial={}", serial),
            message: String::new(),
            created_date: "2025-09-29".to_string(),
            item_name: "maru_on".to_string(),
            sync: SyncStatus::Synced,
        }
    }

    fn page(serials: &[&str], page: u32, total: u64) -> QueryPage {
        QueryPage {
            items: serials.iter().map(|s| record(s)).collect(),
            page,
            total,
            next_cursor: None,
        }
    }

    fn loaded(serials: &[&str]) -> QueryState<ListFilter> {
        let mut state = QueryState::new();
        state.request(&QueryRequest::new(1, ListFilter));
        state.success(page(serials, 1, serials.len() as u64));
        state
    }

    #[test]
    fn test_request_then_success_replaces() {
        let mut state = loaded(&["0001", "0002"]);

        state.request(&QueryRequest::new(2, ListFilter));
        assert!(state.is_loading());
        assert!(state.records().is_empty());

        state.success(page(&["0003"], 2, 3));
        assert_eq!(state.status(), LoadStatus::Idle);
        assert_eq!(state.records().len(), 1);
        assert_eq!(state.records()[0].serial, "0003");
        assert_eq!(state.page(), 2);
        assert_eq!(state.total(), 3);
        assert_eq!(state.last_outcome(), Some(Outcome::Succeeded));
    }

    #[test]
    fn test_append_concatenates() {
        let mut state = loaded(&["0001", "0002"]);

        state.request(&QueryRequest::new(2, ListFilter).append());
        assert_eq!(state.records().len(), 2);

        state.success(page(&["0003", "0004"], 2, 4));
        let serials: Vec<_> = state.records().iter().map(|r| r.serial.as_str()).collect();
        assert_eq!(serials, vec!["0001", "0002", "0003", "0004"]);
    }

    #[test]
    fn test_failure_keeps_records() {
        let mut state = loaded(&["0001"]);
        state.request(&QueryRequest::new(2, ListFilter).append());
        state.failure("boom");

        assert_eq!(state.error(), Some("boom"));
        assert_eq!(state.records().len(), 1);
        assert_eq!(state.last_outcome(), Some(Outcome::Failed));
        assert!(!state.is_loading());

        state.request(&QueryRequest::new(1, ListFilter));
        assert_eq!(state.error(), None);
    }

    #[test]
    fn test_optimistic_update_touches_only_target() {
        let mut state = loaded(&["0001", "0002", "0003"]);
        let before = state.records().to_vec();

        let patched = state
            .apply_update(&RecordPatch::for_serial("0002").message("x"))
            .unwrap();
        assert_eq!(patched.message, "x");
        assert_eq!(patched.sync, SyncStatus::Pending);

        let after = state.records();
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
        assert_eq!(after[1].message, "x");
        assert_eq!(after[1].serial, "0002");

        state.confirm_update("0002", None);
        assert_eq!(state.records()[1].sync, SyncStatus::Synced);
        assert_eq!(state.records()[1].message, "x");
    }

    #[test]
    fn test_failed_update_is_marked_and_revertible() {
        let mut state = loaded(&["0001", "0002"]);
        state.apply_update(&RecordPatch::for_serial("0001").item_name("other"));
        state.fail_update("0001", "server said no");

        assert_eq!(state.records()[0].item_name, "other");
        assert_eq!(
            state.records()[0].sync,
            SyncStatus::Unsynced {
                error: "server said no".to_string()
            }
        );
        assert_eq!(state.unsynced().count(), 1);

        assert!(state.revert_update("0001"));
        assert_eq!(state.records()[0], record("0001"));
        assert!(!state.revert_update("0001"));
    }

    #[test]
    fn test_update_of_unknown_serial_is_noop() {
        let mut state = loaded(&["0001"]);
        assert!(state
            .apply_update(&RecordPatch::for_serial("9999").message("x"))
            .is_none());
        assert_eq!(state.records()[0], record("0001"));
    }

    #[test]
    fn test_reset() {
        let mut state = loaded(&["0001"]);
        state.failure("x");
        state.reset();
        assert!(state.records().is_empty());
        assert_eq!(state.error(), None);
        assert_eq!(state.last_outcome(), None);
        assert!(state.filter().is_none());
        assert_eq!(state.page(), 1);
    }
}
