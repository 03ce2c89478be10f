use tokio::sync::mpsc as tokio_mpsc;
use tracing::trace;

/// Status events emitted while a batch is uploaded
#[derive(Debug, Clone, PartialEq)]
pub enum UploadProgress {
    Started {
        total: usize,
    },
    SaveRequested {
        chunk_index: usize,
        size: usize,
    },
    SaveSucceeded {
        chunk_index: usize,
        processed: usize,
        total: usize,
        percent: u8,
    },
    SaveFailed {
        chunk_index: usize,
        error: String,
    },
    Complete {
        total: usize,
    },
}

/// Sends progress to an optional listener; a dropped receiver is ignored
#[derive(Clone, Default)]
pub(super) struct ProgressEmitter {
    tx: Option<tokio_mpsc::UnboundedSender<UploadProgress>>,
}

impl ProgressEmitter {
    pub(super) fn new(tx: Option<tokio_mpsc::UnboundedSender<UploadProgress>>) -> Self {
        Self { tx }
    }

    pub(super) fn emit(&self, event: UploadProgress) {
        trace!("Upload progress: {:?}", event);
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub(super) fn chunk_done(&self, chunk_index: usize, done: usize, total: usize) {
        let processed = done.min(total);
        self.emit(UploadProgress::SaveSucceeded {
            chunk_index,
            processed,
            total,
            percent: calculate_progress(processed, total),
        });
    }
}

/// Calculate progress percentage
pub(super) fn calculate_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        ((completed as f64 / total as f64) * 100.0).min(100.0) as u8
    }
}
