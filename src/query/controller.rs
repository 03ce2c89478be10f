use super::{PageBase, QueryFilter, QueryPage, QueryRequest, QueryState};
use crate::api::{normalize_list_response, ApiError, ListSchema, QrBackend};
use crate::models::{QrRecord, RecordPatch};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one [`QueryState`] against the backend
pub struct QueryController<F> {
    backend: Arc<dyn QrBackend>,
    state: QueryState<F>,
    page_base: PageBase,
    schema: ListSchema,
}

impl<F: QueryFilter> QueryController<F> {
    pub fn new(backend: Arc<dyn QrBackend>, page_base: PageBase, schema: ListSchema) -> Self {
        QueryController {
            backend,
            state: QueryState::new(),
            page_base,
            schema,
        }
    }

    pub fn state(&self) -> &QueryState<F> {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Request a page and fold the outcome into the state.
    ///
    /// On error the message lands in the state's error slot and the error is
    /// also returned to the caller.
    pub async fn fetch(&mut self, request: QueryRequest<F>) -> Result<&QueryState<F>, ApiError> {
        let params = request.params(self.page_base);
        self.state.request(&request);

        let result = async {
            let raw = self.backend.list(&params).await?;
            normalize_list_response(&raw, request.page, self.schema)
        }
        .await;

        match result {
            Ok(page) => {
                debug!(
                    "Page {} loaded: {} records of {}",
                    request.page,
                    page.items.len(),
                    page.total
                );
                self.state.success(QueryPage {
                    items: page.items,
                    page: request.page,
                    total: page.total,
                    next_cursor: page.next_cursor,
                });
                Ok(&self.state)
            }
            Err(e) => {
                warn!("Query for page {} failed: {}", request.page, e);
                self.state.failure(e.user_message());
                Err(e)
            }
        }
    }

    /// Edit a record optimistically, then send the full record to the backend.
    ///
    /// Returns `Ok(None)` when no loaded record matches the patch.
    pub async fn update(&mut self, patch: RecordPatch) -> Result<Option<QrRecord>, ApiError> {
        let Some(patched) = self.state.apply_update(&patch) else {
            warn!("No loaded record matches {}", patch.serial);
            return Ok(None);
        };

        match self.backend.update(&patched.to_update_request()).await {
            Ok(body) => {
                // Some backends echo the stored record; an empty body keeps the patch
                let server = if body.is_object() {
                    Some(crate::api::normalize_record(&body, self.state.page(), 0))
                        .filter(|r| r.match_key() == patched.match_key())
                } else {
                    None
                };
                self.state.confirm_update(&patch.serial, server);
                info!("Saved edit of {}", patch.serial);
                Ok(self
                    .state
                    .records()
                    .iter()
                    .find(|r| r.match_key() == patch.serial)
                    .cloned())
            }
            Err(e) => {
                self.state.fail_update(&patch.serial, e.user_message());
                Err(e)
            }
        }
    }
}
