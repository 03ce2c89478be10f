use super::progress::ProgressEmitter;
use super::{Confirm, SubmitMode, UploadConfig, UploadError, UploadProgress, UploadReport};
use crate::api::{ApiError, QrBackend};
use crate::models::{GeneratedItem, QrCreateRequest};
use crate::qr_image::QrImageEncoder;
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{error, info, warn};

/// Renders generated items to QR images and saves them chunk by chunk.
///
/// Rendering within a chunk runs on the blocking pool in parallel; the
/// chunks themselves are saved strictly one after another.
pub struct UploadPipeline {
    backend: Arc<dyn QrBackend>,
    encoder: QrImageEncoder,
    config: UploadConfig,
    progress: ProgressEmitter,
    created_date: Option<NaiveDate>,
}

impl UploadPipeline {
    pub fn new(backend: Arc<dyn QrBackend>, encoder: QrImageEncoder, config: UploadConfig) -> Self {
        Self {
            backend,
            encoder,
            config,
            progress: ProgressEmitter::default(),
            created_date: None,
        }
    }

    /// Send status events to `tx`
    pub fn with_progress(mut self, tx: tokio_mpsc::UnboundedSender<UploadProgress>) -> Self {
        self.progress = ProgressEmitter::new(Some(tx));
        self
    }

    /// Stamp records with `date` instead of today's local date
    pub fn with_created_date(mut self, date: NaiveDate) -> Self {
        self.created_date = Some(date);
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload every item.
    ///
    /// Nothing is sent for an empty batch or when a large batch is not
    /// confirmed. On a failed chunk the error reports how many records were
    /// already saved; those are not rolled back.
    pub async fn upload(
        &self,
        items: &[GeneratedItem],
        confirm: Confirm,
    ) -> Result<UploadReport, UploadError> {
        if items.is_empty() {
            warn!("Upload requested with no generated items");
            return Err(UploadError::Empty);
        }

        let total = items.len();
        if total > self.config.confirm_threshold {
            if let Confirm::Ask(ask) = confirm {
                // The callback may block on a terminal prompt
                let confirmed = match tokio::task::spawn_blocking(move || ask(total)).await {
                    Ok(confirmed) => confirmed,
                    Err(e) => {
                        warn!("Upload confirmation failed: {}", e);
                        false
                    }
                };
                if !confirmed {
                    info!("Upload of {} items cancelled at confirmation", total);
                    return Err(UploadError::NotConfirmed { count: total });
                }
            }
        }

        let created_date = self
            .created_date
            .unwrap_or_else(|| Local::now().date_naive())
            .format("%Y-%m-%d")
            .to_string();
        let chunk_size = self.config.chunk_size.max(1);
        let chunk_count = total.div_ceil(chunk_size);

        info!(
            "UploadPipeline: {} items in {} chunks of up to {} ({:?})",
            total, chunk_count, chunk_size, self.config.submit_mode
        );
        self.progress.emit(UploadProgress::Started { total });

        let mut committed = 0;
        for (chunk_index, chunk) in items.chunks(chunk_size).enumerate() {
            self.progress.emit(UploadProgress::SaveRequested {
                chunk_index,
                size: chunk.len(),
            });

            let requests = match self.render_chunk(chunk, &created_date).await {
                Ok(requests) => requests,
                Err(reason) => {
                    error!("Rendering chunk {} failed: {}", chunk_index, reason);
                    self.progress.emit(UploadProgress::SaveFailed {
                        chunk_index,
                        error: reason.clone(),
                    });
                    return Err(UploadError::Render {
                        chunk_index,
                        committed,
                        reason,
                    });
                }
            };

            if let Err((saved, source)) = self.submit_chunk(&requests).await {
                committed += saved;
                error!(
                    "Saving chunk {} failed with {} records committed: {}",
                    chunk_index, committed, source
                );
                self.progress.emit(UploadProgress::SaveFailed {
                    chunk_index,
                    error: source.user_message(),
                });
                return Err(UploadError::Chunk {
                    chunk_index,
                    committed,
                    source,
                });
            }

            committed += requests.len();
            self.progress.chunk_done(chunk_index, committed, total);
            info!(
                "  Chunk {}/{} saved ({}/{})",
                chunk_index + 1,
                chunk_count,
                committed.min(total),
                total
            );

            if chunk_index + 1 < chunk_count {
                if let Some(delay) = self.config.chunk_delay {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.progress.emit(UploadProgress::Complete { total });
        info!("UploadPipeline: saved {} records", total);

        Ok(UploadReport {
            total,
            chunks: chunk_count,
            created_date,
        })
    }

    /// Render a chunk's QR images in parallel, keeping input order
    async fn render_chunk(
        &self,
        chunk: &[GeneratedItem],
        created_date: &str,
    ) -> Result<Vec<QrCreateRequest>, String> {
        let renders = chunk.iter().map(|item| {
            let encoder = self.encoder;
            let url = item.url.clone();
            tokio::task::spawn_blocking(move || encoder.render(&url))
        });
        let images = futures::future::join_all(renders).await;

        chunk
            .iter()
            .zip(images)
            .map(|(item, joined)| -> Result<QrCreateRequest, String> {
                let image = joined
                    .map_err(|e| format!("render task for {} failed: {}", item.code, e))?
                    .map_err(|e| format!("{}: {}", item.code, e))?;
                Ok(QrCreateRequest {
                    image,
                    qr_url: item.url.clone(),
                    serial: item.code.to_string(),
                    created_date: created_date.to_string(),
                    item_name: self.config.item_name.clone(),
                })
            })
            .collect()
    }

    /// Save one chunk. On failure, returns how many of its records were saved.
    async fn submit_chunk(&self, requests: &[QrCreateRequest]) -> Result<(), (usize, ApiError)> {
        match self.config.submit_mode {
            SubmitMode::Batch => self
                .backend
                .create_batch(requests)
                .await
                .map(|_| ())
                .map_err(|e| (0, e)),
            SubmitMode::PerRecord => {
                for (saved, request) in requests.iter().enumerate() {
                    self.backend
                        .create(request)
                        .await
                        .map_err(|e| (saved, e))?;
                }
                Ok(())
            }
        }
    }
}
