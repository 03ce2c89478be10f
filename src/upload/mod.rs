// # Batch upload
//
// Generated serials are rendered to QR PNGs and persisted in bounded chunks.
// Chunks go out strictly in order; the first failure stops the batch and
// leaves earlier chunks committed.

mod pipeline;
mod progress;

pub use pipeline::UploadPipeline;
pub use progress::UploadProgress;

use crate::api::ApiError;
use std::time::Duration;
use thiserror::Error;

/// How a chunk is sent to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitMode {
    /// One request carrying the whole chunk
    #[default]
    Batch,
    /// One request per record, in order
    PerRecord,
}

/// Chunking, pacing and labelling of uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub chunk_size: usize,
    /// Pause between chunks, never after the last one
    pub chunk_delay: Option<Duration>,
    pub submit_mode: SubmitMode,
    /// Batches larger than this need confirmation
    pub confirm_threshold: usize,
    pub item_name: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            chunk_size: 200,
            chunk_delay: None,
            submit_mode: SubmitMode::Batch,
            confirm_threshold: 1000,
            item_name: "maru_on".to_string(),
        }
    }
}

impl UploadConfig {
    /// One record per request with a one second pause, for rate-limited backends
    pub fn throttled() -> Self {
        UploadConfig {
            chunk_size: 1,
            chunk_delay: Some(Duration::from_millis(1000)),
            ..Default::default()
        }
    }
}

/// Confirmation policy for large batches
pub enum Confirm {
    /// Proceed without asking
    Bypass,
    /// Ask with the item count; `false` aborts before anything is sent.
    /// Runs on the blocking pool, and a panic counts as a refusal.
    Ask(Box<dyn FnOnce(usize) -> bool + Send>),
}

impl Confirm {
    pub fn ask(f: impl FnOnce(usize) -> bool + Send + 'static) -> Self {
        Confirm::Ask(Box::new(f))
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Nothing to upload")]
    Empty,
    #[error("Upload of {count} items was not confirmed")]
    NotConfirmed { count: usize },
    #[error("Rendering chunk {chunk_index} failed after {committed} saved: {reason}")]
    Render {
        chunk_index: usize,
        committed: usize,
        reason: String,
    },
    #[error("Saving chunk {chunk_index} failed after {committed} saved: {source}")]
    Chunk {
        chunk_index: usize,
        committed: usize,
        #[source]
        source: ApiError,
    },
}

impl UploadError {
    /// Records persisted before the failure
    pub fn committed(&self) -> usize {
        match self {
            UploadError::Render { committed, .. } | UploadError::Chunk { committed, .. } => {
                *committed
            }
            UploadError::Empty | UploadError::NotConfirmed { .. } => 0,
        }
    }
}

/// Summary of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub total: usize,
    pub chunks: usize,
    pub created_date: String,
}
