// # Backend API
//
// - **QrBackend**: async seam to the admin REST API (mocked in tests)
// - **HttpQrBackend**: reqwest implementation carrying the session credential
// - **normalize**: maps loosely-shaped list responses into `QrRecord`s

mod client;
pub mod normalize;

use crate::models::{LoginResponse, QrCreateRequest, QrUpdateRequest};
use crate::session::SessionError;
use serde_json::Value;
use thiserror::Error;

pub use client::{HttpQrBackend, AUTHLESS_PATHS, LOGIN_PATH, QR_PATH};
pub use normalize::{normalize_list_response, normalize_record, ListSchema, NormalizedPage};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Unexpected response shape: {0}")]
    Schema(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl ApiError {
    /// Message suitable for an error slot or alert
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Unauthorized(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Query string parameters in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

/// Trait for the admin REST API (allows mocking for tests)
#[async_trait::async_trait]
pub trait QrBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError>;

    /// List or search; the raw body goes through [`normalize_list_response`]
    async fn list(&self, params: &QueryParams) -> Result<Value, ApiError>;

    async fn create(&self, record: &QrCreateRequest) -> Result<Value, ApiError>;

    /// Create several records in one request
    async fn create_batch(&self, records: &[QrCreateRequest]) -> Result<Value, ApiError>;

    async fn update(&self, record: &QrUpdateRequest) -> Result<Value, ApiError>;
}
