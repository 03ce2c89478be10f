// Test support utilities for both unit and integration tests

use crate::api::{ApiError, QrBackend, QueryParams};
use crate::export::{ExportError, ImageFetcher};
use crate::models::{LoginResponse, QrCreateRequest, QrUpdateRequest};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

/// A request received by [`MockQrBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Login { email: String },
    List(QueryParams),
    Create(QrCreateRequest),
    CreateBatch(Vec<QrCreateRequest>),
    Update(QrUpdateRequest),
}

/// Mock admin backend for testing
///
/// Keeps created records in memory and records every call, including calls
/// that were made to fail.
#[derive(Default)]
pub struct MockQrBackend {
    calls: Mutex<Vec<MockCall>>,
    stored: Mutex<Vec<QrCreateRequest>>,
    list_responses: Mutex<Vec<Value>>,
    failures: Mutex<HashMap<usize, (u16, String)>>,
}

impl MockQrBackend {
    /// Create a new mock backend
    #[allow(unused)] // Used in tests
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `index`-th call (0-based, across all methods) fail
    pub fn fail_on_call(&self, index: usize, status: u16, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(index, (status, message.to_string()));
    }

    /// Queue a raw body for the next `list` call. Without one, `list`
    /// returns every stored record as `{ items, total }`.
    pub fn push_list_response(&self, body: Value) {
        self.list_responses.lock().unwrap().push(body);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stored(&self) -> Vec<QrCreateRequest> {
        self.stored.lock().unwrap().clone()
    }

    fn record_call(&self, call: MockCall) -> Result<(), ApiError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len() - 1
        };
        match self.failures.lock().unwrap().remove(&index) {
            Some((401, message)) => Err(ApiError::Unauthorized(message)),
            Some((status, message)) => Err(ApiError::Status { status, message }),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl QrBackend for MockQrBackend {
    async fn login(&self, email: &str, _password: &str) -> Result<LoginResponse, ApiError> {
        self.record_call(MockCall::Login {
            email: email.to_string(),
        })?;
        Ok(LoginResponse {
            access_token: Some("mock-access-token".to_string()),
            refresh_token: Some("mock-refresh-token".to_string()),
            role: Some(json!("ADMIN")),
        })
    }

    async fn list(&self, params: &QueryParams) -> Result<Value, ApiError> {
        self.record_call(MockCall::List(params.clone()))?;

        let mut queued = self.list_responses.lock().unwrap();
        if !queued.is_empty() {
            return Ok(queued.remove(0));
        }

        let stored = self.stored.lock().unwrap();
        Ok(json!({
            "items": serde_json::to_value(&*stored)?,
            "total": stored.len(),
        }))
    }

    async fn create(&self, record: &QrCreateRequest) -> Result<Value, ApiError> {
        self.record_call(MockCall::Create(record.clone()))?;
        self.stored.lock().unwrap().push(record.clone());
        Ok(json!({ "serial": record.serial }))
    }

    async fn create_batch(&self, records: &[QrCreateRequest]) -> Result<Value, ApiError> {
        self.record_call(MockCall::CreateBatch(records.to_vec()))?;
        self.stored.lock().unwrap().extend_from_slice(records);
        Ok(json!({ "saved": records.len() }))
    }

    async fn update(&self, record: &QrUpdateRequest) -> Result<Value, ApiError> {
        self.record_call(MockCall::Update(record.clone()))?;
        Ok(serde_json::to_value(record)?)
    }
}

/// Mock image source for export tests
///
/// Serves registered URLs from memory; anything else fails like an
/// unreachable host.
#[derive(Default)]
pub struct MockImageFetcher {
    images: Mutex<HashMap<String, Vec<u8>>>,
    fetched: Mutex<Vec<String>>,
}

impl MockImageFetcher {
    #[allow(unused)] // Used in tests
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.images.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ImageFetcher for MockImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ExportError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.images
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ExportError::Fetch(format!("Image not found: {}", url)))
    }
}
