use crate::serial::Serial;
use serde::{Deserialize, Serialize};

/// One serial produced by the range generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedItem {
    pub code: Serial,
    pub token: String,
    pub url: String,
}

/// Local synchronization marker for optimistic edits
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Synced,
    /// Patched locally, update request in flight
    Pending,
    /// Patched locally, but the backend rejected the update
    Unsynced { error: String },
}

/// A stored QR record as displayed by the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRecord {
    /// Stable row key (id, serial or code, else `page-index`)
    pub key: String,
    pub serial: String,
    /// Base64 PNG body, data URL, or remote URL
    pub image_url: String,
    pub qr_url: String,
    pub message: String,
    pub created_date: String,
    pub item_name: String,
    #[serde(skip)]
    pub sync: SyncStatus,
}

impl QrRecord {
    /// Key used to match edits: the serial, or the row key when empty
    pub fn match_key(&self) -> &str {
        if self.serial.is_empty() {
            &self.key
        } else {
            &self.serial
        }
    }

    /// Full update payload for this record
    pub fn to_update_request(&self) -> QrUpdateRequest {
        QrUpdateRequest {
            image_url: self.image_url.clone(),
            qr_url: self.qr_url.clone(),
            serial: self.serial.clone(),
            message: self.message.clone(),
            created_date: self.created_date.clone(),
            item_name: self.item_name.clone(),
            key: self.key.clone(),
        }
    }
}

/// Editable fields of a record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub serial: String,
    pub message: Option<String>,
    pub created_date: Option<String>,
    pub item_name: Option<String>,
}

impl RecordPatch {
    pub fn for_serial(serial: impl Into<String>) -> Self {
        RecordPatch {
            serial: serial.into(),
            ..Default::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn created_date(mut self, date: impl Into<String>) -> Self {
        self.created_date = Some(date.into());
        self
    }

    pub fn item_name(mut self, name: impl Into<String>) -> Self {
        self.item_name = Some(name.into());
        self
    }

    /// Apply onto a copy of `record`
    pub fn apply(&self, record: &QrRecord) -> QrRecord {
        let mut patched = record.clone();
        if let Some(message) = &self.message {
            patched.message = message.clone();
        }
        if let Some(date) = &self.created_date {
            patched.created_date = date.clone();
        }
        if let Some(name) = &self.item_name {
            patched.item_name = name.clone();
        }
        patched
    }
}

/// Create payload accepted by `POST /api/admin/qr`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCreateRequest {
    /// Base64 PNG body without the data-URL header
    pub image: String,
    pub qr_url: String,
    pub serial: String,
    pub created_date: String,
    pub item_name: String,
}

/// Update payload accepted by `PUT /api/admin/qr/{serial}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrUpdateRequest {
    pub image_url: String,
    pub qr_url: String,
    pub serial: String,
    pub message: String,
    pub created_date: String,
    pub item_name: String,
    pub key: String,
}

/// Login response body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(alias = "token")]
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub role: Option<serde_json::Value>,
}
