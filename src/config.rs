use crate::api::ListSchema;
use crate::qr_image::QrImageOptions;
use crate::query::PageBase;
use crate::upload::{SubmitMode, UploadConfig};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration
///
/// Loaded once at startup. Everything except the token key material has a
/// default, so a bare `.env` with `QR_AES_KEY` and `QR_AES_IV` is enough.
#[derive(Clone, Debug)]
pub struct Config {
    /// Origin of the admin REST API
    pub api_base_url: String,
    /// Redirect base that generated QR URLs point at
    pub redirect_base_url: String,
    /// Token key material (UTF-8, 16/24/32 bytes)
    pub aes_key: String,
    /// Token IV (UTF-8, 16 bytes)
    pub aes_iv: String,
    /// Debug-level logging
    pub debug: bool,
    /// Server pages are numbered from zero
    pub page_base: PageBase,
    pub list_schema: ListSchema,
    pub upload: UploadConfig,
    pub image: QrImageOptions,
}

impl Config {
    /// Load configuration from `.env` (if present) and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_ok() {
            info!("Config: loaded .env file");
        } else {
            debug!("Config: no .env file found, using process environment");
        }

        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let aes_key = get("QR_AES_KEY").ok_or(ConfigError::Missing("QR_AES_KEY"))?;
        let aes_iv = get("QR_AES_IV").ok_or(ConfigError::Missing("QR_AES_IV"))?;

        let api_base_url =
            get("QR_API_BASE_URL").unwrap_or_else(|| "http://localhost:8080".to_string());
        let redirect_base_url =
            get("QR_BASE_URL").unwrap_or_else(|| "https://yourdomain.com/r".to_string());

        let debug = parse_bool("QR_DEBUG", get("QR_DEBUG"), false)?;
        let zero_based = parse_bool("QR_ZERO_BASED", get("QR_ZERO_BASED"), true)?;

        let list_schema = match get("QR_LIST_SCHEMA").as_deref() {
            None | Some("tolerant") => ListSchema::Tolerant,
            Some("strict") => ListSchema::Strict,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "QR_LIST_SCHEMA",
                    value: other.to_string(),
                })
            }
        };

        let defaults = UploadConfig::default();
        let submit_mode = match get("QR_UPLOAD_MODE").as_deref() {
            None | Some("batch") => SubmitMode::Batch,
            Some("per-record") => SubmitMode::PerRecord,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "QR_UPLOAD_MODE",
                    value: other.to_string(),
                })
            }
        };

        let upload = UploadConfig {
            chunk_size: parse_num("QR_UPLOAD_CHUNK_SIZE", get("QR_UPLOAD_CHUNK_SIZE"))?
                .unwrap_or(defaults.chunk_size)
                .max(1),
            chunk_delay: parse_num("QR_UPLOAD_DELAY_MS", get("QR_UPLOAD_DELAY_MS"))?
                .map(Duration::from_millis)
                .filter(|d| !d.is_zero()),
            submit_mode,
            confirm_threshold: parse_num("QR_CONFIRM_THRESHOLD", get("QR_CONFIRM_THRESHOLD"))?
                .unwrap_or(defaults.confirm_threshold),
            item_name: get("QR_ITEM_NAME").unwrap_or(defaults.item_name),
        };

        let image_defaults = QrImageOptions::default();
        let image = QrImageOptions {
            size: parse_num("QR_IMAGE_SIZE", get("QR_IMAGE_SIZE"))?.unwrap_or(image_defaults.size),
            margin: parse_num("QR_IMAGE_MARGIN", get("QR_IMAGE_MARGIN"))?
                .unwrap_or(image_defaults.margin),
        };

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            redirect_base_url,
            aes_key,
            aes_iv,
            debug,
            page_base: if zero_based {
                PageBase::Zero
            } else {
                PageBase::One
            },
            list_schema,
            upload,
            image,
        })
    }

    /// Default directory for exported files
    pub fn export_dir(&self) -> std::path::PathBuf {
        dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| std::path::PathBuf::from("."))
    }
}

fn parse_bool(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value: v }),
        },
    }
}

fn parse_num<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid { name, value: v })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_missing_key_material_is_fatal() {
        let err = Config::from_vars(lookup(&[("QR_AES_IV", "0123456789abcdef")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("QR_AES_KEY")));

        let err = Config::from_vars(lookup(&[("QR_AES_KEY", "0123456789abcdef")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("QR_AES_IV")));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(lookup(&[
            ("QR_AES_KEY", "0123456789abcdef"),
            ("QR_AES_IV", "fedcba9876543210"),
        ]))
        .unwrap();

        assert_eq!(config.page_base, PageBase::Zero);
        assert_eq!(config.list_schema, ListSchema::Tolerant);
        assert_eq!(config.upload.chunk_size, 200);
        assert_eq!(config.upload.chunk_delay, None);
        assert_eq!(config.upload.submit_mode, SubmitMode::Batch);
        assert_eq!(config.upload.confirm_threshold, 1000);
        assert_eq!(config.upload.item_name, "maru_on");
        assert_eq!(config.image.size, 256);
        assert_eq!(config.image.margin, 2);
        assert!(!config.debug);
    }

    #[test]
    fn test_throttled_upload_from_env() {
        let config = Config::from_vars(lookup(&[
            ("QR_AES_KEY", "0123456789abcdef"),
            ("QR_AES_IV", "fedcba9876543210"),
            ("QR_UPLOAD_CHUNK_SIZE", "1"),
            ("QR_UPLOAD_DELAY_MS", "1000"),
            ("QR_UPLOAD_MODE", "per-record"),
            ("QR_ZERO_BASED", "false"),
            ("QR_API_BASE_URL", "https://api.example.com/"),
        ]))
        .unwrap();

        assert_eq!(config.upload.chunk_size, 1);
        assert_eq!(config.upload.chunk_delay, Some(Duration::from_millis(1000)));
        assert_eq!(config.upload.submit_mode, SubmitMode::PerRecord);
        assert_eq!(config.page_base, PageBase::One);
        assert_eq!(config.api_base_url, "https://api.example.com");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Config::from_vars(lookup(&[
            ("QR_AES_KEY", "0123456789abcdef"),
            ("QR_AES_IV", "fedcba9876543210"),
            ("QR_UPLOAD_CHUNK_SIZE", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "QR_UPLOAD_CHUNK_SIZE",
                ..
            }
        ));
    }
}
