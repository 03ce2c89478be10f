use crate::models::QrRecord;
use crate::qr_image::{strip_data_url_header, to_image_src};
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::stream::{self, StreamExt};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Concurrent image fetches during a ZIP export
const MAX_CONCURRENT_FETCHES: usize = 10;

const UTF8_BOM: &str = "\u{FEFF}";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Nothing to export: select records or run a search first")]
    NothingToExport,
    #[error("Record {0} has no image")]
    NoImage(String),
    #[error("Image fetch failed: {0}")]
    Fetch(String),
    #[error("Image decode failed: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of remote QR images
#[async_trait::async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ExportError>;
}

/// Fetches images over HTTP
#[derive(Clone, Default)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ExportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExportError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExportError::Fetch(format!("{} returned {}", url, response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExportError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// A generated file ready to be saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// Save into `dir`, returning the full path
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        info!("Saved {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Result of a single-image download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDownload {
    Bytes { file_name: String, bytes: Vec<u8> },
    /// The image could not be fetched; hand the URL to the operator instead
    OpenExternally(String),
}

/// The selected records, or every displayed record when nothing is selected
pub fn select_targets(
    displayed: &[QrRecord],
    selection: &[String],
) -> Result<Vec<QrRecord>, ExportError> {
    let targets: Vec<QrRecord> = if selection.is_empty() {
        displayed.to_vec()
    } else {
        displayed
            .iter()
            .filter(|r| selection.iter().any(|s| *s == r.serial))
            .cloned()
            .collect()
    };

    if targets.is_empty() {
        warn!("Export requested with nothing to export");
        return Err(ExportError::NothingToExport);
    }
    Ok(targets)
}

/// Archive entry name for a record's image
pub fn image_file_name(record: &QrRecord) -> String {
    if record.serial.is_empty() {
        "qr_image.png".to_string()
    } else {
        format!("qr_{}.png", record.serial)
    }
}

/// Bundle every record's image into `qrs/` inside a DEFLATE ZIP.
///
/// Images that fail to fetch or decode are logged and left out.
pub async fn export_zip(
    records: &[QrRecord],
    fetcher: &dyn ImageFetcher,
) -> Result<ExportArtifact, ExportError> {
    if records.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    info!("Preparing ZIP of {} QR images...", records.len());
    let mut images: Vec<(usize, String, Vec<u8>)> = stream::iter(records.iter().enumerate())
        .map(|(idx, record)| async move {
            match resolve_image(record, fetcher).await {
                Ok(bytes) => Some((idx, image_file_name(record), bytes)),
                Err(e) => {
                    warn!("Skipping image for {:?}: {}", record.serial, e);
                    None
                }
            }
        })
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .filter_map(|entry| async move { entry })
        .collect()
        .await;

    // Archive order follows record order, not fetch completion
    images.sort_by_key(|(idx, _, _)| *idx);

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.add_directory("qrs/", options)?;

    let mut seen = HashSet::new();
    for (_, file_name, bytes) in &images {
        if !seen.insert(file_name.clone()) {
            debug!("Duplicate entry {} skipped", file_name);
            continue;
        }
        zip.start_file(format!("qrs/{}", file_name), options)?;
        zip.write_all(bytes)?;
    }
    let bytes = zip.finish()?.into_inner();

    let (start, end) = serial_bounds(records);
    let file_name = format!("qr_{}-{}.zip", start, end);
    info!(
        "ZIP {} ready: {} of {} images ({} bytes)",
        file_name,
        seen.len(),
        records.len(),
        bytes.len()
    );

    Ok(ExportArtifact { file_name, bytes })
}

/// Serial and QR URL of every record as a BOM-prefixed CSV
pub fn export_csv(records: &[QrRecord]) -> Result<ExportArtifact, ExportError> {
    if records.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push("Serial,QR URL".to_string());
    lines.extend(
        records
            .iter()
            .map(|r| format!("{},{}", csv_field(&r.serial), csv_field(&r.qr_url))),
    );
    let body = format!("{}{}", UTF8_BOM, lines.join("\n"));

    let (start, end) = serial_bounds(records);
    Ok(ExportArtifact {
        file_name: format!("qr_urls_{}-{}.csv", start, end),
        bytes: body.into_bytes(),
    })
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Smallest and largest serial for naming an export, made file-name safe.
///
/// Purely numeric serials are compared by value; otherwise a natural,
/// case-insensitive order applies. No serials gives
/// `("start", "end")`.
pub fn serial_bounds(records: &[QrRecord]) -> (String, String) {
    let serials: Vec<&str> = records
        .iter()
        .map(|r| r.serial.trim())
        .filter(|s| !s.is_empty())
        .collect();

    let Some(first) = serials.first().copied() else {
        return ("start".to_string(), "end".to_string());
    };

    let (min, max) = if serials.iter().all(|s| s.chars().all(|c| c.is_ascii_digit())) {
        let mut min = first;
        let mut max = first;
        for &s in &serials[1..] {
            if digits_cmp(s, min) == Ordering::Less {
                min = s;
            }
            if digits_cmp(s, max) == Ordering::Greater {
                max = s;
            }
        }
        (min, max)
    } else {
        let mut sorted = serials.clone();
        sorted.sort_by(|a, b| natural_cmp(a, b));
        (sorted[0], sorted[sorted.len() - 1])
    };

    (file_name_safe(min), file_name_safe(max))
}

/// Compare digit strings by numeric value
fn digits_cmp(a: &str, b: &str) -> Ordering {
    let value = |s: &str| {
        let digits: String = s.chars().filter(char::is_ascii_digit).collect();
        digits.trim_start_matches('0').to_string()
    };
    let (a, b) = (value(a), value(b));
    a.len().cmp(&b.len()).then_with(|| a.cmp(&b))
}

/// Case-insensitive order where digit runs compare by value
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let mut run_a = String::new();
                while let Some(c) = a.next_if(char::is_ascii_digit) {
                    run_a.push(c);
                }
                let mut run_b = String::new();
                while let Some(c) = b.next_if(char::is_ascii_digit) {
                    run_b.push(c);
                }
                let ord = digits_cmp(&run_a, &run_b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.to_lowercase().cmp(y.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                a.next();
                b.next();
            }
        }
    }
}

/// Strip characters that are not allowed in file names
fn file_name_safe(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Bytes of a record's image, decoded in place or fetched
async fn resolve_image(
    record: &QrRecord,
    fetcher: &dyn ImageFetcher,
) -> Result<Vec<u8>, ExportError> {
    let src = to_image_src(&record.image_url);
    if src.is_empty() {
        return Err(ExportError::NoImage(record.serial.clone()));
    }
    if src.starts_with("data:image") {
        Ok(STANDARD.decode(strip_data_url_header(&src))?)
    } else {
        fetcher.fetch(&src).await
    }
}

/// Download one record's image.
///
/// A remote image that cannot be fetched is returned as
/// [`ImageDownload::OpenExternally`].
pub async fn download_image(
    record: &QrRecord,
    fetcher: &dyn ImageFetcher,
) -> Result<ImageDownload, ExportError> {
    if record.image_url.is_empty() {
        warn!("Record {} has no image", record.serial);
        return Err(ExportError::NoImage(record.serial.clone()));
    }

    let file_name = image_file_name(record);
    match resolve_image(record, fetcher).await {
        Ok(bytes) => Ok(ImageDownload::Bytes { file_name, bytes }),
        Err(ExportError::Fetch(reason)) => {
            warn!("Fetching image for {} failed: {}", record.serial, reason);
            Ok(ImageDownload::OpenExternally(to_image_src(&record.image_url)))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;

    fn record(serial: &str) -> QrRecord {
        QrRecord {
            key: serial.to_string(),
            serial: serial.to_string(),
            image_url: String::new(),
            qr_url: format!("https://example.com/r/maruon/serial={}?token=t", serial),
            message: String::new(),
            created_date: String::new(),
            item_name: String::new(),
            sync: SyncStatus::Synced,
        }
    }

    fn records(serials: &[&str]) -> Vec<QrRecord> {
        serials.iter().map(|s| record(s)).collect()
    }

    #[test]
    fn test_select_targets() {
        let displayed = records(&["0001", "0002", "0003"]);

        let all = select_targets(&displayed, &[]).unwrap();
        assert_eq!(all.len(), 3);

        let picked = select_targets(&displayed, &["0003".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].serial, "0003");

        assert!(matches!(
            select_targets(&[], &[]),
            Err(ExportError::NothingToExport)
        ));
        assert!(matches!(
            select_targets(&displayed, &["9999".to_string()]),
            Err(ExportError::NothingToExport)
        ));
    }

    #[test]
    fn test_bounds_numeric() {
        assert_eq!(
            serial_bounds(&records(&["0010", "0002", "0100"])),
            ("0002".to_string(), "0100".to_string())
        );
    }

    #[test]
    fn test_bounds_mixed_serials_use_natural_order() {
        assert_eq!(
            serial_bounds(&records(&["A-9", "B-10", "C-1"])),
            ("A-9".to_string(), "C-1".to_string())
        );
        assert_eq!(
            serial_bounds(&records(&["item10", "item9", "12"])),
            ("12".to_string(), "item10".to_string())
        );
    }

    #[test]
    fn test_bounds_natural_and_sanitized() {
        assert_eq!(
            serial_bounds(&records(&["beta", "Alpha", "gamma"])),
            ("Alpha".to_string(), "gamma".to_string())
        );
        assert_eq!(
            serial_bounds(&records(&["a/b", "c:d"])),
            ("ab".to_string(), "cd".to_string())
        );
        assert_eq!(
            serial_bounds(&records(&["", "  "])),
            ("start".to_string(), "end".to_string())
        );
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("item2", "item10"), Ordering::Less);
        assert_eq!(natural_cmp("ABC", "abc"), Ordering::Equal);
        assert_eq!(natural_cmp("x", "x1"), Ordering::Less);
    }

    #[test]
    fn test_csv_layout() {
        let artifact = export_csv(&records(&["0002", "0001"])).unwrap();
        assert_eq!(artifact.file_name, "qr_urls_0001-0002.csv");

        let text = String::from_utf8(artifact.bytes).unwrap();
        assert!(text.starts_with(UTF8_BOM));
        let lines: Vec<&str> = text.trim_start_matches(UTF8_BOM).split('\n').collect();
        assert_eq!(lines[0], "Serial,QR URL");
        assert_eq!(
            lines[1],
            "0002,https://example.com/r/maruon/serial=0002?token=t"
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_image_file_name() {
        assert_eq!(image_file_name(&record("0042")), "qr_0042.png");
        assert_eq!(image_file_name(&record("")), "qr_image.png");
    }
}
