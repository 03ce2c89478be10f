use super::ApiError;
use crate::models::{QrRecord, SyncStatus};
use serde_json::Value;

/// Response contract for list/search endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListSchema {
    /// Accept the conventional spellings backends use for collections and
    /// counts, tried in a fixed order
    #[default]
    Tolerant,
    /// Only `{ "items": [...], "total": n }`
    Strict,
}

/// Collection field names, in priority order
const ITEM_FIELDS: [&str; 4] = ["items", "content", "data", "results"];

/// Total count locations, in priority order
const TOTAL_PATHS: [&[&str]; 5] = [
    &["total"],
    &["totalElements"],
    &["count"],
    &["totalCount"],
    &["page", "totalElements"],
];

/// A normalized page of records
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPage {
    pub items: Vec<QrRecord>,
    pub total: u64,
    pub next_cursor: Option<String>,
}

/// Normalize a raw list response into records and a total.
///
/// `page` only seeds synthetic keys for records with no id or serial.
pub fn normalize_list_response(
    raw: &Value,
    page: u32,
    schema: ListSchema,
) -> Result<NormalizedPage, ApiError> {
    let (items_raw, total) = match schema {
        ListSchema::Strict => {
            let items = raw
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| ApiError::Schema("missing 'items' array".to_string()))?;
            let total = raw
                .get("total")
                .and_then(as_count)
                .ok_or_else(|| ApiError::Schema("missing numeric 'total'".to_string()))?;
            (items.as_slice(), total)
        }
        ListSchema::Tolerant => {
            let items = ITEM_FIELDS
                .iter()
                .find_map(|field| raw.get(*field).and_then(Value::as_array))
                .or_else(|| raw.as_array())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let total = TOTAL_PATHS
                .iter()
                .find_map(|path| lookup_path(raw, path).and_then(as_count))
                .unwrap_or(items.len() as u64);
            (items, total)
        }
    };

    let next_cursor = lookup_path(raw, &["nextCursor"])
        .or_else(|| lookup_path(raw, &["pageInfo", "nextCursor"]))
        .and_then(scalar_string);

    let items = items_raw
        .iter()
        .enumerate()
        .map(|(idx, it)| normalize_record(it, page, idx))
        .collect();

    Ok(NormalizedPage {
        items,
        total,
        next_cursor,
    })
}

/// Map one raw record, accepting camelCase, snake_case and legacy aliases
pub fn normalize_record(raw: &Value, page: u32, idx: usize) -> QrRecord {
    let key = first_present(raw, &["id", "serial", "code"])
        .unwrap_or_else(|| format!("{}-{}", page, idx));

    QrRecord {
        key,
        serial: first_present(raw, &["serial", "code"]).unwrap_or_default(),
        image_url: first_present(raw, &["imageUrl", "image_url", "image"]).unwrap_or_default(),
        qr_url: first_present(raw, &["qrUrl", "url", "qr_url"]).unwrap_or_default(),
        message: first_present(raw, &["message"]).unwrap_or_default(),
        created_date: first_present(raw, &["createdDate", "created_date", "date"])
            .unwrap_or_default(),
        item_name: first_present(raw, &["itemName", "item_name", "product"]).unwrap_or_default(),
        sync: SyncStatus::Synced,
    }
}

fn lookup_path<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(raw, |v, key| v.get(*key))
        .filter(|v| !v.is_null())
}

/// First field that is present and non-null, stringified
fn first_present(raw: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|f| raw.get(*f).filter(|v| !v.is_null()))
        .and_then(scalar_string)
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
