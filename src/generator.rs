use crate::encryption::TokenEncoder;
use crate::models::GeneratedItem;
use crate::serial::{clamp_serial, Serial};

/// Number of items shown when previewing a generated batch
pub const PREVIEW_LIMIT: usize = 50;

/// Expand `[start, end]` into serials with their tokens and redirect URLs.
///
/// Both bounds are clamped to `[1, 9999]` and swapped silently if reversed.
/// The result is ascending and has `max - min + 1` items. Pure: the same
/// inputs always give the same output.
pub fn generate(
    base_url: &str,
    start: i64,
    end: i64,
    encoder: &TokenEncoder,
) -> Vec<GeneratedItem> {
    let s = clamp_serial(start);
    let e = clamp_serial(end);
    let (lo, hi) = (s.min(e), s.max(e));

    (lo..=hi)
        .map(|n| {
            let code = Serial::from_number(n);
            let token = encoder.encode(code.as_str());
            let url = redirect_url(base_url, &code, &token);
            GeneratedItem { code, token, url }
        })
        .collect()
}

/// `{base}/maruon/serial={code}?token={urlencoded token}`
///
/// A single trailing slash on the base is dropped.
pub fn redirect_url(base_url: &str, code: &Serial, token: &str) -> String {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    format!(
        "{}/maruon/serial={}?token={}",
        base,
        code,
        urlencoding::encode(token)
    )
}

/// The first [`PREVIEW_LIMIT`] items, or all of them
pub fn preview(items: &[GeneratedItem], show_all: bool) -> &[GeneratedItem] {
    if show_all {
        items
    } else {
        &items[..items.len().min(PREVIEW_LIMIT)]
    }
}
