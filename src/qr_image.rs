use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};
use std::io::Cursor;
use thiserror::Error;

pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Error, Debug)]
pub enum QrImageError {
    #[error("QR encoding failed: {0}")]
    Encode(#[from] qrcode::types::QrError),
    #[error("PNG encoding failed: {0}")]
    Png(#[from] image::ImageError),
}

/// Render options for QR bitmaps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrImageOptions {
    /// Target width/height in pixels
    pub size: u32,
    /// Quiet zone in modules
    pub margin: u32,
}

impl Default for QrImageOptions {
    fn default() -> Self {
        QrImageOptions {
            size: 256,
            margin: 2,
        }
    }
}

/// Renders text into QR PNGs for transport
#[derive(Debug, Clone, Copy, Default)]
pub struct QrImageEncoder {
    options: QrImageOptions,
}

impl QrImageEncoder {
    pub fn new(options: QrImageOptions) -> Self {
        QrImageEncoder { options }
    }

    pub fn options(&self) -> QrImageOptions {
        self.options
    }

    /// Render to raw PNG bytes.
    ///
    /// Modules are scaled by an integer factor and centered, so the image is
    /// exactly `size` pixels square whenever `size` covers one pixel per
    /// module plus the margin.
    pub fn render_png(&self, text: &str) -> Result<Vec<u8>, QrImageError> {
        let code = QrCode::new(text.as_bytes())?;
        let modules = code.width() as u32;
        let colors = code.to_colors();

        let margin = self.options.margin;
        let total_modules = modules + 2 * margin;
        let scale = (self.options.size / total_modules).max(1);
        let side = self.options.size.max(total_modules * scale);
        let offset = (side - total_modules * scale) / 2 + margin * scale;

        let mut img = GrayImage::from_pixel(side, side, Luma([255u8]));
        for (i, color) in colors.iter().enumerate() {
            if *color != Color::Dark {
                continue;
            }
            let mx = (i as u32) % modules;
            let my = (i as u32) / modules;
            for dy in 0..scale {
                for dx in 0..scale {
                    img.put_pixel(offset + mx * scale + dx, offset + my * scale + dy, Luma([0u8]));
                }
            }
        }

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(img).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }

    /// Render and return only the base64 PNG body (no data-URL header)
    pub fn render(&self, text: &str) -> Result<String, QrImageError> {
        Ok(STANDARD.encode(self.render_png(text)?))
    }

    /// Render as a full `data:image/png;base64,...` URL
    pub fn render_data_url(&self, text: &str) -> Result<String, QrImageError> {
        Ok(format!("{}{}", PNG_DATA_URL_PREFIX, self.render(text)?))
    }
}

/// Drop everything up to and including the first comma of a data URL
pub fn strip_data_url_header(data_url: &str) -> &str {
    match data_url.find(',') {
        Some(i) => &data_url[i + 1..],
        None => data_url,
    }
}

/// Turn a stored image value into something displayable or fetchable
pub fn to_image_src(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    if value.starts_with("http") || value.starts_with("data:image") {
        return value.to_string();
    }
    format!("{}{}", PNG_DATA_URL_PREFIX, value)
}

/// Decoded byte length of a base64 string
pub fn base64_byte_length(b64: &str) -> usize {
    if b64.is_empty() {
        return 0;
    }
    let pad = if b64.ends_with("==") {
        2
    } else if b64.ends_with('=') {
        1
    } else {
        0
    };
    (b64.len() * 3 / 4).saturating_sub(pad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_square_png_of_requested_size() {
        let encoder = QrImageEncoder::default();
        let png = encoder
            .render_png("https://example.com/r/maruon/serial=0001?token=abc")
            .unwrap();

        let img = image::load_from_memory(&png).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (256, 256));

        // Corner is quiet zone, finder pattern starts right after the margin
        assert_eq!(img.get_pixel(0, 0).0[0], 255);
        let code = QrCode::new(b"https://example.com/r/maruon/serial=0001?token=abc").unwrap();
        let total = code.width() as u32 + 4;
        let scale = 256 / total;
        let offset = (256 - total * scale) / 2 + 2 * scale;
        assert_eq!(img.get_pixel(offset, offset).0[0], 0);
        assert_eq!(img.get_pixel(offset - 1, offset - 1).0[0], 255);
    }

    #[test]
    fn test_render_is_reproducible() {
        let encoder = QrImageEncoder::new(QrImageOptions {
            size: 128,
            margin: 4,
        });
        assert_eq!(encoder.render("0042").unwrap(), encoder.render("0042").unwrap());
    }

    #[test]
    fn test_data_url_roundtrip() {
        let encoder = QrImageEncoder::default();
        let data_url = encoder.render_data_url("hello").unwrap();
        assert!(data_url.starts_with(PNG_DATA_URL_PREFIX));

        let body = strip_data_url_header(&data_url);
        assert_eq!(body, encoder.render("hello").unwrap());
        assert_eq!(STANDARD.decode(body).unwrap().len(), base64_byte_length(body));
    }

    #[test]
    fn test_to_image_src() {
        assert_eq!(to_image_src(""), "");
        assert_eq!(to_image_src("https://cdn/x.png"), "https://cdn/x.png");
        assert_eq!(to_image_src("data:image/png;base64,AA"), "data:image/png;base64,AA");
        assert_eq!(to_image_src("AA"), "data:image/png;base64,AA");
    }

    #[test]
    fn test_strip_without_header() {
        assert_eq!(strip_data_url_header("AAAA"), "AAAA");
    }

    #[test]
    fn test_base64_byte_length() {
        assert_eq!(base64_byte_length(""), 0);
        assert_eq!(base64_byte_length("AAAA"), 3);
        assert_eq!(base64_byte_length("AAA="), 2);
        assert_eq!(base64_byte_length("AA=="), 1);
    }
}
