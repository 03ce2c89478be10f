use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Lowest and highest serial numbers that can be issued
pub const SERIAL_MIN: u32 = 1;
pub const SERIAL_MAX: u32 = 9999;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerialQueryError {
    #[error("Invalid serial query '{0}'. Format: 1-4 digits (e.g. 0001) or a range (e.g. 1-20, 1~20)")]
    Format(String),
}

/// 4-digit zero-padded serial of an inventory item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Serial(String);

impl Serial {
    /// Zero-pad a number to 4 digits
    pub fn from_number(n: u32) -> Self {
        Serial(zero_pad4(n))
    }

    /// Normalize free-form input by keeping its digits and zero-padding them.
    ///
    /// Returns `None` when the input contains no digits.
    pub fn normalize(input: &str) -> Option<Self> {
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        let trimmed = digits.trim_start_matches('0');
        let value = if trimmed.is_empty() { "0" } else { trimmed };
        Some(Serial(format!("{:0>4}", value)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Serial {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `7` → `"0007"`
pub fn zero_pad4(n: u32) -> String {
    format!("{:04}", n)
}

/// Clamp a requested serial number into the issuable range
pub fn clamp_serial(n: i64) -> u32 {
    n.clamp(SERIAL_MIN as i64, SERIAL_MAX as i64) as u32
}

/// Parsed serial search input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialQuery {
    pub from: Serial,
    pub to: Serial,
}

impl SerialQuery {
    pub fn is_exact(&self) -> bool {
        self.from == self.to
    }
}

fn single_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,4})$").expect("static regex"))
}

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,4})\s*[-~]\s*(\d{1,4})$").expect("static regex"))
}

/// Parse serial search input.
///
/// `"12"` is an exact match on `0012`. `"1-20"`, `"20~1"` are inclusive
/// ranges normalized to `[min, max]`. Anything else is rejected before a
/// query is issued.
pub fn parse_serial_query(input: &str) -> Result<SerialQuery, SerialQueryError> {
    let input = input.trim();

    if let Some(caps) = single_re().captures(input) {
        let n: u32 = caps[1]
            .parse()
            .map_err(|_| SerialQueryError::Format(input.to_string()))?;
        let serial = Serial::from_number(n);
        return Ok(SerialQuery {
            from: serial.clone(),
            to: serial,
        });
    }

    if let Some(caps) = range_re().captures(input) {
        let a: u32 = caps[1]
            .parse()
            .map_err(|_| SerialQueryError::Format(input.to_string()))?;
        let b: u32 = caps[2]
            .parse()
            .map_err(|_| SerialQueryError::Format(input.to_string()))?;
        return Ok(SerialQuery {
            from: Serial::from_number(a.min(b)),
            to: Serial::from_number(a.max(b)),
        });
    }

    Err(SerialQueryError::Format(input.to_string()))
}
