//! Reference codes (`FX-YYYY-NNNNNN`) printed on every outbound page.
//!
//! The code is the only link between a paper reply and the conversation that produced
//! it, so extraction from re-scanned text must survive OCR noise: extra spaces, dash
//! variants, and the usual digit/letter confusions (O/0, I/l/1, S/5, B/8, Z/2).

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_NUMBER: u32 = 999_999;

#[derive(Debug, Error, PartialEq)]
pub enum ReferenceError {
    #[error("reference number {0} does not fit in six digits")]
    NumberOutOfRange(u32),

    #[error("year {0} is not a four-digit year")]
    YearOutOfRange(i32),

    #[error("'{0}' is not a reference code (expected FX-YYYY-NNNNNN)")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceId(String);

static STRICT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^FX-(\d{4})-(\d{6})$").expect("static regex"));

// Tolerant form: "FX", optional separator noise, 4 year glyphs, separator, 6 number glyphs.
static NOISY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bF\s*[XK×]\s*[-–—_.:~ ]?\s*([0-9OoIlSBZ]{4})\s*[-–—_.:~ ]\s*([0-9OoIlSBZ]{6})(?:[^0-9A-Za-z]|$)",
    )
    .expect("static regex")
});

impl ReferenceId {
    pub fn new(year: i32, number: u32) -> Result<Self, ReferenceError> {
        if !(1000..=9999).contains(&year) {
            return Err(ReferenceError::YearOutOfRange(year));
        }
        if number > MAX_NUMBER {
            return Err(ReferenceError::NumberOutOfRange(number));
        }
        Ok(Self(format!("FX-{year:04}-{number:06}")))
    }

    /// Strict parse of a clean code.
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        let trimmed = s.trim();
        if STRICT.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ReferenceError::Malformed(s.to_string()))
        }
    }

    /// Finds the first plausible code in noisy scanned text and normalizes it.
    pub fn find_in_text(text: &str) -> Option<Self> {
        NOISY.captures_iter(text).find_map(|caps| {
            let year = normalize_digits(caps.get(1)?.as_str())?;
            let number = normalize_digits(caps.get(2)?.as_str())?;
            let candidate = format!("FX-{year}-{number}");
            Self::parse(&candidate).ok()
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn year(&self) -> i32 {
        self.0[3..7].parse().unwrap_or_default()
    }

    pub fn number(&self) -> u32 {
        self.0[8..].parse().unwrap_or_default()
    }
}

fn normalize_digits(raw: &str) -> Option<String> {
    raw.chars()
        .map(|c| match c {
            '0'..='9' => Some(c),
            'O' | 'o' => Some('0'),
            'I' | 'i' | 'l' | 'L' => Some('1'),
            'S' | 's' => Some('5'),
            'B' | 'b' => Some('8'),
            'Z' | 'z' => Some('2'),
            _ => None,
        })
        .collect()
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReferenceId {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReferenceId> for String {
    fn from(value: ReferenceId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_formats_with_padding() {
        let r = ReferenceId::new(2025, 1234).unwrap();
        assert_eq!(r.as_str(), "FX-2025-001234");
        assert_eq!(r.year(), 2025);
        assert_eq!(r.number(), 1234);
    }

    #[test]
    fn test_new_rejects_seven_digit_number() {
        assert_eq!(
            ReferenceId::new(2025, 1_000_000),
            Err(ReferenceError::NumberOutOfRange(1_000_000))
        );
    }

    #[test]
    fn test_parse_strict() {
        assert!(ReferenceId::parse("FX-2025-001234").is_ok());
        assert!(ReferenceId::parse("  FX-2025-001234 ").is_ok());
        assert!(ReferenceId::parse("FX-2025-1234").is_err());
        assert!(ReferenceId::parse("fx-2025-001234").is_err());
    }

    #[test]
    fn test_find_in_clean_text() {
        let text = "Please see reference FX-2025-001234 on my last order.";
        assert_eq!(
            ReferenceId::find_in_text(text).unwrap().as_str(),
            "FX-2025-001234"
        );
    }

    #[test]
    fn test_find_in_noisy_scan() {
        // Lowercase, spaced separators, O for 0, l for 1, en dash.
        let text = "ref: fx 2O25 – OOl234 thanks";
        assert_eq!(
            ReferenceId::find_in_text(text).unwrap().as_str(),
            "FX-2025-001234"
        );
    }

    #[test]
    fn test_find_rejects_seven_digit_runs() {
        assert!(ReferenceId::find_in_text("FX-2025-0012345").is_none());
    }

    #[test]
    fn test_find_returns_none_without_code() {
        assert!(ReferenceId::find_in_text("I would like more milk").is_none());
    }

    #[test]
    fn test_serde_round_trips_as_plain_string() {
        let r = ReferenceId::new(2024, 42).unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"FX-2024-000042\"");
        let bad: Result<ReferenceId, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
