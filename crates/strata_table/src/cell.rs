//! Cell values.

use compact_str::{CompactString, ToCompactString};

/// One value of a table.
///
/// Numbers are kept as `f64`; anything that does not parse as a number is
/// kept verbatim as text. Empty fields and `NaN` read as [`Cell::Missing`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Missing,
    Number(f64),
    Text(CompactString),
}

impl Cell {
    /// Parse a raw field using `decimal` as the decimal separator.
    pub fn parse(raw: &str, decimal: char) -> Self {
        let raw = raw.trim();
        if is_missing_token(raw) {
            return Self::Missing;
        }
        match parse_number(raw, decimal) {
            Some(value) if value.is_nan() => Self::Missing,
            Some(value) => Self::Number(value),
            None => Self::Text(raw.to_compact_string()),
        }
    }

    #[inline]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    #[inline]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of a text cell, if its content parses as a number.
    pub fn to_number(&self, decimal: char) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(s) => parse_number(s.trim(), decimal).filter(|v| !v.is_nan()),
            Self::Missing => None,
        }
    }

    /// Render for writing, substituting the decimal separator in numbers.
    pub fn render(&self, decimal: char) -> CompactString {
        match self {
            Self::Missing => CompactString::default(),
            Self::Number(v) if decimal == '.' => v.to_compact_string(),
            Self::Number(v) => v.to_compact_string().replace('.', &decimal.to_string()).into(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            Self::Missing
        } else {
            Self::Number(value)
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

fn is_missing_token(raw: &str) -> bool {
    raw.is_empty() || matches!(raw, "nan" | "NaN" | "NAN" | "NaT" | "null" | "None")
}

fn parse_number(raw: &str, decimal: char) -> Option<f64> {
    if decimal == '.' {
        return raw.parse().ok();
    }
    // a literal '.' is not a number under a foreign decimal separator
    if raw.contains('.') {
        return None;
    }
    raw.replace(decimal, ".").parse().ok()
}
