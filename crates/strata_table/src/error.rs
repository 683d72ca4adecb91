//! Table error types.

use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while parsing, transforming, or writing a [`Table`](crate::Table).
#[derive(Debug, Error)]
pub enum TableError {
    #[error("IO error when accessing `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("malformed delimited text in `{0}`")]
    Csv(PathBuf, #[source] csv::Error),

    #[error("cannot parse timestamp `{raw}` (row {row})")]
    BadTimestamp { raw: String, row: usize },

    #[error("unreadable header: {0}")]
    BadHeader(String),

    #[error("timestamp {stamp} is not on the {step} grid starting at {start}")]
    OffGrid {
        stamp: NaiveDateTime,
        start: NaiveDateTime,
        step: String,
    },

    #[error("timezone conversion failed: {0}")]
    Timezone(String),

    #[error("invalid step `{0}`")]
    BadStep(String),
}

pub type Result<T> = std::result::Result<T, TableError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_table_error_display() {
        let err = TableError::Io(
            PathBuf::from("load.csv"),
            Error::new(ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("load.csv"));

        let err = TableError::BadTimestamp {
            raw: "yesterday".into(),
            row: 3,
        };
        let display = err.to_string();
        assert!(display.contains("yesterday"));
        assert!(display.contains("row 3"));
    }
}
