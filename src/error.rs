//! Store error types.

use crate::{config::ConfigError, node::Kind};
use chrono::NaiveDate;
use serde::Serialize;
use std::{fmt, path::PathBuf};
use strata_table::TableError;
use thiserror::Error;

/// Errors raised by the tree, status and merge layers.
///
/// Lookup errors (`NotFound`, `Ambiguous`) are recoverable by the caller.
/// Pipeline errors abort the file or report being processed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no node matches `{query}`{}", did_you_mean(.suggestions))]
    NotFound {
        query: String,
        suggestions: Vec<String>,
    },

    #[error("`{query}` is ambiguous, it matches: {}", .matches.join(", "))]
    Ambiguous { query: String, matches: Vec<String> },

    #[error("cannot reindex `{}`: {reason} (table dumped to `{}`)", .path.display(), .dump.display())]
    ReindexFailure {
        path: PathBuf,
        dump: PathBuf,
        reason: String,
    },

    #[error("header of `{}` cannot be read", .path.display())]
    ShapeMismatch {
        path: PathBuf,
        #[source]
        source: TableError,
    },

    #[error("status is incomplete: the store holds no observed data")]
    StatusIncomplete,

    #[error("`{key}` is a {kind} node, expected {expected}")]
    Kind {
        key: String,
        kind: Kind,
        expected: &'static str,
    },

    #[error("IO error when accessing `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A degraded but non-fatal outcome, attached to the operation's result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The destination was rewritten once with columns the staged data added.
    HeaderWidened { path: PathBuf, columns: Vec<String> },
    /// A text column fell below the float threshold and stayed text, or it
    /// was coerced to numbers and the `samples` values were dropped.
    Unfloatable {
        path: PathBuf,
        column: String,
        ratio: f64,
        converted: bool,
        samples: Vec<String>,
    },
    /// Dates absent from the ideal grid up to the last observed date.
    MissingDates {
        count: usize,
        first: NaiveDate,
        last: NaiveDate,
    },
    /// The root holds entries but none matched the eligibility pattern.
    NoEligibleFiles { dir: PathBuf, pattern: String },
    /// An eligible file name carries no `YYYYMMDD` date.
    UndatedFile { path: PathBuf },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderWidened { path, columns } => {
                write!(f, "widened `{}` with {}", path.display(), columns.join(", "))
            }
            Self::Unfloatable {
                path,
                column,
                ratio,
                converted: false,
                samples,
            } => write!(
                f,
                "`{column}` in `{}` is unfloatable ({:.0}% numeric), kept as text, e.g. {}",
                path.display(),
                ratio * 100.0,
                samples.join(", ")
            ),
            Self::Unfloatable {
                path,
                column,
                ratio,
                converted: true,
                samples,
            } => write!(
                f,
                "`{column}` in `{}` coerced to numbers ({:.0}% numeric), dropped {}",
                path.display(),
                ratio * 100.0,
                samples.join(", ")
            ),
            Self::MissingDates { count, first, last } => {
                write!(f, "{count} missing dates between {first} and {last}")
            }
            Self::NoEligibleFiles { dir, pattern } => {
                write!(f, "no file in `{}` matches `{pattern}`", dir.display())
            }
            Self::UndatedFile { path } => write!(f, "no date in file name `{}`", path.display()),
        }
    }
}

fn did_you_mean(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(", did you mean: {}?", suggestions.join(", "))
    }
}
