//! `[store]` and `[format]` section configuration.

use super::{
    defaults,
    error::{ConfigError, Result},
};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strata_table::Format;

/// `[store]` section in strata.toml - where the store lives on disk.
///
/// # Example
/// ```toml
/// [store]
/// root = "~/data/lake"
/// ignore_prefixes = [".", "_"]
/// extension = "csv"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding one subdirectory per report. `~` is expanded.
    #[serde(default = "defaults::store::root")]
    #[educe(Default = defaults::store::root())]
    pub root: PathBuf,

    /// Entries starting with one of these are never scanned.
    #[serde(default = "defaults::store::ignore_prefixes")]
    #[educe(Default = defaults::store::ignore_prefixes())]
    pub ignore_prefixes: Vec<String>,

    /// Extension of leaf files, without the dot.
    #[serde(default = "defaults::store::extension")]
    #[educe(Default = defaults::store::extension())]
    pub extension: String,
}

/// `[format]` section - how leaf files are written, process-wide.
///
/// # Example
/// ```toml
/// [format]
/// separator = ";"
/// decimal = ","
/// datetime = "%d/%m/%Y %H:%M"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct FormatConfig {
    #[serde(default = "defaults::format::separator")]
    #[educe(Default = defaults::format::separator())]
    pub separator: char,

    #[serde(default = "defaults::format::decimal")]
    #[educe(Default = defaults::format::decimal())]
    pub decimal: char,

    /// strftime pattern of the index column for sub-daily resolutions.
    #[serde(default = "defaults::format::datetime")]
    #[educe(Default = defaults::format::datetime())]
    pub datetime: String,
}

impl FormatConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.separator.is_ascii() {
            return Err(ConfigError::Validation(
                "[format.separator] must be a single ASCII character".into(),
            ));
        }
        if self.separator == self.decimal {
            return Err(ConfigError::Validation(
                "[format.separator] and [format.decimal] must differ".into(),
            ));
        }
        if !Format::is_valid_datetime(&self.datetime) {
            return Err(ConfigError::Validation(format!(
                "[format.datetime] `{}` is not a valid strftime pattern",
                self.datetime
            )));
        }
        Ok(())
    }

    /// Codec settings; call after [`validate`](Self::validate).
    pub fn to_format(&self) -> Format {
        Format {
            separator: u8::try_from(self.separator).unwrap_or(b','),
            decimal: self.decimal,
            datetime: self.datetime.as_str().into(),
        }
    }
}
