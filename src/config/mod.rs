//! Store configuration management for `strata.toml`.
//!
//! # Sections
//!
//! | Section             | Purpose                                        |
//! |---------------------|------------------------------------------------|
//! | `[store]`           | Store root, ignored prefixes, leaf extension   |
//! | `[format]`          | Field/decimal separators, datetime format      |
//! | `[merge]`           | Merge mode, append threshold, coercion ratio   |
//! | `[reports.<name>]`  | Per-report schema (resolution, timezone, ...)  |
//!
//! # Example
//!
//! ```toml
//! [store]
//! root = "~/energy/lake"
//!
//! [format]
//! separator = ";"
//! decimal = ","
//!
//! [merge]
//! threshold = "50MB"
//!
//! [reports.isp]
//! resolution = "30min"
//! timezone = "Europe/Athens"
//! potential_min = "2020-11-01"
//! ```

pub mod defaults;
mod error;
mod merge;
mod report;
mod store;

pub use error::ConfigError;
pub use merge::{MergeConfig, MergeMode, parse_size_string};
pub use report::{Eligibility, Layout, ReportConfig, ReportSchema, SourceKind};
pub use store::{FormatConfig, StoreConfig};

use crate::tree::TreeOptions;
use educe::Educe;
use error::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use strata_table::Format;

/// Root configuration structure representing strata.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub format: FormatConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    /// Report schemas keyed by report name.
    #[serde(default)]
    pub reports: BTreeMap<String, ReportConfig>,
}

impl StrataConfig {
    /// Parse configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: StrataConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)?;
        config.config_path = normalize_path(path);

        // a relative store root is relative to the config file
        let root = expand_path(&config.store.root);
        if root.is_relative()
            && let Some(dir) = config.config_path.parent()
        {
            config.store.root = dir.join(root);
        }
        Ok(config)
    }

    /// Override the store root (from the command line).
    pub fn set_root(&mut self, root: &Path) {
        self.store.root = root.to_path_buf();
    }

    /// Store root with `~` expanded, made absolute.
    pub fn root(&self) -> PathBuf {
        normalize_path(&expand_path(&self.store.root))
    }

    pub fn codec_format(&self) -> Format {
        self.format.to_format()
    }

    /// Tree settings shared by every report of this store.
    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            format: self.codec_format(),
            extension: self.store.extension.as_str().into(),
            ignore_prefixes: self.store.ignore_prefixes.clone(),
            ..TreeOptions::default()
        }
    }

    /// Typed schema of report `name`.
    pub fn report(&self, name: &str) -> Result<ReportSchema> {
        self.reports
            .get(name)
            .ok_or_else(|| ConfigError::UnknownReport(name.to_string()))?
            .schema(name)
    }

    /// Validate every section and every report schema.
    pub fn validate(&self) -> Result<()> {
        self.format.validate()?;
        self.merge.validate()?;
        if self.store.extension.is_empty() || self.store.extension.contains('.') {
            return Err(ConfigError::Validation(
                "[store.extension] must be a bare extension such as `csv`".into(),
            ));
        }
        for (name, report) in &self.reports {
            report.schema(name)?;
        }
        Ok(())
    }
}

/// Expand a leading `~` to the home directory.
pub(crate) fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}

/// Normalize a path to absolute, using canonicalize if the path exists
fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        // For non-existent paths, manually make them absolute
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
