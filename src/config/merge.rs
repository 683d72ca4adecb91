//! `[merge]` section configuration.

use super::{
    defaults,
    error::{ConfigError, Result},
};
use educe::Educe;
use serde::{Deserialize, Serialize};

/// How staged data is reconciled with the persisted store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Append to new or large destinations, rewrite small ones.
    #[default]
    Auto,
    /// Always append.
    Fast,
    /// Always reload, merge and rewrite.
    Slow,
}

/// `[merge]` section in strata.toml.
///
/// # Example
/// ```toml
/// [merge]
/// mode = "auto"
/// threshold = "50MB"      # destinations this large take the append path
/// float_threshold = 0.9   # share of numeric values needed to coerce a column
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    #[serde(default = "defaults::merge::mode")]
    #[educe(Default = defaults::merge::mode())]
    pub mode: MergeMode,

    /// Size of a report directory from which appends are preferred.
    /// Accepts B, KB, MB and GB suffixes.
    #[serde(default = "defaults::merge::threshold")]
    #[educe(Default = defaults::merge::threshold())]
    pub threshold: String,

    #[serde(default = "defaults::merge::float_threshold")]
    #[educe(Default = defaults::merge::float_threshold())]
    pub float_threshold: f64,
}

impl MergeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.float_threshold) {
            return Err(ConfigError::Validation(
                "[merge.float_threshold] must lie between 0 and 1".into(),
            ));
        }
        let valid_size_suffixes = ["B", "KB", "MB", "GB"];
        let threshold = self.threshold.trim().to_uppercase();
        let digits = threshold.trim_end_matches(char::is_alphabetic).trim();
        if !valid_size_suffixes.iter().any(|s| threshold.ends_with(s)) || digits.parse::<u64>().is_err() {
            return Err(ConfigError::Validation(
                "[merge.threshold] must be a number ending with B, KB, MB or GB".into(),
            ));
        }
        Ok(())
    }

    /// Threshold in bytes.
    pub fn threshold_bytes(&self) -> u64 {
        parse_size_string(&self.threshold)
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, MB, GB (case-insensitive). A bare number is
/// bytes; anything unparsable is zero.
///
/// # Examples
/// ```ignore
/// parse_size_string("20KB") // → 20480
/// parse_size_string("50MB") // → 52428800
/// parse_size_string("100")  // → 100
/// ```
pub fn parse_size_string(s: &str) -> u64 {
    let s = s.trim().to_uppercase();
    let (multiplier, suffix_len) = if s.ends_with("GB") {
        (1024 * 1024 * 1024, 2)
    } else if s.ends_with("MB") {
        (1024 * 1024, 2)
    } else if s.ends_with("KB") {
        (1024, 2)
    } else if s.ends_with('B') {
        (1, 1)
    } else {
        (1, 0)
    };
    let value: u64 = s[..s.len() - suffix_len].trim().parse().unwrap_or(0);
    multiplier * value
}

#[cfg(test)]
mod tests {
    use super::super::StrataConfig;
    use super::*;

    #[test]
    fn test_parse_size_string() {
        assert_eq!(parse_size_string("20KB"), 20 * 1024);
        assert_eq!(parse_size_string("20kb"), 20 * 1024);
        assert_eq!(parse_size_string("50MB"), 50 * 1024 * 1024);
        assert_eq!(parse_size_string("2GB"), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_size_string("256b"), 256);
        assert_eq!(parse_size_string("100"), 100);
        assert_eq!(parse_size_string("invalid"), 0);
    }

    #[test]
    fn test_merge_config_defaults() {
        let config = StrataConfig::from_str("").unwrap();
        assert_eq!(config.merge.mode, MergeMode::Auto);
        assert_eq!(config.merge.threshold_bytes(), 50 * 1024 * 1024);
        assert!((config.merge.float_threshold - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_config_validation() {
        let config = StrataConfig::from_str(
            r#"
            [merge]
            mode = "slow"
            threshold = "10 KB"
        "#,
        )
        .unwrap();
        assert_eq!(config.merge.mode, MergeMode::Slow);
        assert!(config.merge.validate().is_ok());

        let config = StrataConfig::from_str("[merge]\nfloat_threshold = 1.5").unwrap();
        assert!(config.merge.validate().is_err());

        let config = StrataConfig::from_str("[merge]\nthreshold = \"lots\"").unwrap();
        assert!(config.merge.validate().is_err());

        assert!(StrataConfig::from_str("[merge]\nmode = \"eager\"").is_err());
    }
}
