//! `[reports.<name>]` section configuration and the typed report schema.
//!
//! The TOML side keeps plain strings so that error messages can point at
//! the offending key; [`ReportConfig::schema`] parses and checks them once.

use super::{
    defaults,
    error::{ConfigError, Result},
};
use crate::node::DepthMap;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use compact_str::CompactString;
use educe::Educe;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strata_table::Step;

/// Depth layout of a store tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Tree rooted at one report: report/field/file/property.
    #[default]
    Report,
    /// Tree rooted above the reports: root/report/field/file/property.
    Store,
}

impl Layout {
    pub fn depth_map(self) -> DepthMap {
        match self {
            Self::Report => DepthMap::report(),
            Self::Store => DepthMap::store(),
        }
    }
}

/// Where a report's freshness is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Leaf files of the persisted store.
    #[default]
    Store,
    /// Raw, dated files in the report's lake directory.
    Lake,
}

/// File-name rule for raw lake files: `<prefix>*<infix>*<suffix>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct Eligibility {
    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub infix: String,

    #[serde(default)]
    pub suffix: String,

    #[serde(default = "defaults::report::eligibility::extension")]
    #[educe(Default = defaults::report::eligibility::extension())]
    pub extension: String,
}

impl Eligibility {
    /// Glob pattern of eligible names, runs of `*` collapsed.
    pub fn pattern(&self) -> String {
        let extension = if self.extension.is_empty() {
            "*"
        } else {
            self.extension.as_str()
        };
        let raw = format!("{}*{}*{}.{}", self.prefix, self.infix, self.suffix, extension);
        let mut out = String::with_capacity(raw.len());
        for c in raw.chars() {
            if !(c == '*' && out.ends_with('*')) {
                out.push(c);
            }
        }
        out
    }

    pub fn compile(&self) -> Result<Pattern> {
        let pattern = self.pattern();
        Pattern::new(&pattern).map_err(|err| {
            ConfigError::Validation(format!("eligibility pattern `{pattern}` is invalid: {err}"))
        })
    }
}

/// `[reports.<name>]` section in strata.toml.
///
/// # Example
/// ```toml
/// [reports.isp]
/// resolution = "30min"
/// period = "1D"
/// timezone = "Europe/Athens"
/// potential_min = "2020-11-01"
/// lake = "~/raw/isp"
///
/// [reports.isp.eligibility]
/// infix = "ISP1"
/// extension = "xlsx"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Index resolution, e.g. `"30min"`, `"1h"`, `"1D"`.
    #[serde(default = "defaults::report::resolution")]
    #[educe(Default = defaults::report::resolution())]
    pub resolution: String,

    /// Span covered by one published file.
    #[serde(default = "defaults::report::period")]
    #[educe(Default = defaults::report::period())]
    pub period: String,

    /// Inherent timezone of the publisher (IANA name).
    #[serde(default = "defaults::report::timezone")]
    #[educe(Default = defaults::report::timezone())]
    pub timezone: String,

    /// Whether stamps need timezone handling. Defaults to sub-daily resolutions.
    #[serde(default)]
    pub tz_aware: Option<bool>,

    /// Days by which file labels run ahead of the data they hold.
    #[serde(default)]
    pub time_lag_days: u32,

    /// Leaf files use the two-row header convention.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub long_format: bool,

    /// First date the publisher ever covered (`YYYY-MM-DD`).
    #[serde(default = "defaults::report::potential_min")]
    #[educe(Default = defaults::report::potential_min())]
    pub potential_min: String,

    /// Last date that should be covered; today when unset.
    #[serde(default)]
    pub potential_max: Option<String>,

    #[serde(default = "defaults::report::layout")]
    #[educe(Default = defaults::report::layout())]
    pub layout: Layout,

    #[serde(default = "defaults::report::source")]
    #[educe(Default = defaults::report::source())]
    pub source: SourceKind,

    /// Directory of raw dated files. `~` is expanded.
    #[serde(default)]
    pub lake: Option<PathBuf>,

    #[serde(default)]
    pub eligibility: Eligibility,
}

/// Validated, typed form of a [`ReportConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSchema {
    pub name: CompactString,
    pub resolution: Step,
    pub period: Step,
    pub timezone: Tz,
    pub tz_aware: bool,
    pub time_lag_days: u32,
    pub long_format: bool,
    pub potential_min: NaiveDate,
    pub potential_max: NaiveDate,
    pub depth_map: DepthMap,
    pub source: SourceKind,
    pub lake: Option<PathBuf>,
    pub eligibility: Eligibility,
}

impl ReportSchema {
    /// Schema with default settings apart from its name and resolution.
    pub fn new(name: &str, resolution: Step) -> Self {
        Self {
            name: name.into(),
            resolution,
            period: Step::Days(1),
            timezone: Tz::UTC,
            tz_aware: !resolution.is_daily_or_coarser(),
            time_lag_days: 0,
            long_format: false,
            potential_min: NaiveDate::MIN,
            potential_max: Utc::now().date_naive(),
            depth_map: DepthMap::report(),
            source: SourceKind::Store,
            lake: None,
            eligibility: Eligibility::default(),
        }
    }

    pub fn with_range(mut self, min: NaiveDate, max: NaiveDate) -> Self {
        self.potential_min = min;
        self.potential_max = max;
        self
    }

    /// Report timezone when its stamps need timezone handling.
    pub fn report_tz(&self) -> Option<Tz> {
        self.tz_aware.then_some(self.timezone)
    }
}

impl ReportConfig {
    /// Parse every field; errors name the offending key.
    pub fn schema(&self, name: &str) -> Result<ReportSchema> {
        let field = |key: &str| format!("[reports.{name}.{key}]");

        let resolution: Step = self
            .resolution
            .parse()
            .map_err(|_| invalid(&field("resolution"), &self.resolution))?;
        let period: Step = self
            .period
            .parse()
            .map_err(|_| invalid(&field("period"), &self.period))?;
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| invalid(&field("timezone"), &self.timezone))?;
        let potential_min = parse_date(&self.potential_min)
            .ok_or_else(|| invalid(&field("potential_min"), &self.potential_min))?;
        let potential_max = match &self.potential_max {
            Some(raw) => parse_date(raw).ok_or_else(|| invalid(&field("potential_max"), raw))?,
            None => Utc::now().date_naive(),
        };
        if potential_max < potential_min {
            return Err(ConfigError::Validation(format!(
                "{} precedes {}",
                field("potential_max"),
                field("potential_min")
            )));
        }
        self.eligibility.compile()?;

        Ok(ReportSchema {
            name: name.into(),
            resolution,
            period,
            timezone,
            tz_aware: self
                .tz_aware
                .unwrap_or(!resolution.is_daily_or_coarser()),
            time_lag_days: self.time_lag_days,
            long_format: self.long_format,
            potential_min,
            potential_max,
            depth_map: self.layout.depth_map(),
            source: self.source,
            lake: self.lake.as_deref().map(super::expand_path),
            eligibility: self.eligibility.clone(),
        })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::Validation(format!("{field} has an invalid value `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::super::StrataConfig;
    use super::*;
    use crate::node::Kind;

    const ISP: &str = r#"
        [reports.isp]
        resolution = "30min"
        timezone = "Europe/Athens"
        potential_min = "2020-11-01"
        potential_max = "2024-03-03"
        time_lag_days = 1
        source = "lake"
        lake = "raw/isp"

        [reports.isp.eligibility]
        infix = "ISP1"
        extension = "xlsx"
    "#;

    #[test]
    fn test_report_schema_parsing() {
        let config = StrataConfig::from_str(ISP).unwrap();
        let schema = config.reports["isp"].schema("isp").unwrap();

        assert_eq!(schema.resolution, Step::Minutes(30));
        assert_eq!(schema.period, Step::Days(1));
        assert_eq!(schema.timezone, chrono_tz::Europe::Athens);
        assert!(schema.tz_aware);
        assert_eq!(schema.report_tz(), Some(chrono_tz::Europe::Athens));
        assert_eq!(schema.time_lag_days, 1);
        assert_eq!(schema.source, SourceKind::Lake);
        assert_eq!(schema.depth_map.kind(0), Some(Kind::Report));
        assert_eq!(schema.potential_max, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
    }

    #[test]
    fn test_daily_reports_skip_timezones() {
        let config = StrataConfig::from_str("[reports.daily]\nresolution = \"1D\"").unwrap();
        let schema = config.reports["daily"].schema("daily").unwrap();
        assert!(!schema.tz_aware);
        assert_eq!(schema.report_tz(), None);
    }

    #[test]
    fn test_report_schema_errors_name_the_field() {
        let config = StrataConfig::from_str("[reports.bad]\ntimezone = \"Mars/Olympus\"").unwrap();
        let err = config.reports["bad"].schema("bad").unwrap_err();
        assert!(err.to_string().contains("[reports.bad.timezone]"));

        let config = StrataConfig::from_str(
            "[reports.bad]\npotential_min = \"2024-01-02\"\npotential_max = \"2024-01-01\"",
        )
        .unwrap();
        assert!(config.reports["bad"].schema("bad").is_err());
    }

    #[test]
    fn test_eligibility_pattern_collapses_stars() {
        let rule = Eligibility {
            infix: "ISP".into(),
            ..Eligibility::default()
        };
        assert_eq!(rule.pattern(), "*ISP*.csv");

        let rule = Eligibility {
            prefix: "2024".into(),
            suffix: "_01".into(),
            extension: String::new(),
            ..Eligibility::default()
        };
        assert_eq!(rule.pattern(), "2024*_01.*");
        assert!(rule.compile().unwrap().matches("20240101_ISP_01.xlsx"));
    }
}
