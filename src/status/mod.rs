//! Freshness and completeness of one store root.
//!
//! A [`Status`] answers three questions for a report: does any data exist,
//! is it up to date with what the publisher could have released, and which
//! dates are missing in between. It is recomputed by [`Status::refresh`].
//!
//! Two sources are supported:
//!
//! - **Lake**: raw dated files. Each file name embeds a `YYYYMMDD` label;
//!   same-dated files are ranked into versions and one is kept per date.
//! - **Store**: persisted leaf files. A sample leaf's index gives the
//!   observed days (a day counts when any of its rows holds a value).
//!
//! Observed and potential bounds are plain dates, or instants in the report
//! timezone when the report needs timezone handling.

mod archive;
mod catalog;
mod leaves;

pub use catalog::{DatedFile, Timeslice, VersionPolicy};

use crate::{
    config::{ReportSchema, SourceKind},
    error::{Result, StoreError, Warning},
    log,
    utils::date::{date_grid, days, midnight},
};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};
use std::{
    cmp::Ordering,
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
};
use strata_table::{Format, Step, to_utc};

// ============================================================================
// Bound
// ============================================================================

/// A date or, for timezone-aware reports, an instant in the report timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Date(NaiveDate),
    Instant(DateTime<Tz>),
}

impl Bound {
    /// Calendar date, in the report timezone for instants.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Date(d) => *d,
            Self::Instant(t) => t.date_naive(),
        }
    }

    /// Comparable position on the UTC timeline.
    fn utc(&self) -> NaiveDateTime {
        match self {
            Self::Date(d) => midnight(*d),
            Self::Instant(t) => t.naive_utc(),
        }
    }

    /// Start of `date` in `tz`, or the bare date without one.
    fn day_start(date: NaiveDate, tz: Option<Tz>) -> Result<Self> {
        Ok(match tz {
            Some(tz) => Self::Instant(tz.from_utc_datetime(&to_utc(tz, midnight(date))?)),
            None => Self::Date(date),
        })
    }

    /// Last slot of `date` at `resolution` in `tz`, or the bare date.
    fn day_end(date: NaiveDate, tz: Option<Tz>, resolution: Step) -> Result<Self> {
        let Some(tz) = tz else {
            return Ok(Self::Date(date));
        };
        let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
        let end = to_utc(tz, midnight(next))?;
        let end = resolution.retreat(end).unwrap_or(end);
        Ok(Self::Instant(tz.from_utc_datetime(&end)))
    }
}

impl PartialOrd for Bound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.utc().cmp(&other.utc()))
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Instant(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M %Z")),
        }
    }
}

impl Serialize for Bound {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Range the orchestrator should fetch next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateWindow {
    pub start: Bound,
    pub end: Bound,
    /// Data days covered by the window.
    pub days: Vec<NaiveDate>,
    /// File labels to fetch for those days (shifted by the time lag).
    pub labels: Vec<NaiveDate>,
}

/// Snapshot of a store root. Fields stay unset until a refresh finds data.
#[derive(Debug, Clone)]
pub struct Status {
    dir: PathBuf,
    schema: ReportSchema,
    format: Format,
    extension: String,
    ignore_prefixes: Vec<String>,

    exists: bool,
    up_to_date: bool,
    observed_min: Option<Bound>,
    observed_max: Option<Bound>,
    potential_min: Bound,
    potential_max: Bound,
    observed: BTreeSet<NaiveDate>,
    missing: BTreeSet<NaiveDate>,
    catalog: Vec<DatedFile>,
    selected: Vec<DatedFile>,
    sample: Option<PathBuf>,
    added: usize,
    warnings: Vec<Warning>,
}

/// Settings a [`Status`] needs beyond the report schema.
#[derive(Debug, Clone)]
pub struct StatusOptions {
    pub format: Format,
    pub extension: String,
    pub ignore_prefixes: Vec<String>,
}

impl Default for StatusOptions {
    fn default() -> Self {
        Self {
            format: Format::default(),
            extension: "csv".into(),
            ignore_prefixes: vec![".".into()],
        }
    }
}

impl Status {
    /// Unrefreshed status of `dir`; only the potential range is known.
    pub fn new(dir: &Path, schema: &ReportSchema, options: StatusOptions) -> Result<Self> {
        let tz = schema.report_tz();
        Ok(Self {
            dir: dir.to_path_buf(),
            potential_min: Bound::day_start(schema.potential_min, tz)?,
            potential_max: Bound::day_end(schema.potential_max, tz, schema.resolution)?,
            format: options.format.for_step(schema.resolution),
            extension: options.extension,
            ignore_prefixes: options.ignore_prefixes,
            schema: schema.clone(),
            exists: false,
            up_to_date: false,
            observed_min: None,
            observed_max: None,
            observed: BTreeSet::new(),
            missing: BTreeSet::new(),
            catalog: Vec::new(),
            selected: Vec::new(),
            sample: None,
            added: 0,
            warnings: Vec::new(),
        })
    }

    /// Recompute everything from disk.
    ///
    /// `timeslice` restricts the dates considered; `policy` picks one lake
    /// file per date and is ignored for store sources.
    pub fn refresh(&mut self, timeslice: &Timeslice, policy: VersionPolicy) -> Result<()> {
        log!("status"; "refreshing {}", self.dir.display());
        self.reset();
        match self.schema.source {
            SourceKind::Lake => self.refresh_lake(timeslice, policy)?,
            SourceKind::Store => self.refresh_store(timeslice)?,
        }
        if !self.exists {
            log!("status"; "no data in {}", self.dir.display());
            return Ok(());
        }

        self.check_up_to_date();
        self.check_complete();
        for warning in &self.warnings {
            log!("warn"; "{}", warning);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.exists = false;
        self.up_to_date = false;
        self.observed_min = None;
        self.observed_max = None;
        self.observed.clear();
        self.missing.clear();
        self.selected.clear();
        self.sample = None;
        self.warnings.clear();
    }

    fn refresh_lake(&mut self, timeslice: &Timeslice, policy: VersionPolicy) -> Result<()> {
        let scan = catalog::scan(&self.dir, &self.schema.eligibility)?;
        self.added = catalog::added_since(&self.catalog, &scan.files);
        self.catalog = scan.files;
        self.warnings.extend(scan.warnings);

        let candidates: Vec<DatedFile> = self
            .catalog
            .iter()
            .filter(|f| timeslice.contains(f.label))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }
        self.selected = catalog::select(&candidates, policy);
        log!("status"; "keeping {} of {} files ({} version)", self.selected.len(), candidates.len(), policy);

        let lag = Days::new(self.schema.time_lag_days as u64);
        self.observed = self
            .selected
            .iter()
            .map(|f| f.label.checked_sub_days(lag).unwrap_or(f.label))
            .collect();

        let tz = self.schema.report_tz();
        let (Some(&first), Some(&last)) = (self.observed.first(), self.observed.last()) else {
            return Ok(());
        };
        self.observed_min = Some(Bound::day_start(first, tz)?);
        self.observed_max = Some(Bound::day_end(last, tz, self.schema.resolution)?);
        self.exists = true;
        Ok(())
    }

    fn refresh_store(&mut self, timeslice: &Timeslice) -> Result<()> {
        let Some(path) = leaves::sample_path(&self.dir, &self.extension, &self.ignore_prefixes) else {
            return Ok(());
        };
        let tz = self.schema.report_tz();
        let Some(sample) = leaves::observe(&path, &self.format, tz, timeslice)? else {
            return Ok(());
        };

        let bound = |stamp: NaiveDateTime| match tz {
            Some(tz) => Bound::Instant(tz.from_utc_datetime(&stamp)),
            None => Bound::Date(stamp.date()),
        };
        self.observed_min = Some(bound(sample.first));
        self.observed_max = Some(bound(sample.last));
        self.observed = sample.days;
        self.sample = Some(sample.path);
        self.exists = true;
        Ok(())
    }

    fn check_up_to_date(&mut self) {
        self.up_to_date = match (&self.observed_min, &self.observed_max) {
            (Some(min), Some(max)) => *max >= self.potential_max && *min <= self.potential_min,
            _ => false,
        };
        log!(
            "status";
            "observed {} .. {}, potential {} .. {}: {}",
            display(&self.observed_min),
            display(&self.observed_max),
            self.potential_min,
            self.potential_max,
            if self.up_to_date { "up to date" } else { "behind" }
        );
    }

    /// Ideal grid up to the last observed date, minus what was observed.
    fn check_complete(&mut self) {
        let Some(&last) = self.observed.last() else {
            return;
        };
        let step = match self.schema.source {
            SourceKind::Lake => self.schema.period,
            SourceKind::Store if self.schema.resolution.is_daily_or_coarser() => self.schema.resolution,
            SourceKind::Store => Step::Days(1),
        };
        let lag = match self.schema.source {
            SourceKind::Lake => Days::new(self.schema.time_lag_days as u64),
            SourceKind::Store => Days::new(0),
        };

        self.missing = date_grid(self.schema.potential_min, last, step)
            .into_iter()
            .filter(|d| !self.observed.contains(d))
            .map(|d| d.checked_add_days(lag).unwrap_or(d))
            .collect();

        if let (Some(&first), Some(&last)) = (self.missing.first(), self.missing.last()) {
            self.warnings.push(Warning::MissingDates {
                count: self.missing.len(),
                first,
                last,
            });
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn schema(&self) -> &ReportSchema {
        &self.schema
    }

    #[inline]
    pub const fn exists(&self) -> bool {
        self.exists
    }

    #[inline]
    pub const fn up_to_date(&self) -> bool {
        self.up_to_date
    }

    pub fn observed_min(&self) -> Result<Bound> {
        self.observed_min.ok_or(StoreError::StatusIncomplete)
    }

    pub fn observed_max(&self) -> Result<Bound> {
        self.observed_max.ok_or(StoreError::StatusIncomplete)
    }

    pub const fn potential_min(&self) -> Bound {
        self.potential_min
    }

    pub const fn potential_max(&self) -> Bound {
        self.potential_max
    }

    /// Dates absent from the ideal grid, in file-label terms.
    pub fn missing(&self) -> Result<&BTreeSet<NaiveDate>> {
        if self.exists {
            Ok(&self.missing)
        } else {
            Err(StoreError::StatusIncomplete)
        }
    }

    /// The one lake file kept per date, by date.
    pub fn files(&self) -> &[DatedFile] {
        &self.selected
    }

    /// Every eligible lake file with its true version.
    pub fn catalog(&self) -> &[DatedFile] {
        &self.catalog
    }

    /// Leaf file the store source was read from.
    pub fn sample(&self) -> Option<&Path> {
        self.sample.as_deref()
    }

    /// Versions that appeared since the previous refresh.
    pub const fn added(&self) -> usize {
        self.added
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// What to fetch next; `None` when up to date or nothing is left.
    pub fn requirements(&self) -> Option<UpdateWindow> {
        if self.up_to_date {
            return None;
        }
        let start = match self.observed_max {
            Some(max) if self.exists => self.after(max)?,
            _ => self.potential_min,
        };
        let end = self.potential_max;
        if start > end {
            return None;
        }

        let days = days(start.date(), end.date());
        let lag = Days::new(self.schema.time_lag_days as u64);
        let labels = days
            .iter()
            .map(|d| d.checked_add_days(lag).unwrap_or(*d))
            .collect();
        Some(UpdateWindow {
            start,
            end,
            days,
            labels,
        })
    }

    /// First position after `bound`: one resolution step for instants, one
    /// publication period for dates.
    fn after(&self, bound: Bound) -> Option<Bound> {
        match bound {
            Bound::Instant(t) => {
                let next = self.schema.resolution.advance(t.naive_utc())?;
                Some(Bound::Instant(t.timezone().from_utc_datetime(&next)))
            }
            Bound::Date(d) => {
                let step = if self.schema.period.is_daily_or_coarser() {
                    self.schema.period
                } else {
                    Step::Days(1)
                };
                step.advance(midnight(d)).map(|t| Bound::Date(t.date()))
            }
        }
    }

    /// Serializable view for reports and the CLI.
    pub fn summary(&self) -> StatusSummary {
        StatusSummary {
            report: self.schema.name.to_string(),
            dir: self.dir.clone(),
            exists: self.exists,
            up_to_date: self.up_to_date,
            observed_min: self.observed_min,
            observed_max: self.observed_max,
            potential_min: self.potential_min,
            potential_max: self.potential_max,
            missing: self.missing.iter().copied().collect(),
            files: self.selected.len(),
            added: self.added,
            warnings: self.warnings.clone(),
        }
    }
}

fn display(bound: &Option<Bound>) -> String {
    bound.map_or_else(|| "-".into(), |b| b.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub report: String,
    pub dir: PathBuf,
    pub exists: bool,
    pub up_to_date: bool,
    pub observed_min: Option<Bound>,
    pub observed_max: Option<Bound>,
    pub potential_min: Bound,
    pub potential_max: Bound,
    pub missing: Vec<NaiveDate>,
    pub files: usize,
    pub added: usize,
    pub warnings: Vec<Warning>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Athens;
    use std::fs;
    use tempfile::TempDir;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn lake_schema(min: NaiveDate, max: NaiveDate) -> ReportSchema {
        let mut schema = ReportSchema::new("isp", Step::Days(1)).with_range(min, max);
        schema.source = SourceKind::Lake;
        schema.eligibility.infix = "ISP".into();
        schema
    }

    fn lake(names: &[String]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        dir
    }

    fn labels(days: impl IntoIterator<Item = u32>) -> Vec<String> {
        days.into_iter()
            .map(|d| format!("202401{d:02}_ISP_01.csv"))
            .collect()
    }

    #[test]
    fn test_gap_detection_stops_at_last_observed() {
        let dir = lake(&labels([1, 2, 3, 7, 8, 9, 10]));
        let schema = lake_schema(day(1, 1), day(1, 20));
        let mut status = Status::new(dir.path(), &schema, StatusOptions::default()).unwrap();
        status.refresh(&Timeslice::default(), VersionPolicy::Latest).unwrap();

        assert!(status.exists());
        assert!(!status.up_to_date());
        let missing: Vec<_> = status.missing().unwrap().iter().copied().collect();
        assert_eq!(missing, vec![day(1, 4), day(1, 5), day(1, 6)]);
        assert!(status
            .warnings()
            .iter()
            .any(|w| matches!(w, Warning::MissingDates { count: 3, .. })));
    }

    #[test]
    fn test_up_to_date_over_full_range() {
        let dir = lake(&labels(1..=10));
        let schema = lake_schema(day(1, 1), day(1, 10));
        let mut status = Status::new(dir.path(), &schema, StatusOptions::default()).unwrap();
        status.refresh(&Timeslice::default(), VersionPolicy::Latest).unwrap();

        assert!(status.up_to_date());
        assert!(status.missing().unwrap().is_empty());
        assert!(status.requirements().is_none());
    }

    #[test]
    fn test_time_lag_shifts_and_restores() {
        // labels run one day ahead of the data they hold
        let dir = lake(&labels([2, 3, 5]));
        let mut schema = lake_schema(day(1, 1), day(1, 4));
        schema.time_lag_days = 1;
        let mut status = Status::new(dir.path(), &schema, StatusOptions::default()).unwrap();
        status.refresh(&Timeslice::default(), VersionPolicy::Latest).unwrap();

        assert_eq!(status.observed_min().unwrap(), Bound::Date(day(1, 1)));
        assert_eq!(status.observed_max().unwrap(), Bound::Date(day(1, 4)));
        // data day 01-03 is missing, i.e. the file labelled 01-04
        let missing: Vec<_> = status.missing().unwrap().iter().copied().collect();
        assert_eq!(missing, vec![day(1, 4)]);
    }

    #[test]
    fn test_timeslice_and_versions() {
        let mut names = labels([1, 2, 3]);
        names.push("20240102_ISP_05.csv".into());
        let dir = lake(&names);
        let schema = lake_schema(day(1, 1), day(1, 3));
        let mut status = Status::new(dir.path(), &schema, StatusOptions::default()).unwrap();

        let slice = Timeslice::between(Some(day(1, 2)), None);
        status.refresh(&slice, VersionPolicy::Latest).unwrap();
        let kept: Vec<_> = status.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(kept, vec!["20240102_ISP_05.csv", "20240103_ISP_01.csv"]);

        status.refresh(&Timeslice::default(), VersionPolicy::First).unwrap();
        assert_eq!(status.files().len(), 3);
        assert!(status.files().iter().all(|f| f.version == 1));
    }

    #[test]
    fn test_refresh_reports_added_versions() {
        let dir = lake(&labels([1]));
        let schema = lake_schema(day(1, 1), day(1, 2));
        let mut status = Status::new(dir.path(), &schema, StatusOptions::default()).unwrap();
        status.refresh(&Timeslice::default(), VersionPolicy::Latest).unwrap();
        assert_eq!(status.added(), 1);

        fs::write(dir.path().join("20240102_ISP_01.csv"), "x").unwrap();
        status.refresh(&Timeslice::default(), VersionPolicy::Latest).unwrap();
        assert_eq!(status.added(), 1);
        assert!(status.up_to_date());
    }

    #[test]
    fn test_empty_root_leaves_fields_unset() {
        let dir = TempDir::new().unwrap();
        let schema = lake_schema(day(1, 1), day(1, 3));
        let mut status = Status::new(dir.path(), &schema, StatusOptions::default()).unwrap();
        status.refresh(&Timeslice::default(), VersionPolicy::Latest).unwrap();

        assert!(!status.exists());
        assert!(matches!(status.observed_max(), Err(StoreError::StatusIncomplete)));
        assert!(matches!(status.missing(), Err(StoreError::StatusIncomplete)));

        let window = status.requirements().unwrap();
        assert_eq!(window.start, Bound::Date(day(1, 1)));
        assert_eq!(window.days.len(), 3);
    }

    #[test]
    fn test_store_source_with_timezone() {
        let dir = TempDir::new().unwrap();
        let field = dir.path().join("prices");
        fs::create_dir_all(&field).unwrap();
        // Athens is UTC+2 in early March; 22:00 UTC opens the local day
        fs::write(
            field.join("results.csv"),
            "datetime,mcp\n2024-02-29 22:00,1\n2024-03-01 21:00,2\n",
        )
        .unwrap();

        let mut schema = ReportSchema::new("dam", Step::Hours(1)).with_range(day(3, 1), day(3, 2));
        schema.timezone = Athens;
        let mut status = Status::new(dir.path(), &schema, StatusOptions::default()).unwrap();
        status.refresh(&Timeslice::default(), VersionPolicy::Latest).unwrap();

        assert!(status.exists());
        let max = status.observed_max().unwrap();
        assert_eq!(max.to_string(), "2024-03-01 23:00 EET");
        assert!(!status.up_to_date());

        let window = status.requirements().unwrap();
        assert_eq!(window.start.to_string(), "2024-03-02 00:00 EET");
        assert_eq!(window.end.to_string(), "2024-03-02 23:00 EET");
        assert_eq!(window.days, vec![day(3, 2)]);
    }

    #[test]
    fn test_bound_ordering() {
        let a = Bound::Date(day(1, 1));
        let b = Bound::Date(day(1, 2));
        assert!(a < b);
        assert_eq!(Bound::Date(day(1, 1)).to_string(), "2024-01-01");
    }
}
