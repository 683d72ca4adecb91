//! Dated lake files: enumeration, true versions, and version selection.
//!
//! A publisher may upload several files for one date (`..._01`, `..._07`).
//! Their suffixes are not sequential, so each file's *true version* is its
//! rank among files sharing the date, in lexicographic name order.

use super::archive;
use crate::{
    config::Eligibility,
    error::{Result, StoreError, Warning},
    log,
    utils::date::extract_date,
};
use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::{
    collections::BTreeSet,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// One eligible file of a lake directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatedFile {
    pub path: PathBuf,
    pub name: String,
    /// Date embedded in the file name.
    pub label: NaiveDate,
    /// Rank among files sharing `label`, starting at 1.
    pub version: u32,
    /// Number of files sharing `label`.
    pub available: u32,
}

/// Which of several same-dated files to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    #[default]
    Latest,
    First,
    /// The n-th version, or the latest one when a date has fewer.
    Exact(u32),
}

impl VersionPolicy {
    /// Target version given the highest version seen in the lake.
    fn target(self, highest: u32) -> u32 {
        match self {
            Self::Latest => highest,
            Self::First => 1,
            Self::Exact(n) => n.max(1),
        }
    }
}

impl FromStr for VersionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" | "last" => Ok(Self::Latest),
            "first" => Ok(Self::First),
            other => other
                .parse::<u32>()
                .map(Self::Exact)
                .map_err(|_| format!("unknown version policy `{other}`")),
        }
    }
}

impl fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::First => f.write_str("first"),
            Self::Exact(n) => write!(f, "{n}"),
        }
    }
}

/// Restriction of a refresh to some dates. Empty means everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeslice {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub dates: Option<BTreeSet<NaiveDate>>,
}

impl Timeslice {
    pub fn between(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start,
            end,
            dates: None,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s)
            && self.end.is_none_or(|e| date <= e)
            && self.dates.as_ref().is_none_or(|set| set.contains(&date))
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.dates.is_none()
    }
}

/// Result of scanning a lake directory.
#[derive(Debug, Default)]
pub struct Scan {
    pub files: Vec<DatedFile>,
    pub warnings: Vec<Warning>,
}

/// List eligible files of `dir` with their true versions.
///
/// Gzip archives whose unpacked name is eligible are unpacked first.
pub fn scan(dir: &Path, eligibility: &Eligibility) -> Result<Scan> {
    if !dir.is_dir() {
        return Ok(Scan::default());
    }
    let pattern = eligibility.compile()?;
    archive::unpack(dir, &pattern)?;

    let mut entries = 0;
    let mut eligible: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| StoreError::Io(dir.to_path_buf(), err))? {
        let entry = entry.map_err(|err| StoreError::Io(dir.to_path_buf(), err))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        entries += 1;
        let name = entry.file_name().to_string_lossy().into_owned();
        if pattern.matches(&name) {
            eligible.push((name, path));
        }
    }
    eligible.sort();

    let mut scan = Scan::default();
    if eligible.is_empty() && entries > 0 {
        scan.warnings.push(Warning::NoEligibleFiles {
            dir: dir.to_path_buf(),
            pattern: pattern.as_str().to_string(),
        });
    }

    let mut dated: Vec<(String, PathBuf, NaiveDate)> = Vec::with_capacity(eligible.len());
    for (name, path) in eligible {
        match extract_date(&name) {
            Some(label) => dated.push((name, path, label)),
            None => scan.warnings.push(Warning::UndatedFile { path }),
        }
    }

    let mut totals: FxHashMap<NaiveDate, u32> = FxHashMap::default();
    for (_, _, label) in &dated {
        *totals.entry(*label).or_default() += 1;
    }
    let mut seen: FxHashMap<NaiveDate, u32> = FxHashMap::default();
    scan.files = dated
        .into_iter()
        .map(|(name, path, label)| {
            let version = seen.entry(label).or_default();
            *version += 1;
            DatedFile {
                path,
                name,
                label,
                version: *version,
                available: totals.get(&label).copied().unwrap_or(*version),
            }
        })
        .collect();

    log!("status"; "{} eligible files in {}", scan.files.len(), dir.display());
    Ok(scan)
}

/// Keep exactly one file per date according to `policy`, ordered by date.
pub fn select(files: &[DatedFile], policy: VersionPolicy) -> Vec<DatedFile> {
    let highest = files.iter().map(|f| f.version).max().unwrap_or(1);
    let target = policy.target(highest);
    let mut kept: Vec<DatedFile> = files
        .iter()
        .filter(|f| {
            if f.available >= target {
                f.version == target
            } else {
                f.version == f.available
            }
        })
        .cloned()
        .collect();
    kept.sort_by_key(|f| f.label);
    kept
}

/// Number of versions that appeared since `previous` was scanned.
pub fn added_since(previous: &[DatedFile], current: &[DatedFile]) -> usize {
    let before: FxHashMap<NaiveDate, u32> =
        previous.iter().map(|f| (f.label, f.available)).collect();
    let mut counted: FxHashMap<NaiveDate, u32> = FxHashMap::default();
    for file in current {
        let old = before.get(&file.label).copied().unwrap_or(0);
        counted.insert(file.label, file.available.saturating_sub(old));
    }
    counted.values().map(|&n| n as usize).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn eligibility() -> Eligibility {
        Eligibility {
            infix: "ISP".into(),
            extension: "csv".into(),
            ..Eligibility::default()
        }
    }

    fn lake(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            fs::write(dir.path().join(name), "datetime,x\n").unwrap();
        }
        dir
    }

    fn versions(label: NaiveDate, n: u32) -> Vec<DatedFile> {
        (1..=n)
            .map(|v| DatedFile {
                path: PathBuf::from(format!("{v}.csv")),
                name: format!("{v}.csv"),
                label,
                version: v,
                available: n,
            })
            .collect()
    }

    #[test]
    fn test_scan_ranks_versions_by_name() {
        let dir = lake(&[
            "20240101_ISP_07.csv",
            "20240101_ISP_02.csv",
            "20240102_ISP_01.csv",
            "20240101_DAM_01.csv",
            "notes.txt",
        ]);
        let scan = scan(dir.path(), &eligibility()).unwrap();
        let summary: Vec<_> = scan
            .files
            .iter()
            .map(|f| (f.name.as_str(), f.version, f.available))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("20240101_ISP_02.csv", 1, 2),
                ("20240101_ISP_07.csv", 2, 2),
                ("20240102_ISP_01.csv", 1, 1),
            ]
        );
        assert!(scan.warnings.is_empty());
    }

    #[test]
    fn test_scan_warns_on_undated_and_unmatched() {
        let dir = lake(&["ISP_latest.csv"]);
        let scan = scan(dir.path(), &eligibility()).unwrap();
        assert!(scan.files.is_empty());
        assert!(matches!(scan.warnings[..], [Warning::UndatedFile { .. }]));

        let dir = lake(&["20240101_DAM.csv"]);
        let scan = super::scan(dir.path(), &eligibility()).unwrap();
        assert!(matches!(scan.warnings[..], [Warning::NoEligibleFiles { .. }]));
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let scan = scan(&dir.path().join("nothing"), &eligibility()).unwrap();
        assert!(scan.files.is_empty());
    }

    #[test]
    fn test_select_exact_and_fallback() {
        let files = versions(day(1), 3);
        let kept = select(&files, VersionPolicy::Exact(2));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].version, 2);

        let kept = select(&files, VersionPolicy::Exact(5));
        assert_eq!(kept[0].version, 3);
    }

    #[test]
    fn test_select_one_per_date() {
        let mut files = versions(day(2), 1);
        files.extend(versions(day(1), 3));
        let latest = select(&files, VersionPolicy::Latest);
        assert_eq!(latest.iter().map(|f| (f.label, f.version)).collect::<Vec<_>>(), vec![(day(1), 3), (day(2), 1)]);

        let first = select(&files, VersionPolicy::First);
        assert!(first.iter().all(|f| f.version == 1));
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_added_since() {
        let before = versions(day(1), 1);
        let mut after = versions(day(1), 2);
        after.extend(versions(day(2), 1));
        assert_eq!(added_since(&before, &after), 2);
        assert_eq!(added_since(&after, &after), 0);
    }

    #[test]
    fn test_timeslice_and_policy_parsing() {
        let slice = Timeslice::between(Some(day(2)), Some(day(4)));
        assert!(slice.contains(day(3)));
        assert!(!slice.contains(day(5)));
        assert!(Timeslice::default().is_empty());

        assert_eq!("LATEST".parse::<VersionPolicy>().unwrap(), VersionPolicy::Latest);
        assert_eq!("2".parse::<VersionPolicy>().unwrap(), VersionPolicy::Exact(2));
        assert!("newest".parse::<VersionPolicy>().is_err());
    }
}
