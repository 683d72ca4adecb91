//! Integrity report of one leaf file.

use crate::error::Result;
use chrono::{Duration, NaiveDateTime};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
};
use strata_table::{Format, Step, Table, codec};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub path: PathBuf,
    pub long_format: bool,
    pub rows: usize,
    pub columns: usize,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    /// Given, or the most common spacing of the index.
    pub resolution: Option<String>,
    pub duplicates: usize,
    /// Grid slots between first and last stamp with no row.
    pub missing_records: usize,
    pub unsorted: bool,
    /// Missing cells per column, in header order.
    pub missing_cells: Vec<(String, usize)>,
}

impl Diagnosis {
    /// Whether the file would come out of the cleaning pipeline unchanged.
    pub fn is_healthy(&self) -> bool {
        self.duplicates == 0 && self.missing_records == 0 && !self.unsorted
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stamp = |t: Option<NaiveDateTime>| t.map_or_else(|| "-".into(), |t| t.to_string());
        writeln!(f, "{}", self.path.display())?;
        writeln!(f, "  span        {} .. {}", stamp(self.first), stamp(self.last))?;
        writeln!(f, "  shape       {} rows x {} columns", self.rows, self.columns)?;
        writeln!(f, "  resolution  {}", self.resolution.as_deref().unwrap_or("-"))?;
        writeln!(f, "  duplicates  {}", self.duplicates)?;
        writeln!(f, "  missing     {} records", self.missing_records)?;
        write!(f, "  sorted      {}", if self.unsorted { "no" } else { "yes" })?;
        for (column, missing) in self.missing_cells.iter().filter(|(_, n)| *n > 0) {
            write!(f, "\n  {column}: {missing} missing cells")?;
        }
        Ok(())
    }
}

/// Inspect `path` without modifying it.
///
/// `resolution` is inferred from the index when not given.
pub fn diagnose(path: &Path, format: &Format, resolution: Option<Step>) -> Result<Diagnosis> {
    let table = codec::read(path, format)?;
    let unsorted = !table.is_sorted();
    let duplicates = table.duplicate_count();

    let mut sorted = table.clone();
    sorted.sort_by_index();
    sorted.dedup_index();
    let resolution = resolution.or_else(|| infer_step(&sorted));
    let missing_records = match resolution {
        Some(step) if !table.is_long() => sorted.off_grid_gaps(step),
        _ => 0,
    };

    Ok(Diagnosis {
        path: path.to_path_buf(),
        long_format: table.is_long(),
        rows: table.len(),
        columns: table.width(),
        first: sorted.first_stamp(),
        last: sorted.last_stamp(),
        resolution: resolution.map(|s| s.to_string()),
        duplicates,
        missing_records,
        unsorted,
        missing_cells: table
            .columns
            .iter()
            .map(|c| (c.name.to_string(), c.missing_count()))
            .collect(),
    })
}

/// Most common positive spacing between consecutive stamps.
fn infer_step(table: &Table) -> Option<Step> {
    let mut counts: FxHashMap<i64, usize> = FxHashMap::default();
    for pair in table.index.windows(2) {
        let gap = (pair[1].stamp - pair[0].stamp).num_minutes();
        if gap > 0 {
            *counts.entry(gap).or_default() += 1;
        }
    }
    let (minutes, _) = counts
        .into_iter()
        .max_by_key(|&(gap, n)| (n, std::cmp::Reverse(gap)))?;
    let minutes = u32::try_from(minutes).ok()?;

    let day = Duration::days(1).num_minutes() as u32;
    Some(if minutes % day == 0 {
        Step::Days(minutes / day)
    } else if minutes % 60 == 0 {
        Step::Hours(minutes / 60)
    } else {
        Step::Minutes(minutes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_diagnose_finds_problems() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("load.csv");
        fs::write(
            &path,
            "datetime,load,note\n\
             2024-03-01 00:00,1,\n\
             2024-03-01 01:00,3,\n\
             2024-03-01 00:30,2,\n\
             2024-03-01 01:00,3,\n\
             2024-03-01 02:30,5,x\n",
        )
        .unwrap();

        let report = diagnose(&path, &Format::default(), None).unwrap();
        assert_eq!(report.rows, 5);
        assert_eq!(report.columns, 2);
        assert!(report.unsorted);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.resolution.as_deref(), Some("30min"));
        // 01:30 and 02:00 have no row
        assert_eq!(report.missing_records, 2);
        assert_eq!(report.missing_cells, vec![(String::from("load"), 0), (String::from("note"), 4)]);
        assert!(!report.is_healthy());
        assert!(report.to_string().contains("note: 4 missing cells"));
    }

    #[test]
    fn test_diagnose_clean_daily_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daily.csv");
        fs::write(&path, "date,price\n2024-03-01,1\n2024-03-02,2\n2024-03-03,3\n").unwrap();

        let report = diagnose(&path, &Format::default(), Some(Step::Days(1))).unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.first.map(|t| t.date().to_string()).as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn test_infer_step_units() {
        let table = codec::read_str(
            "datetime,x\n2024-03-01 00:00,1\n2024-03-01 01:00,1\n2024-03-01 02:00,1\n",
            &Format::default(),
        )
        .unwrap();
        assert_eq!(infer_step(&table), Some(Step::Hours(1)));
    }
}
