//! Observed range of a persisted store, read from one of its leaf files.
//!
//! Every leaf of a store is merged from the same staged ranges, so one sample
//! file stands in for the whole root.

use super::Timeslice;
use crate::{error::Result, log};
use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};
use strata_table::{Format, codec};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq)]
pub struct LeafSample {
    pub path: PathBuf,
    /// Wall-clock days holding at least one value.
    pub days: BTreeSet<NaiveDate>,
    /// First and last stamps holding a value, naive UTC.
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
}

/// First leaf file below `root`, in file-name order.
pub fn sample_path(root: &Path, extension: &str, ignore_prefixes: &[String]) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !ignore_prefixes
                    .iter()
                    .any(|p| !p.is_empty() && e.file_name().to_string_lossy().starts_with(p.as_str()))
        })
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .is_some_and(|x| x.to_string_lossy().eq_ignore_ascii_case(extension))
        })
        .map(|e| e.into_path())
}

/// Read the sample leaf and collect the days it covers.
///
/// Days are wall-clock days in `tz` when given. Rows outside `timeslice` and
/// rows without any value are ignored. `None` when nothing is left.
pub fn observe(path: &Path, format: &Format, tz: Option<Tz>, timeslice: &Timeslice) -> Result<Option<LeafSample>> {
    let table = codec::read(path, format)?;
    let wall_day = |stamp: NaiveDateTime| match tz {
        Some(tz) => tz.from_utc_datetime(&stamp).date_naive(),
        None => stamp.date(),
    };

    let mut days = BTreeSet::new();
    let mut bounds: Option<(NaiveDateTime, NaiveDateTime)> = None;
    for (row, key) in table.index.iter().enumerate() {
        let day = wall_day(key.stamp);
        if !timeslice.contains(day) {
            continue;
        }
        let has_value = table
            .columns
            .iter()
            .any(|c| c.cells.get(row).is_some_and(|cell| !cell.is_missing()));
        if !has_value {
            continue;
        }
        days.insert(day);
        bounds = Some(match bounds {
            Some((first, last)) => (first.min(key.stamp), last.max(key.stamp)),
            None => (key.stamp, key.stamp),
        });
    }

    let Some((first, last)) = bounds else {
        log!("status"; "no values in {}", path.display());
        return Ok(None);
    };
    Ok(Some(LeafSample {
        path: path.to_path_buf(),
        days,
        first,
        last,
    }))
}
