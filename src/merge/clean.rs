//! The cleaning pipeline every merged table goes through.
//!
//! 1. stable sort by index
//! 2. drop duplicate index entries, keeping the first
//! 3. reindex onto the ideal grid, without filling (flat tables only)
//! 4. coerce mostly-numeric text columns, reporting the rest (flat tables only)
//! 5. optionally drop all-missing columns

use crate::{
    error::{Result, StoreError, Warning},
    log,
};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use strata_table::{Format, Step, Table, TableError, codec};

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub resolution: Step,
    pub float_threshold: f64,
    pub drop_empty: bool,
    /// Start of the ideal grid; the first surviving stamp when unset.
    pub origin: Option<NaiveDateTime>,
}

impl Pipeline {
    pub fn new(resolution: Step, float_threshold: f64) -> Self {
        Self {
            resolution,
            float_threshold,
            drop_empty: true,
            origin: None,
        }
    }

    pub fn keep_empty(mut self) -> Self {
        self.drop_empty = false;
        self
    }

    pub fn starting_at(mut self, origin: NaiveDateTime) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Clean `table` bound for `dest`.
    ///
    /// A table that cannot be reindexed is written next to `dest` for
    /// inspection, and [`StoreError::ReindexFailure`] is returned.
    pub fn run(&self, mut table: Table, dest: &Path, format: &Format) -> Result<(Table, Vec<Warning>)> {
        let mut warnings = Vec::new();

        table.sort_by_index();
        let dropped = table.dedup_index();
        if dropped > 0 {
            log!("merge"; "dropped {} duplicate rows for {}", dropped, dest.display());
        }

        if !table.is_long() {
            table = match table.reindex(self.resolution, self.origin) {
                Ok(reindexed) => reindexed,
                Err(err) => return Err(dump_failure(&table, dest, format, &err)),
            };

            for coercion in table.coerce_numeric(self.float_threshold, format.decimal) {
                if coercion.converted && coercion.unfloatable.is_empty() {
                    continue;
                }
                let warning = Warning::Unfloatable {
                    path: dest.to_path_buf(),
                    column: coercion.column.to_string(),
                    ratio: coercion.ratio,
                    converted: coercion.converted,
                    samples: coercion.unfloatable.into_iter().take(5).collect(),
                };
                log!("warn"; "{}", warning);
                warnings.push(warning);
            }
        }

        if self.drop_empty {
            let empty = table.drop_empty_columns();
            if !empty.is_empty() {
                log!("merge"; "dropped {} empty columns for {}", empty.len(), dest.display());
            }
        }
        Ok((table, warnings))
    }
}

/// `<stem>.reindex-failure.<ext>` next to `dest`.
pub fn failure_path(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match dest.extension() {
        Some(ext) => format!("{stem}.reindex-failure.{}", ext.to_string_lossy()),
        None => format!("{stem}.reindex-failure"),
    };
    dest.with_file_name(name)
}

fn dump_failure(table: &Table, dest: &Path, format: &Format, err: &TableError) -> StoreError {
    let dump = failure_path(dest);
    if let Some(dir) = dump.parent()
        && let Err(io) = std::fs::create_dir_all(dir)
    {
        log!("error"; "cannot create {}: {}", dir.display(), io);
    }
    if let Err(write_err) = codec::write(&dump, table, format) {
        log!("error"; "cannot dump {}: {}", dump.display(), write_err);
    }
    StoreError::ReindexFailure {
        path: dest.to_path_buf(),
        dump,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use strata_table::{Cell, RowKey};
    use tempfile::TempDir;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn staged(rows: &[(NaiveDateTime, &str)]) -> Table {
        let mut table = Table::flat(["price", "note"]);
        for &(t, raw) in rows {
            table.push_row(RowKey::at(t), [Cell::from(raw), Cell::Missing]);
        }
        table
    }

    #[test]
    fn test_pipeline_sorts_dedups_reindexes() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("prices.csv");
        let table = staged(&[(at(1, 0), "3"), (at(0, 0), "1"), (at(0, 0), "9")]);

        let (clean, warnings) = Pipeline::new(Step::Minutes(30), 0.9)
            .run(table, &dest, &Format::default())
            .unwrap();

        assert!(warnings.is_empty());
        assert_eq!(clean.len(), 3);
        assert_eq!(clean.cell(0, "price"), Some(&Cell::Number(1.0)));
        assert!(clean.cell(1, "price").unwrap().is_missing());
        // the all-missing `note` column is gone
        assert_eq!(clean.width(), 1);
    }

    #[test]
    fn test_pipeline_keeps_empty_when_asked() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("prices.csv");
        let table = staged(&[(at(0, 0), "1")]);

        let (clean, _) = Pipeline::new(Step::Minutes(30), 0.9)
            .keep_empty()
            .run(table, &dest, &Format::default())
            .unwrap();
        assert_eq!(clean.width(), 2);
    }

    #[test]
    fn test_pipeline_reports_unfloatable() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("prices.csv");
        let rows: Vec<_> = (0..10)
            .map(|h| (at(h, 0), if h == 9 { "n/a" } else { "5" }))
            .collect();

        let (clean, warnings) = Pipeline::new(Step::Hours(1), 0.9)
            .run(staged(&rows), &dest, &Format::default())
            .unwrap();
        assert!(clean.cell(9, "price").unwrap().is_missing());
        assert!(matches!(
            &warnings[..],
            [Warning::Unfloatable { column, converted: true, samples, .. }]
                if column == "price" && samples == &["n/a"]
        ));
    }

    #[test]
    fn test_pipeline_reports_column_below_threshold() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("prices.csv");
        let rows: Vec<_> = ["1", "abc", "abc", "abc"]
            .into_iter()
            .enumerate()
            .map(|(h, raw)| (at(h as u32, 0), raw))
            .collect();

        let (clean, warnings) = Pipeline::new(Step::Hours(1), 0.9)
            .run(staged(&rows), &dest, &Format::default())
            .unwrap();

        assert_eq!(clean.cell(1, "price"), Some(&Cell::from("abc")));
        let [Warning::Unfloatable { column, ratio, converted, samples, .. }] = &warnings[..] else {
            panic!("expected one unfloatable warning, got {warnings:?}");
        };
        assert_eq!(column, "price");
        assert_eq!(*ratio, 0.25);
        assert!(!converted);
        assert_eq!(samples, &["abc"]);
    }

    #[test]
    fn test_reindex_failure_dumps_table() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("prices.csv");
        let table = staged(&[(at(0, 0), "1"), (at(0, 45), "2")]);

        let err = Pipeline::new(Step::Minutes(30), 0.9)
            .run(table, &dest, &Format::default())
            .unwrap_err();
        let StoreError::ReindexFailure { dump, .. } = err else {
            panic!("expected a reindex failure, got {err:?}");
        };
        assert_eq!(dump, dir.path().join("prices.reindex-failure.csv"));
        assert!(dump.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn test_origin_extends_grid_backwards() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("prices.csv");
        let (clean, _) = Pipeline::new(Step::Minutes(30), 0.9)
            .keep_empty()
            .starting_at(at(0, 0))
            .run(staged(&[(at(1, 0), "2")]), &dest, &Format::default())
            .unwrap();
        assert_eq!(clean.len(), 3);
        assert_eq!(clean.first_stamp(), Some(at(0, 0)));
    }
}
