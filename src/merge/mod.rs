//! Reconciling staged data into the persisted store.
//!
//! A staged [`Tree`] (built hot from a [`Lobby`](crate::tree::Lobby)) mirrors
//! the part of the store it updates: each of its file nodes carries the new
//! table and points at its destination leaf file.
//!
//! # Routes
//!
//! | Route  | Chosen when                                          | Writes        |
//! |--------|------------------------------------------------------|---------------|
//! | `Fast` | store is empty, mode `fast`, or destination is large | appends rows  |
//! | `Slow` | mode `slow`, or destination is small                 | rewrites file |
//!
//! A destination file that does not exist yet is always created in full.
//! Both routes are idempotent: merging the same slice twice changes nothing.

mod clean;
mod diagnose;

pub use clean::{Pipeline, failure_path};
pub use diagnose::{Diagnosis, diagnose};

use crate::{
    config::{MergeConfig, MergeMode, ReportSchema},
    error::{Result, StoreError, Warning},
    log,
    logger::ProgressBars,
    node::{Kind, Node},
    status::Status,
    tree::Tree,
};
use serde::Serialize;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use strata_table::{Format, Table, codec};
use walkdir::WalkDir;

/// Which way a merge run goes, decided once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Fast,
    Slow,
}

/// What happened to one destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// New file written from the staged rows.
    Create,
    /// Rows appended after the last persisted stamp.
    Append,
    /// Whole file reloaded, merged and rewritten.
    Rewrite,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Append => "append",
            Self::Rewrite => "rewrite",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileMerge {
    pub key: String,
    pub path: PathBuf,
    pub strategy: Strategy,
    /// Rows written: appended rows, or the full file for create and rewrite.
    pub rows: usize,
    pub warnings: Vec<Warning>,
}

/// A file whose merge was aborted. Other files of the run still merge.
#[derive(Debug, Clone, Serialize)]
pub struct FailedMerge {
    pub key: String,
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub route: Route,
    pub files: Vec<FileMerge>,
    pub failures: Vec<FailedMerge>,
}

impl MergeReport {
    fn empty(route: Route) -> Self {
        Self {
            route,
            files: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.files.iter().map(|f| f.rows).sum()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.files.iter().flat_map(|f| f.warnings.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Merge engine bound to one report of one store.
pub struct Merger<'a> {
    schema: &'a ReportSchema,
    config: &'a MergeConfig,
    /// Stamp format of the report's leaf files.
    format: Format,
    store_exists: bool,
}

impl<'a> Merger<'a> {
    pub fn new(status: &'a Status, config: &'a MergeConfig, format: &Format) -> Self {
        let schema = status.schema();
        Self {
            schema,
            config,
            format: format.clone().for_step(schema.resolution),
            store_exists: status.exists(),
        }
    }

    /// Route for a run whose destination subtree is `root`.
    pub fn route(&self, root: &Path) -> Route {
        let fast = !self.store_exists
            || match self.config.mode {
                MergeMode::Fast => true,
                MergeMode::Slow => false,
                MergeMode::Auto => directory_size(root) >= self.config.threshold_bytes(),
            };
        if fast { Route::Fast } else { Route::Slow }
    }

    /// Merge every staged file of `staged` into its destination.
    ///
    /// An empty staged tree is a no-op. A failing file is recorded and
    /// logged; the remaining files are still merged.
    pub fn merge(&self, staged: &Tree) -> MergeReport {
        let route = self.route(staged.root_path());
        let mut report = MergeReport::empty(route);

        let files: Vec<&Node> = staged
            .of_kind(Kind::File)
            .filter(|n| n.fruit().is_some())
            .collect();
        if files.is_empty() {
            log!("merge"; "nothing staged for {}", staged.root().key);
            return report;
        }
        log!("merge"; "{} files into {} ({:?})", files.len(), staged.root_path().display(), route);

        let progress = ProgressBars::new_filtered(&[(self.schema.name.as_str(), files.len())]);
        for node in files {
            match self.merge_file(node, route) {
                Ok(Some(merged)) => {
                    for warning in &merged.warnings {
                        log!("warn"; "{}", warning);
                    }
                    report.files.push(merged);
                }
                Ok(None) => {}
                Err(err) => {
                    log!("error"; "{}: {}", node.key, err);
                    report.failures.push(FailedMerge {
                        key: node.key.to_string(),
                        path: node.path.clone(),
                        error: err.to_string(),
                    });
                }
            }
            if let Some(progress) = &progress {
                progress.inc(0);
            }
        }
        if let Some(progress) = progress {
            progress.finish();
        }
        log!("merge"; "{} rows written to {} files", report.rows(), report.files.len());
        report
    }

    /// Merge the staged table of one file node. `None` when nothing is staged.
    pub fn merge_file(&self, node: &Node, route: Route) -> Result<Option<FileMerge>> {
        let Some(table) = node.fruit() else {
            return Ok(None);
        };
        if table.is_empty() {
            return Ok(None);
        }
        let staged = Table::clone(table).into_utc_naive(self.schema.report_tz())?;
        let dest = node.path.as_path();

        let (strategy, rows, warnings) = if !dest.exists() {
            let (rows, warnings) = self.create(staged, dest)?;
            (Strategy::Create, rows, warnings)
        } else if route == Route::Fast {
            let (rows, warnings) = self.append(staged, dest)?;
            (Strategy::Append, rows, warnings)
        } else {
            let (rows, warnings) = self.rewrite(staged, dest)?;
            (Strategy::Rewrite, rows, warnings)
        };

        log!("merge"; "{} {} rows: {}", strategy, rows, dest.display());
        Ok(Some(FileMerge {
            key: node.key.to_string(),
            path: dest.to_path_buf(),
            strategy,
            rows,
            warnings,
        }))
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.schema.resolution, self.config.float_threshold)
    }

    fn create(&self, staged: Table, dest: &Path) -> Result<(usize, Vec<Warning>)> {
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir).map_err(|err| StoreError::Io(dir.to_path_buf(), err))?;
        }
        let (table, warnings) = self.pipeline().run(staged, dest, &self.format)?;
        codec::write(dest, &table, &self.format)?;
        Ok((table.len(), warnings))
    }

    /// Append rows newer than the destination's last stamp.
    fn append(&self, mut staged: Table, dest: &Path) -> Result<(usize, Vec<Warning>)> {
        let header = codec::sniff(dest, &self.format).map_err(|source| StoreError::ShapeMismatch {
            path: dest.to_path_buf(),
            source,
        })?;

        let mut pipeline = self.pipeline().keep_empty();
        if let Some(last) = codec::last_stamp(dest, &self.format)? {
            let stale = staged.retain_after(last);
            if stale > 0 {
                log!("merge"; "skipping {} rows already in {}", stale, dest.display());
            }
            if !staged.is_long()
                && let Some(origin) = self.schema.resolution.advance(last)
            {
                pipeline = pipeline.starting_at(origin);
            }
        }
        if staged.is_empty() {
            return Ok((0, Vec::new()));
        }

        let (mut table, mut warnings) = pipeline.run(staged, dest, &self.format)?;
        let extra = table.align_to(&header.columns);
        if !extra.is_empty() {
            self.widen(dest, &table.header())?;
            warnings.push(Warning::HeaderWidened {
                path: dest.to_path_buf(),
                columns: extra.iter().map(ToString::to_string).collect(),
            });
        }
        codec::append(dest, &table, &self.format)?;
        Ok((table.len(), warnings))
    }

    /// Rewrite `dest` once under a wider header.
    fn widen(&self, dest: &Path, header: &[strata_table::ColumnName]) -> Result<()> {
        let mut persisted = codec::read(dest, &self.format)?;
        persisted.align_to(header);
        codec::write(dest, &persisted, &self.format)?;
        Ok(())
    }

    /// Reload, concatenate, clean and rewrite. Persisted rows win over staged
    /// rows with the same index.
    fn rewrite(&self, staged: Table, dest: &Path) -> Result<(usize, Vec<Warning>)> {
        let persisted = codec::read(dest, &self.format).map_err(|source| match source {
            strata_table::TableError::BadHeader(_) => StoreError::ShapeMismatch {
                path: dest.to_path_buf(),
                source,
            },
            other => StoreError::Table(other),
        })?;
        let merged = persisted.concat(staged);
        let (table, warnings) = self.pipeline().run(merged, dest, &self.format)?;
        codec::write(dest, &table, &self.format)?;
        Ok((table.len(), warnings))
    }
}

/// Total size in bytes of the files below `root`.
pub fn directory_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
