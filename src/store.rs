//! One report of a store: its schema, tree and status behind one handle.
//!
//! ```ignore
//! let config = StrataConfig::from_path(Path::new("strata.toml"))?;
//! let mut store = Store::open(&config, "isp")?;
//!
//! if let Some(window) = store.requirements() {
//!     let lobby = fetch(&window)?;           // provided by the orchestrator
//!     let report = store.update(lobby)?;
//! }
//! let prices = store.query("isp.prices.results.mcp", &View::new())?;
//! ```

use crate::{
    config::{Layout, MergeConfig, ReportSchema, SourceKind, StrataConfig},
    error::Result,
    log,
    merge::{MergeReport, Merger},
    node::{DepthMap, Kind, Payload},
    status::{Status, StatusOptions, Timeslice, UpdateWindow, VersionPolicy},
    tree::{Lobby, Tree, TreeOptions, View},
};
use std::path::{Path, PathBuf};
use strata_table::Format;

pub struct Store {
    schema: ReportSchema,
    merge: MergeConfig,
    format: Format,
    options: TreeOptions,
    /// Directory of the report's leaf files.
    dir: PathBuf,
    tree: Tree,
    status: Status,
    timeslice: Timeslice,
    policy: VersionPolicy,
}

impl Store {
    /// Open report `name`: scan its files and compute its status.
    pub fn open(config: &StrataConfig, name: &str) -> Result<Self> {
        let schema = config.report(name)?;
        let root = config.root();
        let layout = config
            .reports
            .get(name)
            .map(|r| r.layout)
            .unwrap_or_default();
        Self::with_schema(
            schema,
            &root,
            layout,
            config.tree_options(),
            config.merge.clone(),
        )
    }

    /// Open a report with an explicit schema below the store `root`.
    pub fn with_schema(
        schema: ReportSchema,
        root: &Path,
        layout: Layout,
        mut options: TreeOptions,
        merge: MergeConfig,
    ) -> Result<Self> {
        options.depth_map = schema.depth_map.clone();
        let dir = root.join(schema.name.as_str());
        let tree_root = match layout {
            Layout::Report => dir.clone(),
            Layout::Store => root.to_path_buf(),
        };
        let tree = Tree::cold(&tree_root, options.clone())?;
        let status = Status::new(&status_dir(&schema, &dir), &schema, status_options(&options))?;

        let mut store = Self {
            format: options.format.clone().for_step(schema.resolution),
            schema,
            merge,
            options,
            dir,
            tree,
            status,
            timeslice: Timeslice::default(),
            policy: VersionPolicy::default(),
        };
        store.status.refresh(&store.timeslice, store.policy)?;
        Ok(store)
    }

    // ------------------------------------------------------------------------
    // Freshness
    // ------------------------------------------------------------------------

    /// Recompute the status with a new timeslice and version policy.
    pub fn refresh(&mut self, timeslice: Timeslice, policy: VersionPolicy) -> Result<&Status> {
        self.timeslice = timeslice;
        self.policy = policy;
        self.status.refresh(&self.timeslice, self.policy)?;
        Ok(&self.status)
    }

    pub fn requirements(&self) -> Option<UpdateWindow> {
        self.status.requirements()
    }

    // ------------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------------

    /// Merge `lobby` (rooted at this report) into the store, then rebuild
    /// the tree and refresh the status.
    pub fn update(&mut self, lobby: Lobby) -> Result<MergeReport> {
        let mut staged_options = self.options.clone();
        staged_options.depth_map = DepthMap::report();
        let staged = Tree::hot(self.schema.name.as_str(), &self.dir, lobby, staged_options, true);

        let persisted = self.persisted_status()?;
        let report = Merger::new(&persisted, &self.merge, &self.format).merge(&staged);

        self.tree = Tree::cold(self.tree.root_path(), self.options.clone())?;
        self.status.refresh(&self.timeslice, self.policy)?;
        log!(
            "store";
            "{}: {} rows merged, {}",
            self.schema.name,
            report.rows(),
            if self.status.up_to_date() { "up to date" } else { "still behind" }
        );
        Ok(report)
    }

    /// Status of the leaf files themselves, whatever the report's source.
    fn persisted_status(&self) -> Result<Status> {
        if self.schema.source == SourceKind::Store {
            return Ok(self.status.clone());
        }
        let mut schema = self.schema.clone();
        schema.source = SourceKind::Store;
        let mut status = Status::new(&self.dir, &schema, status_options(&self.options))?;
        status.refresh(&Timeslice::default(), VersionPolicy::default())?;
        Ok(status)
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    pub fn query(&self, key: &str, view: &View) -> Result<Payload> {
        self.tree.read(key, view)
    }

    /// Keys of the best matches for `terms`.
    pub fn search(&self, terms: &[&str], n_best: usize, kind: Option<Kind>) -> Vec<String> {
        self.tree
            .search(terms, n_best, kind)
            .into_iter()
            .map(|n| n.key.to_string())
            .collect()
    }

    pub fn export(&self, key: &str, destination: &Path, view: &View) -> Result<Vec<PathBuf>> {
        self.tree.export(key, destination, view)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn schema(&self) -> &ReportSchema {
        &self.schema
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn status_dir(schema: &ReportSchema, report_dir: &Path) -> PathBuf {
    match (schema.source, &schema.lake) {
        (SourceKind::Lake, Some(lake)) => lake.clone(),
        _ => report_dir.to_path_buf(),
    }
}

fn status_options(options: &TreeOptions) -> StatusOptions {
    StatusOptions {
        format: options.format.clone(),
        extension: options.extension.to_string(),
        ignore_prefixes: options.ignore_prefixes.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use strata_table::{Cell, RowKey, Step, Table, codec};
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn schema() -> ReportSchema {
        let mut schema = ReportSchema::new("isp", Step::Minutes(30)).with_range(day(1), day(3));
        schema.tz_aware = false;
        schema
    }

    fn open(root: &Path) -> Store {
        Store::with_schema(
            schema(),
            root,
            Layout::Report,
            TreeOptions::default(),
            MergeConfig::default(),
        )
        .unwrap()
    }

    /// Half-hourly load over `days` days starting on 2024-03-01, shuffled.
    fn lobby(days: i64) -> Lobby {
        let start = day(1).and_hms_opt(0, 0, 0).unwrap();
        let mut table = Table::flat(["load", "price"]);
        let slots = days * 48;
        for i in (0..slots).rev() {
            table.push_row(
                RowKey::at(start + Duration::minutes(30 * i)),
                [Cell::Number(i as f64), Cell::Number(50.0)],
            );
        }
        let mut lobby = Lobby::new();
        lobby.insert(&["demand", "total"], table);
        lobby
    }

    #[test]
    fn test_end_to_end_fast_merge() {
        let dir = TempDir::new().unwrap();
        let mut store = open(dir.path());
        assert!(!store.status().exists());
        assert_eq!(store.requirements().unwrap().days.len(), 3);

        let report = store.update(lobby(3)).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.route, crate::merge::Route::Fast);

        let status = store.status();
        assert!(status.exists());
        assert!(status.missing().unwrap().is_empty());

        let leaf = dir.path().join("isp").join("demand").join("total.csv");
        let table = codec::read(&leaf, &Format::default()).unwrap();
        assert_eq!(table.len(), 144);
        assert!(table.is_sorted());
        assert_eq!(table.cell(0, "load"), Some(&Cell::Number(0.0)));
    }

    #[test]
    fn test_update_rebuilds_tree() {
        let dir = TempDir::new().unwrap();
        let mut store = open(dir.path());
        store.update(lobby(1)).unwrap();

        let Payload::Property(load) = store.query("isp.demand.total.load", &View::new()).unwrap() else {
            panic!("expected a property payload");
        };
        assert_eq!(load.len(), 48);
        assert_eq!(store.search(&["demand", "price"], 1, None), vec!["isp.demand.total.price"]);
    }

    #[test]
    fn test_update_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = open(dir.path());
        store.update(lobby(2)).unwrap();
        let leaf = dir.path().join("isp").join("demand").join("total.csv");
        let before = std::fs::read_to_string(&leaf).unwrap();

        store.update(lobby(2)).unwrap();
        assert_eq!(before, std::fs::read_to_string(&leaf).unwrap());
    }

    #[test]
    fn test_export_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = open(dir.path());
        store.update(lobby(1)).unwrap();

        let out = TempDir::new().unwrap();
        let written = store
            .export("isp.demand.total", &out.path().join("copy.csv"), &View::new())
            .unwrap();
        assert_eq!(written.len(), 1);
        let copy = codec::read(&written[0], &Format::default()).unwrap();
        let Payload::File(original) = store.query("isp.demand.total", &View::new()).unwrap() else {
            panic!("expected a file payload");
        };
        assert_eq!(copy.index, original.index);
        assert_eq!(copy.columns, original.columns);
    }
}
