//! Tree construction.
//!
//! - **Cold start** scans a directory. Directories become container nodes,
//!   leaf files become file nodes, and each file's header is sniffed once
//!   (no data rows) to enumerate its properties.
//! - **Hot start** mirrors a [`Lobby`] of staged tables with the same rules.
//!
//! In both cases an entry whose kind does not fit its depth is skipped, so
//! kind stays a pure function of depth.

use super::{Mode, Tree, TreeOptions};
use crate::{
    error::{Result, StoreError},
    log,
    node::{Kind, NodeId},
};
use compact_str::CompactString;
use rustc_hash::FxHashMap;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use strata_table::{Layout, Table, codec};
use walkdir::{DirEntry, WalkDir};

// ============================================================================
// Lobby
// ============================================================================

/// Freshly parsed data waiting to be merged: nested names down to tables.
///
/// Nesting mirrors the store below the lobby's root, e.g.
/// `field -> file -> table` for a lobby rooted at a report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lobby {
    entries: BTreeMap<CompactString, Entry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Branch(Lobby),
    Leaf(Table),
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `table` at `path` (containers first, file name last).
    ///
    /// Intermediate branches are created as needed; an existing leaf on the
    /// way is replaced by a branch.
    pub fn insert(&mut self, path: &[&str], table: Table) {
        let Some((last, dirs)) = path.split_last() else {
            return;
        };
        let mut current = self;
        for dir in dirs {
            let entry = current
                .entries
                .entry((*dir).into())
                .or_insert_with(|| Entry::Branch(Lobby::new()));
            if matches!(entry, Entry::Leaf(_)) {
                *entry = Entry::Branch(Lobby::new());
            }
            let Entry::Branch(lobby) = entry else {
                return;
            };
            current = lobby;
        }
        current.entries.insert((*last).into(), Entry::Leaf(table));
    }

    pub fn entries(&self) -> impl Iterator<Item = (&CompactString, &Entry)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    pub fn leaf_count(&self) -> usize {
        self.entries
            .values()
            .map(|e| match e {
                Entry::Branch(lobby) => lobby.leaf_count(),
                Entry::Leaf(_) => 1,
            })
            .sum()
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Tree {
    /// Scan `root` and build the tree of everything below it.
    ///
    /// A missing root yields a tree holding only its root node.
    pub fn cold(root: &Path, options: TreeOptions) -> Result<Self> {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".into());
        let mut tree = Self::seed(&name, root.to_path_buf(), options, Mode::Cold);
        if !root.is_dir() {
            return Ok(tree);
        }

        let prefixes = tree.options.ignore_prefixes.clone();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(tree.max_depth())
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored(e, &prefixes));

        let mut dirs: FxHashMap<PathBuf, NodeId> = FxHashMap::default();
        dirs.insert(root.to_path_buf(), tree.root().id);

        for entry in walker {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(root).to_path_buf();
                StoreError::Io(path, err.into())
            })?;
            let path = entry.path();
            let Some(&parent) = path.parent().and_then(|p| dirs.get(p)) else {
                continue;
            };
            let kind = tree.depth_map().kind(entry.depth());

            if entry.file_type().is_dir() {
                match kind {
                    Some(kind) if kind.is_container() => {
                        let id = tree.insert(&entry_name(&entry), kind, Some(parent), path.into());
                        dirs.insert(path.to_path_buf(), id);
                    }
                    _ => log!("tree"; "skipping directory at leaf depth: {}", path.display()),
                }
            } else if has_extension(path, &tree.options.extension) {
                match kind {
                    Some(Kind::File) => tree.plant_file(parent, path)?,
                    _ => log!("tree"; "skipping file outside leaf depth: {}", path.display()),
                }
            }
        }
        Ok(tree)
    }

    /// Mirror a lobby rooted at a node named `name` stored at `root`.
    ///
    /// With `attach`, leaf tables become the file nodes' fruit; otherwise only
    /// their shape is used and reads go to disk.
    pub fn hot(name: &str, root: &Path, lobby: Lobby, options: TreeOptions, attach: bool) -> Self {
        let mut tree = Self::seed(name, root.to_path_buf(), options, Mode::Hot);
        let root_id = tree.root().id;
        tree.plant_lobby(root_id, lobby, attach);
        tree
    }

    fn plant_lobby(&mut self, parent: NodeId, lobby: Lobby, attach: bool) {
        let depth = self.node(parent).depth + 1;
        let kind = self.depth_map().kind(depth);
        let dir = self.node(parent).path.clone();

        for (name, entry) in lobby.entries {
            match (entry, kind) {
                (Entry::Branch(branch), Some(kind)) if kind.is_container() => {
                    let id = self.insert(&name, kind, Some(parent), dir.join(name.as_str()));
                    self.plant_lobby(id, branch, attach);
                }
                (Entry::Leaf(table), Some(Kind::File)) => {
                    let path = self.leaf_path(&dir, &name);
                    let id = self.insert(&name, Kind::File, Some(parent), path);
                    let properties = property_names(table.layout, &table.header());
                    self.plant_properties(id, table.layout, &properties);
                    if attach {
                        self.node(id).install(Arc::new(table));
                    }
                }
                _ => log!("tree"; "skipping staged `{}` at depth {}", name, depth),
            }
        }
    }

    /// Add a file node and one property per column (or column group).
    fn plant_file(&mut self, parent: NodeId, path: &Path) -> Result<()> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = self.insert(&stem, Kind::File, Some(parent), path.to_path_buf());

        match codec::sniff(path, &self.options.format) {
            Ok(header) => {
                let properties = property_names(header.layout, &header.columns);
                self.plant_properties(id, header.layout, &properties);
            }
            Err(err) => log!("tree"; "no properties for {}: {}", path.display(), err),
        }
        Ok(())
    }

    fn plant_properties(&mut self, file: NodeId, layout: Layout, names: &[CompactString]) {
        self.node_mut(file).layout = layout;
        let depth = self.node(file).depth + 1;
        if self.depth_map().kind(depth) != Some(Kind::Property) {
            return;
        }
        let path = self.node(file).path.clone();
        for name in names {
            let id = self.insert(name, Kind::Property, Some(file), path.clone());
            self.node_mut(id).layout = layout;
        }
    }
}

/// Property names of a header: columns for flat files, groups for long ones.
fn property_names(layout: Layout, header: &[strata_table::ColumnName]) -> Vec<CompactString> {
    let mut names: Vec<CompactString> = Vec::new();
    for column in header {
        let name = match layout {
            Layout::Flat => column.to_string().into(),
            Layout::Long => column.top.clone(),
        };
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn entry_name(entry: &DirEntry) -> String {
    entry.file_name().to_string_lossy().into_owned()
}

fn is_ignored(entry: &DirEntry, prefixes: &[String]) -> bool {
    let name = entry.file_name().to_string_lossy();
    prefixes.iter().any(|p| !p.is_empty() && name.starts_with(p.as_str()))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::PathKey;
    use std::fs;
    use tempfile::TempDir;

    fn lake() -> TempDir {
        let dir = TempDir::new().unwrap();
        let report = dir.path().join("dam");
        fs::create_dir_all(report.join("prices")).unwrap();
        fs::create_dir_all(report.join("book")).unwrap();
        fs::create_dir_all(report.join(".cache")).unwrap();
        fs::write(
            report.join("prices/results.csv"),
            "datetime,mcp,volume\n2024-03-01 00:00,90,10\n",
        )
        .unwrap();
        fs::write(
            report.join("book/orders.csv"),
            "datetime,,bids,bids,asks\n,,qty,price,qty\n2024-03-01 00:00,buy,1,2,3\n",
        )
        .unwrap();
        fs::write(report.join("prices/notes.txt"), "not data").unwrap();
        fs::write(report.join(".cache/stale.csv"), "datetime,x\n").unwrap();
        fs::write(report.join("stray.csv"), "datetime,x\n").unwrap();
        dir
    }

    #[test]
    fn test_cold_start_scans_layout() {
        let dir = lake();
        let tree = Tree::cold(&dir.path().join("dam"), TreeOptions::default()).unwrap();

        assert_eq!(tree.mode(), Mode::Cold);
        assert_eq!(tree.root().kind, Kind::Report);
        let keys: Vec<_> = tree.nodes().map(|n| n.key.to_string()).collect();
        assert!(keys.contains(&"dam.prices.results.mcp".to_string()));
        assert!(keys.contains(&"dam.book.orders.bids".to_string()));
        assert!(!keys.iter().any(|k| k.contains("cache")));
        assert!(!keys.iter().any(|k| k.contains("notes")));
        // a leaf file at field depth does not fit the layout
        assert!(!keys.iter().any(|k| k.contains("stray")));
    }

    #[test]
    fn test_cold_start_detects_long_files() {
        let dir = lake();
        let tree = Tree::cold(&dir.path().join("dam"), TreeOptions::default()).unwrap();

        let orders = tree.by_key(&PathKey::parse("dam.book.orders")).unwrap();
        assert!(orders.is_multiindex());
        let props: Vec<_> = tree.children(orders.id).map(|n| n.name.to_string()).collect();
        assert_eq!(props, vec!["bids", "asks"]);
        // sniffing does not read data
        assert!(orders.fruit().is_none());
    }

    #[test]
    fn test_cold_start_missing_root() {
        let dir = TempDir::new().unwrap();
        let tree = Tree::cold(&dir.path().join("nothing"), TreeOptions::default()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.root().name, "nothing");
    }

    #[test]
    fn test_hot_start_with_and_without_payload() {
        let lobby = crate::tree::tests::sample_lobby();
        let attached = Tree::hot("dam", Path::new("/lake/dam"), lobby.clone(), TreeOptions::default(), true);
        let results = attached.by_key(&PathKey::parse("dam.prices.results")).unwrap();
        assert_eq!(results.fruit().unwrap().len(), 1);

        let shaped = Tree::hot("dam", Path::new("/lake/dam"), lobby, TreeOptions::default(), false);
        let results = shaped.by_key(&PathKey::parse("dam.prices.results")).unwrap();
        assert!(results.fruit().is_none());
        assert_eq!(shaped.children(results.id).count(), 2);
    }

    #[test]
    fn test_lobby_insert_and_count() {
        let mut lobby = Lobby::new();
        assert!(lobby.is_empty());
        lobby.insert(&["prices", "results"], Table::flat(["mcp"]));
        lobby.insert(&["prices", "offers"], Table::flat(["qty"]));
        lobby.insert(&[], Table::flat(["ignored"]));
        assert_eq!(lobby.leaf_count(), 2);
        assert_eq!(lobby.entries().count(), 1);
    }
}
