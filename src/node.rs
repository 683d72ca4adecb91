//! Nodes of the store tree and their payloads.
//!
//! A node is one addressable unit of the store: a directory (root, report,
//! field), a leaf file, or one property (column) of a leaf file. Its kind is
//! a pure function of its depth, given by the tree's [`DepthMap`].
//!
//! # Fruit
//!
//! File and property nodes carry a write-once cell for their table. It is
//! empty until the first read and then holds the same `Arc<Table>` for the
//! lifetime of the tree. Concurrent readers may race to compute it; exactly
//! one result is installed and every caller observes that one.

use crate::key::PathKey;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::{
    collections::BTreeMap,
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::{Arc, OnceLock},
};
use strata_table::{Layout, Table};

// ============================================================================
// Kind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Root,
    Report,
    Field,
    File,
    Property,
}

impl Kind {
    pub const ALL: [Kind; 5] = [
        Kind::Root,
        Kind::Report,
        Kind::Field,
        Kind::File,
        Kind::Property,
    ];

    /// Whether nodes of this kind are directories.
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Root | Self::Report | Self::Field)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Report => "report",
            Self::Field => "field",
            Self::File => "file",
            Self::Property => "property",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown node kind `{s}`"))
    }
}

// ============================================================================
// Depth map
// ============================================================================

/// Kind of node found at each depth of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthMap(SmallVec<[Kind; 5]>);

impl DepthMap {
    pub fn new(kinds: impl IntoIterator<Item = Kind>) -> Self {
        Self(kinds.into_iter().collect())
    }

    /// `root/report/field/file/property`, a whole lake.
    pub fn store() -> Self {
        Self::new(Kind::ALL)
    }

    /// `report/field/file/property`, one report directory.
    pub fn report() -> Self {
        Self::new([Kind::Report, Kind::Field, Kind::File, Kind::Property])
    }

    #[inline]
    pub fn kind(&self, depth: usize) -> Option<Kind> {
        self.0.get(depth).copied()
    }

    pub fn depth_of(&self, kind: Kind) -> Option<usize> {
        self.0.iter().position(|k| *k == kind)
    }

    #[inline]
    pub fn max_depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Same mapping for a subtree whose root sits at `depth`.
    pub fn below(&self, depth: usize) -> Self {
        Self(self.0.iter().skip(depth).copied().collect())
    }

    pub fn kinds(&self) -> &[Kind] {
        &self.0
    }
}

impl Default for DepthMap {
    fn default() -> Self {
        Self::report()
    }
}

// ============================================================================
// Node
// ============================================================================

/// Index of a node inside its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub name: CompactString,
    pub depth: usize,
    pub kind: Kind,
    pub key: PathKey,
    /// Directory for containers, backing file for file and property nodes.
    pub path: PathBuf,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Layout of the backing file; properties of long files are column groups.
    pub layout: Layout,
    fruit: OnceLock<Arc<Table>>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        name: &str,
        depth: usize,
        kind: Kind,
        key: PathKey,
        path: PathBuf,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            depth,
            kind,
            key,
            path,
            parent,
            children: Vec::new(),
            layout: Layout::Flat,
            fruit: OnceLock::new(),
        }
    }

    #[inline]
    pub fn is_multiindex(&self) -> bool {
        self.layout == Layout::Long
    }

    /// Cached table, if already materialized.
    #[inline]
    pub fn fruit(&self) -> Option<&Arc<Table>> {
        self.fruit.get()
    }

    /// Install `table` unless a table is already cached; returns the cached one.
    pub(crate) fn install(&self, table: Arc<Table>) -> Arc<Table> {
        Arc::clone(self.fruit.get_or_init(|| table))
    }
}

// ============================================================================
// Payload
// ============================================================================

/// What reading a node yields, tagged by the node's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Property(Arc<Table>),
    File(Arc<Table>),
    Field(BTreeMap<CompactString, Payload>),
    Report(BTreeMap<CompactString, Payload>),
    Root(BTreeMap<CompactString, Payload>),
}

impl Payload {
    pub(crate) fn leaf(kind: Kind, table: Arc<Table>) -> Self {
        match kind {
            Kind::Property => Self::Property(table),
            _ => Self::File(table),
        }
    }

    pub(crate) fn container(kind: Kind, children: BTreeMap<CompactString, Payload>) -> Self {
        match kind {
            Kind::Root => Self::Root(children),
            Kind::Report => Self::Report(children),
            _ => Self::Field(children),
        }
    }

    pub fn table(&self) -> Option<&Arc<Table>> {
        match self {
            Self::Property(t) | Self::File(t) => Some(t),
            _ => None,
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<CompactString, Payload>> {
        match self {
            Self::Field(m) | Self::Report(m) | Self::Root(m) => Some(m),
            _ => None,
        }
    }

    /// Number of leaf tables under this payload.
    pub fn leaf_count(&self) -> usize {
        match self.children() {
            Some(children) => children.values().map(Payload::leaf_count).sum(),
            None => 1,
        }
    }
}
