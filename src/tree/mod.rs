//! The node tree of one store root.
//!
//! Nodes live in a flat arena owned by the [`Tree`] and refer to each other
//! by [`NodeId`]. Parent links and child lists are stored; every other
//! relation (siblings, ascendants, descendants) is computed on demand.
//!
//! | Module     | Purpose                                         |
//! |------------|-------------------------------------------------|
//! | `build`    | cold start from disk, hot start from a [`Lobby`] |
//! | `lookup`   | key/path resolution, attribute scans            |
//! | `search`   | fuzzy suggestions and multi-term search         |
//! | `read`     | materialize, read, export, combine              |

mod build;
mod lookup;
mod read;
mod search;

pub use build::{Entry, Lobby};
pub use lookup::{Attribute, Found, Locator};
pub use read::View;
pub use search::similarity;

use crate::{
    key::PathKey,
    node::{DepthMap, Kind, Node, NodeId},
};
use compact_str::CompactString;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::path::{Path, PathBuf};
use strata_table::Format;

/// How a tree was constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Scanned from the filesystem.
    Cold,
    /// Mirrored from staged, in-memory tables.
    Hot,
}

/// Settings shared by every tree of a store.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    pub depth_map: DepthMap,
    pub format: Format,
    /// Extension of leaf files, without the dot.
    pub extension: CompactString,
    /// Entries whose name starts with one of these are not scanned.
    pub ignore_prefixes: Vec<String>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            depth_map: DepthMap::default(),
            format: Format::default(),
            extension: "csv".into(),
            ignore_prefixes: vec![".".into()],
        }
    }
}

#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    options: TreeOptions,
    mode: Mode,
    by_key: FxHashMap<PathKey, NodeId>,
    by_name: FxHashMap<CompactString, SmallVec<[NodeId; 2]>>,
}

impl Tree {
    /// Tree holding only its root node.
    fn seed(name: &str, path: PathBuf, options: TreeOptions, mode: Mode) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            options,
            mode,
            by_key: FxHashMap::default(),
            by_name: FxHashMap::default(),
        };
        let kind = tree.options.depth_map.kind(0).unwrap_or(Kind::Root);
        tree.insert(name, kind, None, path);
        tree
    }

    /// Add a node under `parent`; depth and key derive from the parent.
    pub(crate) fn insert(
        &mut self,
        name: &str,
        kind: Kind,
        parent: Option<NodeId>,
        path: PathBuf,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let (depth, key) = match parent {
            Some(p) => {
                let parent = &self.nodes[p.index()];
                (parent.depth + 1, parent.key.child(name))
            }
            None => (0, PathKey::root(name)),
        };

        self.nodes
            .push(Node::new(id, name, depth, kind, key.clone(), path, parent));
        if let Some(p) = parent {
            self.nodes[p.index()].children.push(id);
        }
        self.by_key.insert(key, id);
        self.by_name
            .entry(name.to_lowercase().into())
            .or_default()
            .push(id);
        id
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[inline]
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always holds its root; "empty" means nothing below it.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    #[inline]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub const fn options(&self) -> &TreeOptions {
        &self.options
    }

    #[inline]
    pub fn depth_map(&self) -> &DepthMap {
        &self.options.depth_map
    }

    /// Deepest depth the mapping allows.
    #[inline]
    pub fn max_depth(&self) -> usize {
        self.options.depth_map.max_depth()
    }

    pub fn root_path(&self) -> &Path {
        &self.root().path
    }

    pub fn by_key(&self, key: &PathKey) -> Option<&Node> {
        self.by_key.get(key).map(|&id| self.node(id))
    }

    pub(crate) fn named(&self, name: &str) -> &[NodeId] {
        self.by_name
            .get(name.trim().to_lowercase().as_str())
            .map(|ids| ids.as_slice())
            .unwrap_or_default()
    }

    pub fn of_kind(&self, kind: Kind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    // ------------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<&Node> {
        self.node(id).parent.map(|p| self.node(p))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &Node> {
        self.node(id).children.iter().map(|&c| self.node(c))
    }

    pub fn child(&self, id: NodeId, name: &str) -> Option<&Node> {
        self.children(id).find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Other children of the same parent.
    pub fn siblings(&self, id: NodeId) -> Vec<&Node> {
        match self.node(id).parent {
            Some(p) => self.children(p).filter(|n| n.id != id).collect(),
            None => Vec::new(),
        }
    }

    /// Chain of parents, nearest first.
    pub fn ascendants(&self, id: NodeId) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            let node = self.node(p);
            out.push(node);
            current = node.parent;
        }
        out
    }

    /// Every node below `id`, in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            let node = self.node(next);
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Nodes of `kind` related to `id`.
    ///
    /// - deeper kind: descendants of that kind
    /// - same kind: the node and its siblings
    /// - shallower kind: the ascendant of that kind
    pub fn relevants(&self, id: NodeId, kind: Kind) -> Vec<&Node> {
        let node = self.node(id);
        let Some(depth) = self.depth_map().depth_of(kind) else {
            return Vec::new();
        };
        match depth.cmp(&node.depth) {
            std::cmp::Ordering::Greater => self
                .descendants(id)
                .into_iter()
                .filter(|n| n.kind == kind)
                .collect(),
            std::cmp::Ordering::Equal => match node.parent {
                Some(p) => self.children(p).collect(),
                None => vec![node],
            },
            std::cmp::Ordering::Less => self.truncate(id, kind).into_iter().collect(),
        }
    }

    /// The node itself or its ascendant of `kind`; `None` if `kind` is deeper.
    pub fn truncate(&self, id: NodeId, kind: Kind) -> Option<&Node> {
        let node = self.node(id);
        if node.kind == kind {
            return Some(node);
        }
        self.ascendants(id).into_iter().find(|n| n.kind == kind)
    }

    /// Path of a new leaf file named `name` under a container at `dir`.
    pub(crate) fn leaf_path(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.{}", self.options.extension))
    }
}
