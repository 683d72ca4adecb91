//! Resolving keys, paths and handles to nodes.

use super::Tree;
use crate::{
    error::{Result, StoreError},
    key::PathKey,
    node::{Kind, Node, NodeId},
};
use std::{
    path::{Component, Path},
    str::FromStr,
};

/// Number of suggestions attached to a failed lookup.
const SUGGESTIONS: usize = 3;

/// Anything that can name a node.
#[derive(Debug, Clone, Copy)]
pub enum Locator<'a> {
    Key(&'a str),
    Path(&'a Path),
    Node(NodeId),
}

impl<'a> From<&'a str> for Locator<'a> {
    fn from(key: &'a str) -> Self {
        Self::Key(key)
    }
}

impl<'a> From<&'a String> for Locator<'a> {
    fn from(key: &'a String) -> Self {
        Self::Key(key)
    }
}

impl<'a> From<&'a PathKey> for Locator<'a> {
    fn from(key: &'a PathKey) -> Self {
        Self::Key(key.as_str())
    }
}

impl<'a> From<&'a Path> for Locator<'a> {
    fn from(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl From<NodeId> for Locator<'_> {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

/// Node attribute scanned by [`Tree::find_nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Name,
    Key,
    Kind,
    Depth,
    Path,
}

impl FromStr for Attribute {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "key" | "dna" => Ok(Self::Key),
            "kind" => Ok(Self::Kind),
            "depth" => Ok(Self::Depth),
            "path" => Ok(Self::Path),
            other => Err(format!("unknown node attribute `{other}`")),
        }
    }
}

/// Result of an attribute scan.
#[derive(Debug)]
pub enum Found<'t> {
    One(&'t Node),
    Many(Vec<&'t Node>),
}

impl<'t> Found<'t> {
    pub fn into_vec(self) -> Vec<&'t Node> {
        match self {
            Self::One(node) => vec![node],
            Self::Many(nodes) => nodes,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Tree {
    /// Resolve a dotted key, a filesystem path, or a node handle.
    ///
    /// A key whose first segment is not the root's name is relative: it is
    /// anchored at the unique node carrying that name.
    pub fn resolve<'a>(&self, locator: impl Into<Locator<'a>>) -> Result<&Node> {
        match locator.into() {
            Locator::Node(id) if id.index() < self.len() => Ok(self.node(id)),
            Locator::Node(id) => Err(self.not_found(&format!("node #{}", id.index()))),
            Locator::Key(raw) => self.resolve_key(raw),
            Locator::Path(path) => self.resolve_path(path),
        }
    }

    fn resolve_key(&self, raw: &str) -> Result<&Node> {
        let key = PathKey::parse(raw);
        if let Some(node) = self.by_key(&key) {
            return Ok(node);
        }
        let Some(first) = key.first() else {
            return Err(self.not_found(raw));
        };
        if first == self.root().key.as_str() {
            return Err(self.not_found(raw));
        }

        match self.named(first) {
            [] => Err(self.not_found(raw)),
            [anchor] => {
                let full = self.node(*anchor).key.join(&key.tail());
                self.by_key(&full).ok_or_else(|| self.not_found(raw))
            }
            many => Err(StoreError::Ambiguous {
                query: raw.to_string(),
                matches: many.iter().map(|&id| self.node(id).key.to_string()).collect(),
            }),
        }
    }

    fn resolve_path(&self, path: &Path) -> Result<&Node> {
        let relative = match path.strip_prefix(self.root_path()) {
            Ok(rest) => rest,
            Err(_) if path.is_relative() => path,
            Err(_) => return Err(self.not_found(&path.display().to_string())),
        };

        let mut key = self.root().key.clone();
        let mut parts = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .peekable();
        while let Some(part) = parts.next() {
            let part = Path::new(part);
            let name = if parts.peek().is_none() && self.is_leaf_file(part) {
                part.file_stem().unwrap_or(part.as_os_str())
            } else {
                part.as_os_str()
            };
            key = key.child(&name.to_string_lossy());
        }
        self.by_key(&key)
            .ok_or_else(|| self.not_found(&path.display().to_string()))
    }

    pub(super) fn is_leaf_file(&self, part: &Path) -> bool {
        part.extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(&self.options().extension))
    }

    /// Linear scan for nodes whose `attribute` equals `equals`.
    ///
    /// Names and keys compare case-insensitively. With `collapse_if_single`,
    /// a single hit is returned as [`Found::One`].
    pub fn find_nodes(&self, attribute: Attribute, equals: &str, collapse_if_single: bool) -> Result<Found<'_>> {
        let hits: Vec<&Node> = match attribute {
            Attribute::Name => self
                .named(equals)
                .iter()
                .map(|&id| self.node(id))
                .collect(),
            Attribute::Key => self.by_key(&PathKey::parse(equals)).into_iter().collect(),
            Attribute::Kind => match equals.parse::<Kind>() {
                Ok(kind) => self.of_kind(kind).collect(),
                Err(_) => Vec::new(),
            },
            Attribute::Depth => match equals.trim().parse::<usize>() {
                Ok(depth) => self.nodes().filter(|n| n.depth == depth).collect(),
                Err(_) => Vec::new(),
            },
            Attribute::Path => {
                let target = Path::new(equals.trim());
                self.nodes().filter(|n| n.path == target).collect()
            }
        };

        match hits.len() {
            0 => match attribute {
                Attribute::Name | Attribute::Key => Err(self.not_found(equals)),
                _ => Err(StoreError::NotFound {
                    query: format!("{attribute:?} = {equals}").to_lowercase(),
                    suggestions: Vec::new(),
                }),
            },
            1 if collapse_if_single => Ok(Found::One(hits[0])),
            _ => Ok(Found::Many(hits)),
        }
    }

    pub(crate) fn not_found(&self, query: &str) -> StoreError {
        StoreError::NotFound {
            query: query.to_string(),
            suggestions: self.suggest(query, SUGGESTIONS),
        }
    }
}
