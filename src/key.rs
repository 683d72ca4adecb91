//! Dotted, case-insensitive node keys (`dam.prices.results.mcp`).

use compact_str::CompactString;
use std::fmt;

pub const SEPARATOR: char = '.';

/// Canonical key of a node: lowercase ancestor names joined by dots.
///
/// Equality and ordering work on the lowercase string, so lookups are
/// case-insensitive while node names keep their original spelling.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PathKey(CompactString);

impl PathKey {
    pub fn root(name: &str) -> Self {
        Self(normalize(name))
    }

    /// Parse user input: trims, lowercases, and drops empty segments.
    pub fn parse(raw: &str) -> Self {
        let joined = raw
            .split(SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(".");
        Self(normalize(&joined))
    }

    /// Key of a child named `name`.
    pub fn child(&self, name: &str) -> Self {
        if self.0.is_empty() {
            return Self::root(name);
        }
        let mut key = self.0.clone();
        key.push(SEPARATOR);
        key.push_str(&normalize(name));
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    pub fn first(&self) -> Option<&str> {
        self.segments().next()
    }

    pub fn len(&self) -> usize {
        self.segments().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append the segments of `rest` under this key.
    pub fn join(&self, rest: &PathKey) -> Self {
        rest.segments().fold(self.clone(), |key, seg| key.child(seg))
    }

    /// Key without its first segment.
    pub fn tail(&self) -> Self {
        Self::parse(&self.segments().skip(1).collect::<Vec<_>>().join("."))
    }
}

fn normalize(name: &str) -> CompactString {
    name.trim().to_lowercase().into()
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PathKey {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}
