//! Materializing, reading and exporting node payloads.

use super::{Locator, Tree};
use crate::{
    error::{Result, StoreError},
    node::{Kind, NodeId, Payload},
};
use chrono::NaiveDateTime;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use strata_table::{Table, TzPipe, codec};

/// Optional conversion and date window applied by [`Tree::read`].
///
/// The timezone pipeline runs first; `start` and `end` are inclusive and
/// compared on the resulting wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct View {
    pub tz: Option<TzPipe>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl View {
    pub const fn new() -> Self {
        Self {
            tz: None,
            start: None,
            end: None,
        }
    }

    pub const fn with_tz(mut self, tz: TzPipe) -> Self {
        self.tz = Some(tz);
        self
    }

    pub const fn between(mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    fn apply(&self, table: &Table) -> Result<Table> {
        let converted = match &self.tz {
            Some(pipe) => pipe.apply(table)?,
            None => table.clone(),
        };
        Ok(converted.slice(self.start, self.end))
    }
}

impl Tree {
    /// Payload of a node, reading its backing file at most once.
    ///
    /// Reading a file installs the column slice of every property below it,
    /// so later property lookups do not touch the disk.
    pub fn materialize<'a>(&self, locator: impl Into<Locator<'a>>) -> Result<Payload> {
        let id = self.resolve(locator)?.id;
        self.materialize_id(id)
    }

    fn materialize_id(&self, id: NodeId) -> Result<Payload> {
        let node = self.node(id);
        match node.kind {
            Kind::File => Ok(Payload::File(self.file_table(id)?)),
            Kind::Property => Ok(Payload::Property(self.property_table(id)?)),
            kind => {
                let mut children = BTreeMap::new();
                for child in &node.children {
                    let child = self.node(*child);
                    children.insert(child.name.clone(), self.materialize_id(child.id)?);
                }
                Ok(Payload::container(kind, children))
            }
        }
    }

    fn file_table(&self, id: NodeId) -> Result<Arc<Table>> {
        let node = self.node(id);
        if let Some(table) = node.fruit() {
            return Ok(Arc::clone(table));
        }
        let table = codec::read(&node.path, &self.options().format)?;
        let table = node.install(Arc::new(table));
        self.propagate(id, &table);
        Ok(table)
    }

    fn property_table(&self, id: NodeId) -> Result<Arc<Table>> {
        let node = self.node(id);
        if let Some(table) = node.fruit() {
            return Ok(Arc::clone(table));
        }
        let parent = self
            .parent(id)
            .filter(|p| p.kind == Kind::File)
            .ok_or_else(|| StoreError::Kind {
                key: node.key.to_string(),
                kind: node.kind,
                expected: "a property below a file",
            })?;
        let file = self.file_table(parent.id)?;
        self.propagate(parent.id, &file);
        Ok(node.install(Arc::new(slice_property(&file, &node.name))))
    }

    /// Install property slices of `table` on every child of `file`.
    fn propagate(&self, file: NodeId, table: &Table) {
        for child in self.children(file) {
            if child.fruit().is_none() {
                child.install(Arc::new(slice_property(table, &child.name)));
            }
        }
    }

    /// A copy of the payload, optionally timezone-converted and sliced.
    pub fn read<'a>(&self, locator: impl Into<Locator<'a>>, view: &View) -> Result<Payload> {
        let payload = self.materialize(locator)?;
        apply_view(payload, view)
    }

    /// Write the payload of a node below `destination`.
    ///
    /// A file or property goes to `destination` itself when it carries the
    /// store extension, otherwise to `<destination>/<name>.<ext>`. Containers
    /// recreate their subtree's layout under `destination`. Returns the
    /// written paths.
    pub fn export<'a>(
        &self,
        locator: impl Into<Locator<'a>>,
        destination: &Path,
        view: &View,
    ) -> Result<Vec<PathBuf>> {
        let node = self.resolve(locator)?;
        let format = &self.options().format;

        let targets: Vec<(NodeId, PathBuf)> = if node.kind.is_container() {
            self.descendants(node.id)
                .into_iter()
                .filter(|n| n.kind == Kind::File)
                .map(|file| {
                    let relative = file.path.strip_prefix(&node.path).unwrap_or(&file.path);
                    (file.id, destination.join(relative))
                })
                .collect()
        } else if self.is_leaf_file(destination) {
            vec![(node.id, destination.to_path_buf())]
        } else {
            vec![(node.id, self.leaf_path(destination, &node.name))]
        };

        let mut written = Vec::with_capacity(targets.len());
        for (id, target) in targets {
            let payload = self.read(id, view)?;
            let Some(table) = payload.table() else {
                continue;
            };
            if let Some(dir) = target.parent() {
                fs::create_dir_all(dir).map_err(|err| StoreError::Io(dir.to_path_buf(), err))?;
            }
            codec::write(&target, table, format)?;
            written.push(target);
        }
        Ok(written)
    }

    /// Column-wise outer join of several file or property tables.
    ///
    /// Colliding column names are prefixed with the node key.
    pub fn combine<'a, L>(&self, locators: impl IntoIterator<Item = L>, view: &View) -> Result<Table>
    where
        L: Into<Locator<'a>>,
    {
        let mut parts = Vec::new();
        for locator in locators {
            let node = self.resolve(locator)?;
            let payload = self.read(node.id, view)?;
            let table = payload.table().ok_or_else(|| StoreError::Kind {
                key: node.key.to_string(),
                kind: node.kind,
                expected: "a file or property",
            })?;
            parts.push((node.key.to_string(), Table::clone(table)));
        }
        Ok(Table::join_outer(parts))
    }

    /// Create every field directory. Idempotent; returns the number of fields.
    pub fn make_dirs(&self) -> Result<usize> {
        let mut count = 0;
        for field in self.of_kind(Kind::Field) {
            fs::create_dir_all(&field.path)
                .map_err(|err| StoreError::Io(field.path.clone(), err))?;
            count += 1;
        }
        Ok(count)
    }
}

fn slice_property(table: &Table, name: &str) -> Table {
    if table.is_long() {
        table.group(name)
    } else {
        table.project(name)
    }
}

fn apply_view(payload: Payload, view: &View) -> Result<Payload> {
    Ok(match payload {
        Payload::Property(t) => Payload::Property(Arc::new(view.apply(&t)?)),
        Payload::File(t) => Payload::File(Arc::new(view.apply(&t)?)),
        Payload::Field(m) => Payload::Field(apply_children(m, view)?),
        Payload::Report(m) => Payload::Report(apply_children(m, view)?),
        Payload::Root(m) => Payload::Root(apply_children(m, view)?),
    })
}

fn apply_children<K: Ord>(children: BTreeMap<K, Payload>, view: &View) -> Result<BTreeMap<K, Payload>> {
    children
        .into_iter()
        .map(|(name, payload)| Ok((name, apply_view(payload, view)?)))
        .collect()
}
