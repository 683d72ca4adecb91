//! The [`Table`] type: a time index plus named columns.
//!
//! # Layouts
//!
//! | Layout | Index            | Column names            |
//! |--------|------------------|-------------------------|
//! | `Flat` | timestamp        | one level (`load`)      |
//! | `Long` | timestamp + tag  | two levels (`bids/qty`) |
//!
//! Long tables store several rows per timestamp, told apart by the row tag
//! (e.g. the side of an order book). Their properties are whole top-level
//! column groups rather than single columns.
//!
//! # Zones
//!
//! A `Naive` table holds wall-clock stamps with no zone attached. An `Aware`
//! table holds UTC instants and presents them in its zone: slicing and
//! writing go through [`Table::wall`].

use crate::cell::Cell;
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use compact_str::CompactString;
use std::{collections::HashSet, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Flat,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    #[default]
    Naive,
    Aware(Tz),
}

/// Row identity: timestamp plus an optional tag for long tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub stamp: NaiveDateTime,
    pub tag: Option<CompactString>,
}

impl RowKey {
    pub const fn at(stamp: NaiveDateTime) -> Self {
        Self { stamp, tag: None }
    }

    pub fn tagged(stamp: NaiveDateTime, tag: impl Into<CompactString>) -> Self {
        Self {
            stamp,
            tag: Some(tag.into()),
        }
    }
}

/// Column name, one level for flat tables and two for long tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnName {
    pub top: CompactString,
    pub sub: Option<CompactString>,
}

impl ColumnName {
    pub fn flat(name: impl Into<CompactString>) -> Self {
        Self {
            top: name.into(),
            sub: None,
        }
    }

    pub fn nested(top: impl Into<CompactString>, sub: impl Into<CompactString>) -> Self {
        Self {
            top: top.into(),
            sub: Some(sub.into()),
        }
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub {
            Some(sub) => write!(f, "{}/{}", self.top, sub),
            None => f.write_str(&self.top),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: ColumnName,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn missing(name: ColumnName, len: usize) -> Self {
        Self {
            name,
            cells: vec![Cell::Missing; len],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Cell::is_missing)
    }

    pub fn missing_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_missing()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub layout: Layout,
    pub zone: Zone,
    /// Label of the index column as written in the header.
    pub index_name: CompactString,
    pub index: Vec<RowKey>,
    pub columns: Vec<Column>,
}

impl Table {
    /// Empty flat table with the given columns.
    pub fn flat<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        Self::with_header(Layout::Flat, names.into_iter().map(ColumnName::flat))
    }

    /// Empty table with the given layout and header.
    pub fn with_header(layout: Layout, header: impl IntoIterator<Item = ColumnName>) -> Self {
        Self {
            layout,
            index_name: "datetime".into(),
            columns: header
                .into_iter()
                .map(|name| Column::missing(name, 0))
                .collect(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_long(&self) -> bool {
        self.layout == Layout::Long
    }

    pub fn header(&self) -> Vec<ColumnName> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Distinct top-level names in header order.
    pub fn tops(&self) -> Vec<CompactString> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .filter(|c| seen.insert(c.name.top.clone()))
            .map(|c| c.name.top.clone())
            .collect()
    }

    /// Append one row. Short rows are padded with missing cells.
    pub fn push_row(&mut self, key: RowKey, cells: impl IntoIterator<Item = Cell>) {
        let mut cells = cells.into_iter();
        for column in &mut self.columns {
            column.cells.push(cells.next().unwrap_or_default());
        }
        self.index.push(key);
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.sub.is_none() && c.name.top.eq_ignore_ascii_case(name))
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        self.column(column).and_then(|c| c.cells.get(row))
    }

    pub fn first_stamp(&self) -> Option<NaiveDateTime> {
        self.index.first().map(|k| k.stamp)
    }

    pub fn last_stamp(&self) -> Option<NaiveDateTime> {
        self.index.last().map(|k| k.stamp)
    }

    /// Wall-clock reading of a stored stamp.
    pub fn wall(&self, stamp: NaiveDateTime) -> NaiveDateTime {
        match self.zone {
            Zone::Naive => stamp,
            Zone::Aware(tz) => tz.from_utc_datetime(&stamp).naive_local(),
        }
    }

    /// One-column table for `name`; all missing if the column is absent.
    pub fn project(&self, name: &str) -> Table {
        let column = self
            .column(name)
            .cloned()
            .unwrap_or_else(|| Column::missing(ColumnName::flat(name), self.len()));
        self.with_columns(vec![column])
    }

    /// Every column under the top-level name `top`.
    pub fn group(&self, top: &str) -> Table {
        let columns = self
            .columns
            .iter()
            .filter(|c| c.name.top.eq_ignore_ascii_case(top))
            .cloned()
            .collect();
        self.with_columns(columns)
    }

    /// Same index and metadata, different columns.
    pub fn with_columns(&self, columns: Vec<Column>) -> Table {
        Table {
            layout: self.layout,
            zone: self.zone,
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            columns,
        }
    }

    /// Rows reordered (or subset) by position.
    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            layout: self.layout,
            zone: self.zone,
            index_name: self.index_name.clone(),
            index: rows.iter().map(|&i| self.index[i].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    cells: rows.iter().map(|&i| c.cells[i].clone()).collect(),
                })
                .collect(),
        }
    }

    /// Whether the index is non-decreasing.
    pub fn is_sorted(&self) -> bool {
        self.index.windows(2).all(|w| w[0] <= w[1])
    }
}
