//! Table algebra used by the merge pipeline and the query surface.

use crate::{
    cell::Cell,
    error::{Result, TableError},
    step::Step,
    table::{Column, ColumnName, RowKey, Table},
};
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};

/// Outcome of coercing one text-bearing column to numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Coercion {
    pub column: ColumnName,
    /// Share of non-missing cells that parsed as numbers.
    pub ratio: f64,
    /// Whether the column now holds numbers. Below the threshold it is left as text.
    pub converted: bool,
    /// Distinct values that do not parse. Dropped when `converted`.
    pub unfloatable: Vec<String>,
}

impl Table {
    /// Stable sort of rows by index.
    pub fn sort_by_index(&mut self) {
        if self.is_sorted() {
            return;
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.index[a].cmp(&self.index[b]));
        *self = self.take(&order);
    }

    /// Drop rows whose index was already seen, keeping the first occurrence.
    ///
    /// Returns the number of dropped rows.
    pub fn dedup_index(&mut self) -> usize {
        let mut seen = HashSet::with_capacity(self.len());
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| seen.insert(&self.index[i]))
            .collect();
        let dropped = self.len() - keep.len();
        if dropped > 0 {
            *self = self.take(&keep);
        }
        dropped
    }

    /// Number of repeated index entries.
    pub fn duplicate_count(&self) -> usize {
        let unique: HashSet<&RowKey> = self.index.iter().collect();
        self.len() - unique.len()
    }

    /// Keep only rows stamped strictly after `stamp`. Returns the number dropped.
    pub fn retain_after(&mut self, stamp: NaiveDateTime) -> usize {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| self.index[i].stamp > stamp)
            .collect();
        let dropped = self.len() - keep.len();
        if dropped > 0 {
            *self = self.take(&keep);
        }
        dropped
    }

    /// Reindex a sorted, deduplicated flat table onto the `step` grid.
    ///
    /// The grid runs from `origin` (or the first stamp) to the last stamp.
    /// Gaps become all-missing rows; nothing is filled. A stamp that does not
    /// sit on the grid is an error.
    pub fn reindex(&self, step: Step, origin: Option<NaiveDateTime>) -> Result<Table> {
        let (Some(first), Some(last)) = (self.first_stamp(), self.last_stamp()) else {
            return Ok(self.clone());
        };
        let origin = origin.unwrap_or(first);

        if let Some(stamp) = self
            .index
            .iter()
            .map(|k| k.stamp)
            .find(|&t| !step.is_on_grid(origin, t))
        {
            return Err(TableError::OffGrid {
                stamp,
                start: origin,
                step: step.to_string(),
            });
        }

        let grid = step.grid(origin, last);
        let position: HashMap<NaiveDateTime, usize> = self
            .index
            .iter()
            .enumerate()
            .map(|(i, k)| (k.stamp, i))
            .collect();

        let mut out = self.with_columns(Vec::new());
        out.index = grid.iter().map(|&t| RowKey::at(t)).collect();
        out.columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                cells: grid
                    .iter()
                    .map(|t| {
                        position
                            .get(t)
                            .map(|&i| c.cells[i].clone())
                            .unwrap_or_default()
                    })
                    .collect(),
            })
            .collect();
        Ok(out)
    }

    /// Stamps missing from the `step` grid between the first and last row.
    pub fn off_grid_gaps(&self, step: Step) -> usize {
        let (Some(first), Some(last)) = (self.first_stamp(), self.last_stamp()) else {
            return 0;
        };
        let present: HashSet<NaiveDateTime> = self.index.iter().map(|k| k.stamp).collect();
        step.grid(first, last)
            .into_iter()
            .filter(|t| !present.contains(t))
            .count()
    }

    /// Convert mostly-numeric text columns to numbers.
    ///
    /// Every column holding text is reported. It is converted when at least
    /// `threshold` of its non-missing cells parse as numbers, in which case
    /// cells that do not parse become missing. Otherwise it is left as text.
    pub fn coerce_numeric(&mut self, threshold: f64, decimal: char) -> Vec<Coercion> {
        let mut report = Vec::new();
        for column in &mut self.columns {
            if !column.cells.iter().any(|c| matches!(c, Cell::Text(_))) {
                continue;
            }
            let present = column.cells.iter().filter(|c| !c.is_missing()).count();
            let mut unfloatable: Vec<String> = Vec::new();
            let mut numeric = 0;
            for cell in &column.cells {
                if cell.to_number(decimal).is_some() {
                    numeric += 1;
                } else if let Cell::Text(raw) = cell
                    && !unfloatable.iter().any(|u| u == raw.as_str())
                {
                    unfloatable.push(raw.to_string());
                }
            }
            let ratio = numeric as f64 / present as f64;
            let converted = ratio >= threshold;

            if converted {
                for cell in &mut column.cells {
                    *cell = cell.to_number(decimal).map_or(Cell::Missing, Cell::Number);
                }
            }
            report.push(Coercion {
                column: column.name.clone(),
                ratio,
                converted,
                unfloatable,
            });
        }
        report
    }

    /// Remove all-missing columns. Returns their names.
    pub fn drop_empty_columns(&mut self) -> Vec<ColumnName> {
        let (empty, kept): (Vec<Column>, Vec<Column>) =
            std::mem::take(&mut self.columns)
                .into_iter()
                .partition(Column::is_empty);
        self.columns = kept;
        empty.into_iter().map(|c| c.name).collect()
    }

    /// Reorder columns to `header`, adding absent ones as missing.
    ///
    /// Columns not in `header` are kept after it, in their current order, and
    /// returned so the caller can widen the destination.
    pub fn align_to(&mut self, header: &[ColumnName]) -> Vec<ColumnName> {
        let len = self.len();
        let mut slots: Vec<Option<Column>> = std::mem::take(&mut self.columns)
            .into_iter()
            .map(Some)
            .collect();

        let mut columns: Vec<Column> = header
            .iter()
            .map(|name| {
                slots
                    .iter_mut()
                    .find(|slot| slot.as_ref().is_some_and(|c| &c.name == name))
                    .and_then(Option::take)
                    .unwrap_or_else(|| Column::missing(name.clone(), len))
            })
            .collect();

        let rest: Vec<Column> = slots.into_iter().flatten().collect();
        let extra = rest.iter().map(|c| c.name.clone()).collect();
        columns.extend(rest);
        self.columns = columns;
        extra
    }

    /// Rows of `self` followed by rows of `other`, over the union of columns.
    pub fn concat(mut self, mut other: Table) -> Table {
        let mut header = self.header();
        for name in other.header() {
            if !header.contains(&name) {
                header.push(name);
            }
        }
        self.align_to(&header);
        other.align_to(&header);

        self.index.append(&mut other.index);
        for (mine, theirs) in self.columns.iter_mut().zip(other.columns) {
            mine.cells.extend(theirs.cells);
        }
        self
    }

    /// Rows whose wall-clock stamp lies within `start..=end`.
    pub fn slice(&self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Table {
        if start.is_none() && end.is_none() {
            return self.clone();
        }
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| {
                let wall = self.wall(self.index[i].stamp);
                start.is_none_or(|s| wall >= s) && end.is_none_or(|e| wall <= e)
            })
            .collect();
        self.take(&keep)
    }

    /// Outer join of several tables on their index.
    ///
    /// Each part is labelled; a column name already taken by an earlier part
    /// is prefixed with its part's label.
    pub fn join_outer(parts: Vec<(String, Table)>) -> Table {
        let Some((_, first)) = parts.first() else {
            return Table::default();
        };
        let mut keys: Vec<RowKey> = parts
            .iter()
            .flat_map(|(_, t)| t.index.iter().cloned())
            .collect();
        keys.sort();
        keys.dedup();

        let mut out = first.with_columns(Vec::new());
        out.index = keys;
        let slot: HashMap<&RowKey, usize> =
            out.index.iter().enumerate().map(|(i, k)| (k, i)).collect();

        let mut columns: Vec<Column> = Vec::new();
        for (label, table) in &parts {
            for column in &table.columns {
                let mut name = column.name.clone();
                if columns.iter().any(|c| c.name == name) {
                    name.top = format!("{label}.{}", name.top).into();
                }
                let mut cells = vec![Cell::Missing; slot.len()];
                for (row, key) in table.index.iter().enumerate() {
                    if let Some(&i) = slot.get(key) {
                        cells[i] = column.cells[row].clone();
                    }
                }
                columns.push(Column { name, cells });
            }
        }
        out.columns = columns;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn series(rows: &[(NaiveDateTime, f64)]) -> Table {
        let mut table = Table::flat(["load"]);
        for &(t, v) in rows {
            table.push_row(RowKey::at(t), [Cell::Number(v)]);
        }
        table
    }

    #[test]
    fn test_sort_is_stable() {
        let mut table = series(&[(at(1, 2, 0), 2.0), (at(1, 1, 0), 1.0), (at(1, 1, 0), 9.0)]);
        table.sort_by_index();
        assert_eq!(table.index[0].stamp, at(1, 1, 0));
        assert_eq!(table.cell(0, "load"), Some(&Cell::Number(1.0)));
        assert_eq!(table.cell(1, "load"), Some(&Cell::Number(9.0)));
    }

    #[test]
    fn test_dedup_keeps_first() {
        let mut table = series(&[(at(1, 0, 0), 1.0), (at(1, 0, 0), 2.0)]);
        assert_eq!(table.duplicate_count(), 1);
        assert_eq!(table.dedup_index(), 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "load"), Some(&Cell::Number(1.0)));
    }

    #[test]
    fn test_reindex_without_fill() {
        let table = series(&[(at(1, 0, 0), 1.0), (at(1, 0, 30), 2.0), (at(1, 2, 0), 3.0)]);
        let reindexed = table.reindex(Step::Minutes(30), None).unwrap();

        assert_eq!(reindexed.len(), 5);
        let missing = reindexed.columns[0].missing_count();
        assert_eq!(missing, 2);
        assert_eq!(reindexed.cell(4, "load"), Some(&Cell::Number(3.0)));
    }

    #[test]
    fn test_reindex_from_origin() {
        let table = series(&[(at(1, 1, 0), 1.0)]);
        let reindexed = table.reindex(Step::Minutes(30), Some(at(1, 0, 0))).unwrap();
        assert_eq!(reindexed.len(), 3);
        assert!(reindexed.cell(0, "load").unwrap().is_missing());
    }

    #[test]
    fn test_reindex_month_ends_keeps_every_value() {
        let end = |m: u32, d: u32| {
            NaiveDate::from_ymd_opt(2024, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let table = series(&[(end(1, 31), 1.0), (end(2, 29), 2.0), (end(3, 31), 3.0)]);
        let reindexed = table.reindex(Step::Months(1), None).unwrap();

        assert_eq!(reindexed.len(), 3);
        assert_eq!(reindexed.last_stamp(), Some(end(3, 31)));
        assert_eq!(reindexed.cell(2, "load"), Some(&Cell::Number(3.0)));
        assert_eq!(reindexed.columns[0].missing_count(), 0);
    }

    #[test]
    fn test_reindex_month_end_gap() {
        let end = |m: u32, d: u32| {
            NaiveDate::from_ymd_opt(2024, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let table = series(&[(end(1, 31), 1.0), (end(4, 30), 4.0)]);
        let reindexed = table.reindex(Step::Months(1), None).unwrap();

        let stamps: Vec<_> = reindexed.index.iter().map(|k| k.stamp).collect();
        assert_eq!(stamps, vec![end(1, 31), end(2, 29), end(3, 31), end(4, 30)]);
        assert_eq!(reindexed.columns[0].missing_count(), 2);
    }

    #[test]
    fn test_reindex_off_grid_fails() {
        let table = series(&[(at(1, 0, 0), 1.0), (at(1, 0, 45), 2.0)]);
        let err = table.reindex(Step::Minutes(30), None).unwrap_err();
        assert!(matches!(err, TableError::OffGrid { .. }));
    }

    #[test]
    fn test_off_grid_gaps() {
        let table = series(&[(at(1, 0, 0), 1.0), (at(1, 2, 0), 3.0)]);
        assert_eq!(table.off_grid_gaps(Step::Minutes(30)), 3);
    }

    #[test]
    fn test_coerce_numeric_threshold() {
        let mut table = Table::flat(["price", "label"]);
        for (i, raw) in ["1.0", "2.5", "3", "4", "5", "6", "7", "8", "9", "n/a"]
            .iter()
            .enumerate()
        {
            table.push_row(
                RowKey::at(at(1, i as u32, 0)),
                [Cell::from(*raw), Cell::from("text")],
            );
        }

        let report = table.coerce_numeric(0.9, '.');
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].column, ColumnName::flat("price"));
        assert!(report[0].converted);
        assert_eq!(report[0].unfloatable, vec!["n/a".to_string()]);
        assert_eq!(table.cell(1, "price"), Some(&Cell::Number(2.5)));
        assert!(table.cell(9, "price").unwrap().is_missing());

        assert_eq!(report[1].column, ColumnName::flat("label"));
        assert!(!report[1].converted);
        assert_eq!(report[1].ratio, 0.0);
        assert_eq!(table.cell(0, "label"), Some(&Cell::from("text")));
    }

    #[test]
    fn test_coerce_numeric_below_threshold_keeps_text() {
        let mut table = Table::flat(["price"]);
        for (i, raw) in ["1", "abc", "abc", "abc"].iter().enumerate() {
            table.push_row(RowKey::at(at(1, i as u32, 0)), [Cell::from(*raw)]);
        }

        let report = table.coerce_numeric(0.9, '.');
        assert_eq!(report.len(), 1);
        assert!(!report[0].converted);
        assert_eq!(report[0].ratio, 0.25);
        assert_eq!(report[0].unfloatable, vec!["abc".to_string()]);
        assert_eq!(table.cell(0, "price"), Some(&Cell::from("1")));
        assert_eq!(table.cell(1, "price"), Some(&Cell::from("abc")));
    }

    #[test]
    fn test_drop_empty_columns() {
        let mut table = Table::flat(["a", "b"]);
        table.push_row(RowKey::at(at(1, 0, 0)), [Cell::Number(1.0), Cell::Missing]);
        let dropped = table.drop_empty_columns();
        assert_eq!(dropped, vec![ColumnName::flat("b")]);
        assert_eq!(table.width(), 1);
    }

    #[test]
    fn test_align_to_reports_extra_columns() {
        let mut table = Table::flat(["c", "a"]);
        table.push_row(RowKey::at(at(1, 0, 0)), [Cell::Number(3.0), Cell::Number(1.0)]);

        let extra = table.align_to(&[ColumnName::flat("a"), ColumnName::flat("b")]);
        assert_eq!(extra, vec![ColumnName::flat("c")]);
        assert_eq!(
            table.header(),
            vec![
                ColumnName::flat("a"),
                ColumnName::flat("b"),
                ColumnName::flat("c")
            ]
        );
        assert!(table.cell(0, "b").unwrap().is_missing());
    }

    #[test]
    fn test_concat_unions_columns() {
        let left = series(&[(at(1, 0, 0), 1.0)]);
        let mut right = Table::flat(["load", "price"]);
        right.push_row(RowKey::at(at(1, 1, 0)), [Cell::Number(2.0), Cell::Number(50.0)]);

        let joined = left.concat(right);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.width(), 2);
        assert!(joined.cell(0, "price").unwrap().is_missing());
    }

    #[test]
    fn test_slice_inclusive() {
        let table = series(&[(at(1, 0, 0), 1.0), (at(2, 0, 0), 2.0), (at(3, 0, 0), 3.0)]);
        let sliced = table.slice(Some(at(2, 0, 0)), Some(at(3, 0, 0)));
        assert_eq!(sliced.len(), 2);
        assert_eq!(sliced.slice(None, Some(at(2, 0, 0))).len(), 1);
    }

    #[test]
    fn test_join_outer_labels_collisions() {
        let a = series(&[(at(1, 0, 0), 1.0)]);
        let b = series(&[(at(1, 1, 0), 2.0)]);
        let joined = Table::join_outer(vec![("north".into(), a), ("south".into(), b)]);

        assert_eq!(joined.len(), 2);
        assert_eq!(
            joined.header(),
            vec![ColumnName::flat("load"), ColumnName::flat("south.load")]
        );
        assert!(joined.cell(1, "load").unwrap().is_missing());
    }

    #[test]
    fn test_retain_after() {
        let mut table = series(&[(at(1, 0, 0), 1.0), (at(1, 1, 0), 2.0)]);
        assert_eq!(table.retain_after(at(1, 0, 0)), 1);
        assert_eq!(table.first_stamp(), Some(at(1, 1, 0)));
    }
}
