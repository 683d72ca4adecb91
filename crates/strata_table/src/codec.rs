//! Delimited-text codec.
//!
//! # File shape
//!
//! Flat files carry one header row, the first cell naming the index:
//!
//! ```text
//! datetime,load,price
//! 2024-03-01 00:00,512.5,88.1
//! ```
//!
//! Long files carry two header rows (top and sub names). The first two cells
//! of each header row are placeholders for the index columns, which is also
//! how a long file is recognized when only its header is sniffed:
//!
//! ```text
//! datetime,,bids,bids,asks
//! ,,qty,price,qty
//! 2024-03-01 00:00,buy,10,55.2,
//! ```
//!
//! Stamps are written as wall times of the table's zone. Data in a store is
//! naive UTC, so wall time and UTC coincide there.

use crate::{
    cell::Cell,
    error::{Result, TableError},
    step::Step,
    table::{ColumnName, Layout, RowKey, Table},
};
use chrono::{
    NaiveDate, NaiveDateTime,
    format::{Item, StrftimeItems},
};
use compact_str::CompactString;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::{
    fmt::Write as _,
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom},
    path::Path,
};

/// Default stamp format for intraday data.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";
/// Stamp format for daily or coarser data.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Stamp formats tried after the configured one.
const FALLBACK_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Bytes read from the end of a file to find its last row.
const TAIL_CHUNK: u64 = 64 * 1024;

/// Text conventions shared by every file of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub separator: u8,
    pub decimal: char,
    pub datetime: CompactString,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            separator: b',',
            decimal: '.',
            datetime: DATETIME_FORMAT.into(),
        }
    }
}

impl Format {
    /// Use the date-only stamp format when `step` spans whole days.
    pub fn for_step(mut self, step: Step) -> Self {
        if step.is_daily_or_coarser() {
            self.datetime = DATE_FORMAT.into();
        }
        self
    }

    /// Whether `datetime` is a usable strftime pattern.
    pub fn is_valid_datetime(pattern: &str) -> bool {
        !pattern.is_empty() && !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
    }

    pub fn parse_stamp(&self, raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        std::iter::once(self.datetime.as_str())
            .chain(FALLBACK_FORMATS.iter().copied())
            .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
            .or_else(|| {
                std::iter::once(self.datetime.as_str())
                    .chain([DATE_FORMAT])
                    .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }

    fn render_stamp(&self, stamp: NaiveDateTime, row: usize) -> Result<String> {
        let mut out = String::new();
        write!(out, "{}", stamp.format(&self.datetime)).map_err(|_| {
            TableError::BadTimestamp {
                raw: self.datetime.to_string(),
                row,
            }
        })?;
        Ok(out)
    }
}

/// Header of a file, read without touching data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub layout: Layout,
    pub index_name: CompactString,
    pub columns: Vec<ColumnName>,
}

impl Header {
    /// Distinct top-level names in order.
    pub fn tops(&self) -> Vec<CompactString> {
        let mut tops: Vec<CompactString> = Vec::new();
        for name in &self.columns {
            if !tops.contains(&name.top) {
                tops.push(name.top.clone());
            }
        }
        tops
    }
}

// ============================================================================
// Reading
// ============================================================================

pub fn read(path: &Path, format: &Format) -> Result<Table> {
    let file = File::open(path).map_err(|err| TableError::Io(path.to_path_buf(), err))?;
    read_from(file, format, path)
}

pub fn read_str(text: &str, format: &Format) -> Result<Table> {
    read_from(text.as_bytes(), format, Path::new("<memory>"))
}

/// Read only the header rows of a file.
pub fn sniff(path: &Path, format: &Format) -> Result<Header> {
    let file = File::open(path).map_err(|err| TableError::Io(path.to_path_buf(), err))?;
    let mut records = reader(format, file).into_records();
    let mut next = || -> Result<Option<StringRecord>> {
        records
            .next()
            .transpose()
            .map_err(|err| TableError::Csv(path.to_path_buf(), err))
    };
    let first = next()?.ok_or_else(|| TableError::BadHeader(format!("{} is empty", path.display())))?;
    let second = if is_long_header(&first) { next()? } else { None };
    parse_header(&first, second.as_ref())
}

fn read_from<R: io::Read>(source: R, format: &Format, origin: &Path) -> Result<Table> {
    let csv_err = |err| TableError::Csv(origin.to_path_buf(), err);
    let mut records = reader(format, source).into_records();

    let first = records
        .next()
        .transpose()
        .map_err(csv_err)?
        .ok_or_else(|| TableError::BadHeader(format!("{} is empty", origin.display())))?;
    let second = if is_long_header(&first) {
        records.next().transpose().map_err(csv_err)?
    } else {
        None
    };
    let header = parse_header(&first, second.as_ref())?;

    let mut table = Table::with_header(header.layout, header.columns);
    table.index_name = header.index_name;
    let skip = if table.is_long() { 2 } else { 1 };

    for (row, record) in records.enumerate() {
        let record = record.map_err(csv_err)?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let raw = record.get(0).unwrap_or_default();
        let stamp = format
            .parse_stamp(raw)
            .ok_or_else(|| TableError::BadTimestamp {
                raw: raw.to_string(),
                row,
            })?;
        let key = match table.layout {
            Layout::Flat => RowKey::at(stamp),
            Layout::Long => RowKey {
                stamp,
                tag: record
                    .get(1)
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(Into::into),
            },
        };
        let cells = record
            .iter()
            .skip(skip)
            .map(|raw| Cell::parse(raw, format.decimal));
        table.push_row(key, cells);
    }
    Ok(table)
}

fn reader<R: io::Read>(format: &Format, source: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(format.separator)
        .has_headers(false)
        .flexible(true)
        .from_reader(source)
}

fn is_placeholder(field: &str) -> bool {
    let field = field.trim();
    field.is_empty() || field.starts_with("Unnamed")
}

fn is_long_header(first: &StringRecord) -> bool {
    first.iter().skip(1).any(is_placeholder)
}

fn parse_header(first: &StringRecord, second: Option<&StringRecord>) -> Result<Header> {
    let index_name: CompactString = first.get(0).unwrap_or_default().trim().into();
    match second {
        None => Ok(Header {
            layout: Layout::Flat,
            index_name,
            columns: first
                .iter()
                .skip(1)
                .map(|name| ColumnName::flat(name.trim()))
                .collect(),
        }),
        Some(second) => {
            let tops: Vec<&str> = first.iter().skip(2).map(str::trim).collect();
            let subs: Vec<&str> = second.iter().skip(2).map(str::trim).collect();
            if tops.len() != subs.len() || tops.iter().any(|t| is_placeholder(t)) {
                return Err(TableError::BadHeader(
                    "two-level header rows do not line up".into(),
                ));
            }
            Ok(Header {
                layout: Layout::Long,
                index_name,
                columns: tops
                    .into_iter()
                    .zip(subs)
                    .map(|(top, sub)| ColumnName::nested(top, sub))
                    .collect(),
            })
        }
    }
}

/// Stamp of the last data row, read from the end of the file.
///
/// `None` when the file holds nothing but its header.
pub fn last_stamp(path: &Path, format: &Format) -> Result<Option<NaiveDateTime>> {
    let io_err = |err| TableError::Io(path.to_path_buf(), err);
    let mut file = File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(TAIL_CHUNK)))
        .map_err(io_err)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(io_err)?;

    let text = String::from_utf8_lossy(&buf);
    let Some(line) = text.lines().rev().find(|l| !l.trim().is_empty()) else {
        return Ok(None);
    };
    let first = line
        .split(format.separator as char)
        .next()
        .unwrap_or_default()
        .trim_matches('"');
    Ok(format.parse_stamp(first))
}

// ============================================================================
// Writing
// ============================================================================

/// Write `table` to `path`, replacing any existing file.
pub fn write(path: &Path, table: &Table, format: &Format) -> Result<()> {
    let file = File::create(path).map_err(|err| TableError::Io(path.to_path_buf(), err))?;
    let mut writer = WriterBuilder::new()
        .delimiter(format.separator)
        .has_headers(false)
        .from_writer(file);
    let csv_err = |err| TableError::Csv(path.to_path_buf(), err);

    for row in header_rows(table) {
        writer.write_record(&row).map_err(csv_err)?;
    }
    write_rows(&mut writer, table, format, path)?;
    writer
        .flush()
        .map_err(|err| TableError::Io(path.to_path_buf(), err))
}

/// Append the rows of `table` to an existing file without touching its header.
pub fn append(path: &Path, table: &Table, format: &Format) -> Result<()> {
    let file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|err| TableError::Io(path.to_path_buf(), err))?;
    let mut writer = WriterBuilder::new()
        .delimiter(format.separator)
        .has_headers(false)
        .from_writer(file);
    write_rows(&mut writer, table, format, path)?;
    writer
        .flush()
        .map_err(|err| TableError::Io(path.to_path_buf(), err))
}

fn header_rows(table: &Table) -> Vec<Vec<String>> {
    match table.layout {
        Layout::Flat => {
            let mut row = vec![table.index_name.to_string()];
            row.extend(table.columns.iter().map(|c| c.name.top.to_string()));
            vec![row]
        }
        Layout::Long => {
            let mut tops = vec![table.index_name.to_string(), String::new()];
            let mut subs = vec![String::new(), String::new()];
            for column in &table.columns {
                tops.push(column.name.top.to_string());
                subs.push(column.name.sub.as_deref().unwrap_or_default().to_string());
            }
            vec![tops, subs]
        }
    }
}

fn write_rows<W: io::Write>(
    writer: &mut csv::Writer<W>,
    table: &Table,
    format: &Format,
    path: &Path,
) -> Result<()> {
    let mut record: Vec<CompactString> = Vec::with_capacity(table.width() + 2);
    for (row, key) in table.index.iter().enumerate() {
        record.clear();
        record.push(format.render_stamp(table.wall(key.stamp), row)?.into());
        if table.is_long() {
            record.push(key.tag.clone().unwrap_or_default());
        }
        record.extend(table.columns.iter().map(|c| c.cells[row].render(format.decimal)));
        writer
            .write_record(record.iter().map(|f| f.as_bytes()))
            .map_err(|err| TableError::Csv(path.to_path_buf(), err))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_read_flat() {
        let text = "datetime,load,price\n2024-03-01 00:00,512.5,88\n2024-03-01 00:30,,90\n";
        let table = read_str(text, &Format::default()).unwrap();

        assert_eq!(table.layout, Layout::Flat);
        assert_eq!(table.index_name, "datetime");
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "load"), Some(&Cell::Number(512.5)));
        assert!(table.cell(1, "load").unwrap().is_missing());
        assert_eq!(table.index[1].stamp, at(1, 0, 30));
    }

    #[test]
    fn test_read_long() {
        let text = "datetime,,bids,bids\n,,qty,price\n2024-03-01 00:00,buy,10,55.5\n2024-03-01 00:00,sell,4,\n";
        let table = read_str(text, &Format::default()).unwrap();

        assert!(table.is_long());
        assert_eq!(table.header()[1], ColumnName::nested("bids", "price"));
        assert_eq!(table.index[1], RowKey::tagged(at(1, 0, 0), "sell"));
        assert!(table.columns[1].cells[1].is_missing());
    }

    #[test]
    fn test_read_foreign_separators() {
        let format = Format {
            separator: b';',
            decimal: ',',
            ..Format::default()
        };
        let table = read_str("datetime;load\n2024-03-01 00:00;1,5\n", &format).unwrap();
        assert_eq!(table.cell(0, "load"), Some(&Cell::Number(1.5)));
    }

    #[test]
    fn test_read_bad_stamp() {
        let err = read_str("datetime,load\nnot-a-date,1\n", &Format::default()).unwrap_err();
        assert!(matches!(err, TableError::BadTimestamp { .. }));
    }

    #[test]
    fn test_parse_stamp_fallbacks() {
        let format = Format::default();
        assert_eq!(format.parse_stamp("2024-03-01 00:30:00"), Some(at(1, 0, 30)));
        assert_eq!(format.parse_stamp("2024-03-01"), Some(at(1, 0, 0)));
        assert_eq!(format.parse_stamp("datetime"), None);
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("load.csv");
        let format = Format::default();

        let mut table = Table::flat(["load"]);
        table.push_row(RowKey::at(at(1, 0, 0)), [Cell::Number(1.5)]);
        table.push_row(RowKey::at(at(1, 0, 30)), [Cell::Missing]);
        write(&path, &table, &format).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "datetime,load\n2024-03-01 00:00,1.5\n2024-03-01 00:30,\n");
        assert_eq!(read(&path, &format).unwrap(), table);
    }

    #[test]
    fn test_write_long_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.csv");
        let mut table = Table::with_header(Layout::Long, [ColumnName::nested("bids", "qty")]);
        table.push_row(RowKey::tagged(at(1, 0, 0), "buy"), [Cell::Number(3.0)]);
        write(&path, &table, &Format::default()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "datetime,,bids\n,,qty\n2024-03-01 00:00,buy,3\n");

        let header = sniff(&path, &Format::default()).unwrap();
        assert_eq!(header.layout, Layout::Long);
        assert_eq!(header.tops(), vec!["bids"]);
    }

    #[test]
    fn test_append_and_last_stamp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("load.csv");
        let format = Format::default();

        let mut table = Table::flat(["load"]);
        write(&path, &table, &format).unwrap();
        assert_eq!(last_stamp(&path, &format).unwrap(), None);

        table.push_row(RowKey::at(at(2, 23, 30)), [Cell::Number(4.0)]);
        append(&path, &table, &format).unwrap();
        assert_eq!(last_stamp(&path, &format).unwrap(), Some(at(2, 23, 30)));
        assert_eq!(read(&path, &format).unwrap().len(), 1);
    }

    #[test]
    fn test_sniff_flat() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("load.csv");
        fs::write(&path, "datetime,north,south\n2024-03-01 00:00,1,2\n").unwrap();

        let header = sniff(&path, &Format::default()).unwrap();
        assert_eq!(header.layout, Layout::Flat);
        assert_eq!(
            header.columns,
            vec![ColumnName::flat("north"), ColumnName::flat("south")]
        );
    }

    #[test]
    fn test_date_only_format_for_daily_steps() {
        let format = Format::default().for_step(Step::Days(1));
        assert_eq!(format.datetime, DATE_FORMAT);
        assert!(Format::is_valid_datetime("%Y-%m-%d"));
        assert!(!Format::is_valid_datetime("%Q-%"));
    }
}
