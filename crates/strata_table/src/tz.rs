//! Timezone pipeline: localize, convert, optionally strip.

use crate::{
    error::{Result, TableError},
    table::{Table, Zone},
};
use chrono::{LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

/// Conversion applied to a table on the way out of the store.
///
/// Stored stamps are naive. They are first read as wall times in `source`
/// (UTC for data on disk), then presented in `target`. With `strip` the
/// result is naive again, holding wall times of `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TzPipe {
    pub source: Tz,
    pub target: Tz,
    pub strip: bool,
}

impl TzPipe {
    /// Stored UTC to `target`, zone kept.
    pub const fn to(target: Tz) -> Self {
        Self {
            source: Tz::UTC,
            target,
            strip: false,
        }
    }

    pub const fn stripped(mut self) -> Self {
        self.strip = true;
        self
    }

    pub fn apply(&self, table: &Table) -> Result<Table> {
        let mut out = table.clone();
        if out.zone == Zone::Naive {
            out.localize(self.source)?;
        }
        out.zone = Zone::Aware(self.target);
        if self.strip {
            out.strip_zone();
        }
        Ok(out)
    }
}

impl Table {
    /// Interpret naive stamps as wall times in `tz`.
    ///
    /// Ambiguous wall times (repeated hour when clocks go back) resolve to the
    /// earlier instant; wall times skipped by a forward shift are an error.
    pub fn localize(&mut self, tz: Tz) -> Result<()> {
        for key in &mut self.index {
            key.stamp = to_utc(tz, key.stamp)?;
        }
        self.zone = Zone::Aware(tz);
        Ok(())
    }

    /// Replace instants with their wall times in the current zone.
    pub fn strip_zone(&mut self) {
        if let Zone::Aware(tz) = self.zone {
            for key in &mut self.index {
                key.stamp = tz.from_utc_datetime(&key.stamp).naive_local();
            }
        }
        self.zone = Zone::Naive;
    }

    /// Bring a table to naive UTC, the on-disk convention.
    ///
    /// Aware tables already hold UTC instants. Naive tables are read as wall
    /// times of `source` when given, otherwise assumed to be UTC already.
    pub fn into_utc_naive(mut self, source: Option<Tz>) -> Result<Table> {
        match (self.zone, source) {
            (Zone::Aware(_), _) => {}
            (Zone::Naive, Some(tz)) => self.localize(tz)?,
            (Zone::Naive, None) => {}
        }
        self.zone = Zone::Naive;
        Ok(self)
    }
}

pub fn to_utc(tz: Tz, wall: NaiveDateTime) -> Result<NaiveDateTime> {
    match tz.from_local_datetime(&wall) {
        LocalResult::Single(dt) => Ok(dt.naive_utc()),
        LocalResult::Ambiguous(a, b) => Ok(a.min(b).naive_utc()),
        LocalResult::None => Err(TableError::Timezone(format!(
            "{wall} does not exist in {tz}"
        ))),
    }
}
