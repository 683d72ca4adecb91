//! Calendar-aware time steps (`30min`, `1h`, `1D`, `1W`, `1M`).
//!
//! A [`Step`] describes both the resolution of a table index and the
//! publication period of a report. Minute, hour, day and week steps are fixed
//! durations; month steps follow the calendar.
//!
//! Month grids are anchored on their origin: the `k`-th point is the origin
//! plus `k * n` months, clamped to the length of the target month. An origin
//! on the last day of its month anchors every point on a month end, so
//! `2024-01-31, 2024-02-29, 2024-03-31` is one grid.

use crate::error::{Result, TableError};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Minutes(u32),
    Hours(u32),
    Days(u32),
    Weeks(u32),
    Months(u32),
}

impl Step {
    /// Parse a step such as `"30min"`, `"15T"`, `"1h"`, `"D"`, `"1W"`, `"1M"`.
    ///
    /// A missing count means one. `m`/`min`/`T` is minutes. `M` and `MS` are
    /// both months: the anchor day comes from the grid origin, with month-end
    /// origins kept on month ends.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (count, unit) = s.split_at(split);
        let count: u32 = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| TableError::BadStep(s.into()))?
        };
        if count == 0 {
            return Err(TableError::BadStep(s.into()));
        }

        let step = match unit.trim() {
            "M" | "MS" | "mo" | "month" | "months" => Self::Months(count),
            "m" | "T" | "min" | "mins" | "minute" | "minutes" => Self::Minutes(count),
            "h" | "H" | "hour" | "hours" => Self::Hours(count),
            "d" | "D" | "day" | "days" => Self::Days(count),
            "w" | "W" | "week" | "weeks" => Self::Weeks(count),
            _ => return Err(TableError::BadStep(s.into())),
        };
        Ok(step)
    }

    /// Fixed length of the step, `None` for calendar months.
    pub fn fixed(self) -> Option<Duration> {
        match self {
            Self::Minutes(n) => Some(Duration::minutes(n as i64)),
            Self::Hours(n) => Some(Duration::hours(n as i64)),
            Self::Days(n) => Some(Duration::days(n as i64)),
            Self::Weeks(n) => Some(Duration::weeks(n as i64)),
            Self::Months(_) => None,
        }
    }

    /// Whether one step spans at least a whole day.
    pub const fn is_daily_or_coarser(self) -> bool {
        matches!(self, Self::Days(_) | Self::Weeks(_) | Self::Months(_))
    }

    /// The `k`-th point of the grid anchored at `origin`. `None` on overflow.
    pub fn nth(self, origin: NaiveDateTime, k: u32) -> Option<NaiveDateTime> {
        match self {
            Self::Months(n) => {
                let shifted = origin.checked_add_months(Months::new(k.checked_mul(n)?))?;
                if is_month_end(origin.date()) {
                    Some(month_end(shifted.date())?.and_time(shifted.time()))
                } else {
                    Some(shifted)
                }
            }
            _ => {
                let span = self.fixed()?.checked_mul(i32::try_from(k).ok()?)?;
                origin.checked_add_signed(span)
            }
        }
    }

    /// Move `t` one step forward. `None` on calendar overflow.
    pub fn advance(self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        self.nth(t, 1)
    }

    /// Move `t` one step backward. `None` on calendar overflow.
    pub fn retreat(self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Self::Months(n) => {
                let shifted = t.checked_sub_months(Months::new(n))?;
                if is_month_end(t.date()) {
                    Some(month_end(shifted.date())?.and_time(shifted.time()))
                } else {
                    Some(shifted)
                }
            }
            _ => self.fixed().and_then(|d| t.checked_sub_signed(d)),
        }
    }

    /// All grid points from `start` to `end`, both inclusive.
    pub fn grid(self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDateTime> {
        (0..)
            .map_while(|k| self.nth(start, k))
            .take_while(|&t| t <= end)
            .collect()
    }

    /// Whether `t` lies on the grid anchored at `origin`.
    pub fn is_on_grid(self, origin: NaiveDateTime, t: NaiveDateTime) -> bool {
        if t < origin {
            return false;
        }
        match self {
            Self::Months(n) => {
                let months = (t.year() - origin.year()) * 12 + t.month() as i32
                    - origin.month() as i32;
                if months < 0 || months % n as i32 != 0 {
                    return false;
                }
                self.nth(origin, months as u32 / n) == Some(t)
            }
            _ => match self.fixed() {
                Some(d) => {
                    let span = (t - origin).num_seconds();
                    d.num_seconds() > 0 && span % d.num_seconds() == 0
                }
                None => false,
            },
        }
    }
}

fn is_month_end(date: NaiveDate) -> bool {
    date.succ_opt().is_none_or(|next| next.month() != date.month())
}

fn month_end(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)?.checked_add_months(Months::new(1))?.pred_opt()
}

impl FromStr for Step {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minutes(n) => write!(f, "{n}min"),
            Self::Hours(n) => write!(f, "{n}h"),
            Self::Days(n) => write!(f, "{n}D"),
            Self::Weeks(n) => write!(f, "{n}W"),
            Self::Months(n) => write!(f, "{n}M"),
        }
    }
}
