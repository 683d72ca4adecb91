//! Day-level date helpers: dates embedded in file names, day grids, and
//! lenient parsing of user-supplied bounds.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use strata_table::Step;

/// Length of an embedded `YYYYMMDD` stamp.
const STAMP_LEN: usize = 8;

/// The first run of eight ASCII digits in `name`, read as `YYYYMMDD`.
///
/// Longer digit runs contribute their first eight digits. Returns `None`
/// when there is no such run or it is not a calendar date.
pub fn extract_date(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    let start = bytes
        .windows(STAMP_LEN)
        .position(|w| w.iter().all(u8::is_ascii_digit))?;
    let digits = &bytes[start..start + STAMP_LEN];

    let year = parse_digits(&digits[0..4])?;
    let month = parse_digits(&digits[4..6])?;
    let day = parse_digits(&digits[6..8])?;
    NaiveDate::from_ymd_opt(year as i32, month, day)
}

/// Parse a run of ASCII digits.
#[inline]
fn parse_digits(bytes: &[u8]) -> Option<u32> {
    bytes.iter().try_fold(0u32, |acc, &b| {
        let d = b.wrapping_sub(b'0');
        (d <= 9).then(|| acc * 10 + d as u32)
    })
}

#[inline]
pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Every date from `start` to `end` stepped by `period`, both inclusive.
///
/// Sub-daily periods collapse to one entry per day.
pub fn date_grid(start: NaiveDate, end: NaiveDate, period: Step) -> Vec<NaiveDate> {
    let period = if period.is_daily_or_coarser() {
        period
    } else {
        Step::Days(1)
    };
    period
        .grid(midnight(start), midnight(end))
        .into_iter()
        .map(|t| t.date())
        .collect()
}

/// Days from `start` to `end`, both inclusive.
pub fn days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Parse `YYYY-MM-DD` or `YYYYMMDD`.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| (raw.len() == STAMP_LEN).then(|| extract_date(raw)).flatten())
}

/// Parse a day or a `YYYY-MM-DD HH:MM[:SS]` instant (a `T` separator works too).
pub fn parse_instant(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_day(raw).map(midnight))
}

/// Like [`parse_instant`], but a bare day means its last second.
pub fn parse_instant_end(raw: &str) -> Option<NaiveDateTime> {
    match parse_day(raw) {
        Some(day) => day.and_hms_opt(23, 59, 59),
        None => parse_instant(raw),
    }
}
