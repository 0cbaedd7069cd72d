//! Date-range reconciliation.
//!
//! Works out which target dates still need a report, given the last date
//! the ledger has recorded, an optional minimum start date and the maximum
//! number of dates a single batch may post.

use chrono::{Datelike, Days, NaiveDate};
use std::fmt;

/// Floor used when neither the ledger nor the operator supplies a start.
pub fn epoch_floor() -> NaiveDate {
    NaiveDate::from_ymd_opt(1000, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Half-open interval `[start, end)` of dates still requiring a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// True when there is nothing left to report.
    pub fn is_up_to_date(&self) -> bool {
        self.start >= self.end
    }

    /// Number of dates in the range.
    pub fn len_days(&self) -> u64 {
        (self.end - self.start).num_days().max(0) as u64
    }

    /// Dates in ascending order. Lazy and restartable.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Compute the next batch of dates.
///
/// `start` is the day after the last recorded date, never earlier than
/// `min_start_date`. `end` is at most `max_days` after `start` and never
/// past `current_date`, and never before `start`.
pub fn compute_range(
    last_recorded_date: Option<NaiveDate>,
    min_start_date: Option<NaiveDate>,
    max_days: u32,
    current_date: NaiveDate,
) -> DateRange {
    let floor = min_start_date.unwrap_or_else(epoch_floor);

    let start = match last_recorded_date {
        Some(last) => last.succ_opt().unwrap_or(last).max(floor),
        None => floor,
    };

    let capped = start
        .checked_add_days(Days::new(u64::from(max_days)))
        .unwrap_or(current_date);
    let end = capped.min(current_date).max(start);

    DateRange { start, end }
}

/// First day of the ISO week (Monday) containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}' (expected YYYY-MM-DD): {}", s, e))
}
