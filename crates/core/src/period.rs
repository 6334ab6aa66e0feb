use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Natural key of a budgeting period: one calendar year+month.
///
/// Periods are always passed explicitly; nothing in the pipeline keeps a
/// process-wide "current period".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: i32,
    pub month: u32,
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl PeriodKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(PeriodKey { year, month })
        } else {
            None
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        PeriodKey {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn start_date(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap()
    }

    /// Last day of the month (inclusive).
    pub fn end_date(self) -> NaiveDate {
        let first_of_next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1).unwrap()
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1).unwrap()
        };
        first_of_next.pred_opt().unwrap()
    }

    pub fn days_in_month(self) -> u32 {
        self.end_date().day()
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn range(self) -> DateRange {
        DateRange::new(self.start_date(), self.end_date())
    }

    /// Number of whole calendar months from `self` to `other`
    /// (positive when `other` is later).
    pub fn months_until(self, other: PeriodKey) -> i32 {
        (other.year - self.year) * 12 + other.month as i32 - self.month as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
