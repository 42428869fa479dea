//! Common types used across the tracker

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date range, start inclusive and end exclusive
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Whether the date falls within this range
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    /// Number of days covered by the range
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}
