//! Allocation-period entity model.

use chrono::NaiveDate;
use granta_core::types::DbId;
use serde::Serialize;
use sqlx::FromRow;

/// A named, dated funding interval (an allowance year or an instructional
/// term). Projects transition between lifecycle states at its boundaries.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AllocationPeriod {
    pub id: DbId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl AllocationPeriod {
    /// Whether the given civil date falls inside the period, inclusive.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}
