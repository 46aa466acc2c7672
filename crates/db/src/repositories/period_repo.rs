//! Repository for the `allocation_periods` table.

use chrono::NaiveDate;
use granta_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::period::AllocationPeriod;

const COLUMNS: &str = "id, name, start_date, end_date";

/// Provides lookup operations for allocation periods.
pub struct PeriodRepo;

impl PeriodRepo {
    /// Insert a new period.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<AllocationPeriod, sqlx::Error> {
        let query = format!(
            "INSERT INTO allocation_periods (name, start_date, end_date)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AllocationPeriod>(&query)
            .bind(name)
            .bind(start_date)
            .bind(end_date)
            .fetch_one(executor)
            .await
    }

    /// Find a period by internal ID.
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<AllocationPeriod>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM allocation_periods WHERE id = $1");
        sqlx::query_as::<_, AllocationPeriod>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find a period by exact name.
    pub async fn find_by_name(
        executor: impl PgExecutor<'_>,
        name: &str,
    ) -> Result<Option<AllocationPeriod>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM allocation_periods WHERE name = $1");
        sqlx::query_as::<_, AllocationPeriod>(&query)
            .bind(name)
            .fetch_optional(executor)
            .await
    }

    /// Find the period with the given name prefix containing the given date,
    /// if any. This is how "the current allowance year" is resolved.
    pub async fn find_current_by_prefix(
        executor: impl PgExecutor<'_>,
        name_prefix: &str,
        date: NaiveDate,
    ) -> Result<Option<AllocationPeriod>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM allocation_periods
             WHERE name LIKE $1 || '%'
               AND start_date <= $2 AND end_date >= $2
             ORDER BY start_date DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, AllocationPeriod>(&query)
            .bind(name_prefix)
            .bind(date)
            .fetch_optional(executor)
            .await
    }
}
