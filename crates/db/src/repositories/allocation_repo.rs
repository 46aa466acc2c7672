//! Repository for the `allocations` and `resources` tables.

use chrono::NaiveDate;
use granta_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::allocation::{Allocation, Resource};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, project_id, resource_id, status_id, start_date, end_date, created_at, updated_at";

/// Qualified column list for joined queries.
const A_COLUMNS: &str =
    "a.id, a.project_id, a.resource_id, a.status_id, a.start_date, a.end_date, a.created_at, a.updated_at";

/// Provides CRUD and lifecycle queries for allocations.
pub struct AllocationRepo;

impl AllocationRepo {
    /// Insert a new allocation of a named resource to a project.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
        resource: &str,
        status: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Allocation, sqlx::Error> {
        let query = format!(
            "INSERT INTO allocations (project_id, resource_id, status_id, start_date, end_date)
             VALUES (
                $1,
                (SELECT id FROM resources WHERE name = $2),
                (SELECT id FROM allocation_statuses WHERE name = $3),
                $4, $5
             )
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Allocation>(&query)
            .bind(project_id)
            .bind(resource)
            .bind(status)
            .bind(start_date)
            .bind(end_date)
            .fetch_one(executor)
            .await
    }

    /// Find an allocation by internal ID.
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Allocation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM allocations WHERE id = $1");
        sqlx::query_as::<_, Allocation>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find a resource by name.
    pub async fn find_resource(
        executor: impl PgExecutor<'_>,
        name: &str,
    ) -> Result<Option<Resource>, sqlx::Error> {
        sqlx::query_as::<_, Resource>("SELECT id, name FROM resources WHERE name = $1")
            .bind(name)
            .fetch_optional(executor)
            .await
    }

    /// List a project's Active allocations of the named resource.
    ///
    /// Callers needing exactly one (the accounting engine) inspect the
    /// vector length themselves so they can distinguish a missing
    /// allocation from a duplicated one.
    pub async fn find_active_for_project(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
        resource: &str,
    ) -> Result<Vec<Allocation>, sqlx::Error> {
        let query = format!(
            "SELECT {A_COLUMNS} FROM allocations a
             JOIN resources r ON r.id = a.resource_id
             WHERE a.project_id = $1
               AND r.name = $2
               AND a.status_id = (SELECT id FROM allocation_statuses WHERE name = 'Active')
             ORDER BY a.id"
        );
        sqlx::query_as::<_, Allocation>(&query)
            .bind(project_id)
            .bind(resource)
            .fetch_all(executor)
            .await
    }

    /// List a project's allocations of the named resource in any status.
    pub async fn find_for_project(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
        resource: &str,
    ) -> Result<Vec<Allocation>, sqlx::Error> {
        let query = format!(
            "SELECT {A_COLUMNS} FROM allocations a
             JOIN resources r ON r.id = a.resource_id
             WHERE a.project_id = $1 AND r.name = $2
             ORDER BY a.id"
        );
        sqlx::query_as::<_, Allocation>(&query)
            .bind(project_id)
            .bind(resource)
            .fetch_all(executor)
            .await
    }

    /// Set an allocation's status by lookup name.
    pub async fn set_status(
        executor: impl PgExecutor<'_>,
        id: DbId,
        status: &str,
    ) -> Result<Option<Allocation>, sqlx::Error> {
        let query = format!(
            "UPDATE allocations
             SET status_id = (SELECT id FROM allocation_statuses WHERE name = $2),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Allocation>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(executor)
            .await
    }

    /// Overwrite both dates of an allocation. Passing `None` clears a date.
    pub async fn set_dates(
        executor: impl PgExecutor<'_>,
        id: DbId,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Option<Allocation>, sqlx::Error> {
        let query = format!(
            "UPDATE allocations
             SET start_date = $2, end_date = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Allocation>(&query)
            .bind(id)
            .bind(start_date)
            .bind(end_date)
            .fetch_optional(executor)
            .await
    }

    /// Resolve an allocation's status name.
    pub async fn status_name(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT s.name FROM allocations a
             JOIN allocation_statuses s ON s.id = a.status_id
             WHERE a.id = $1",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }
}
