//! Repository for the `projects` table.

use chrono::NaiveDate;
use granta_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::project::{CreateProject, Project};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, title, status_id, created_at, updated_at";

/// Qualified column list for joined queries.
const P_COLUMNS: &str = "p.id, p.name, p.title, p.status_id, p.created_at, p.updated_at";

/// Provides CRUD and lifecycle queries for projects.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Insert a new project, returning the created row.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        input: &CreateProject,
    ) -> Result<Project, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects (name, title, status_id)
             VALUES ($1, $2, (SELECT id FROM project_statuses WHERE name = $3))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(&input.name)
            .bind(&input.title)
            .bind(&input.status)
            .fetch_one(executor)
            .await
    }

    /// Find a project by internal ID.
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find a project by its unique name (the scheduler's account ID).
    pub async fn find_by_name(
        executor: impl PgExecutor<'_>,
        name: &str,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE name = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(name)
            .fetch_optional(executor)
            .await
    }

    /// Set a project's status by lookup name, returning the updated row.
    pub async fn set_status(
        executor: impl PgExecutor<'_>,
        id: DbId,
        status: &str,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!(
            "UPDATE projects
             SET status_id = (SELECT id FROM project_statuses WHERE name = $2),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(executor)
            .await
    }

    /// Resolve a project's status name.
    pub async fn status_name(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT ps.name FROM projects p
             JOIN project_statuses ps ON ps.id = p.status_id
             WHERE p.id = $1",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Select the projects eligible for deactivation at a period boundary:
    /// Active projects whose name carries the given class prefix and whose
    /// allocation of the given resource has lapsed (null end date, or one
    /// strictly before the period start).
    pub async fn find_deactivation_eligible(
        executor: impl PgExecutor<'_>,
        name_prefix: &str,
        resource: &str,
        period_start: NaiveDate,
    ) -> Result<Vec<Project>, sqlx::Error> {
        let query = format!(
            "SELECT {P_COLUMNS} FROM projects p
             WHERE p.name LIKE $1 || '%'
               AND p.status_id = (SELECT id FROM project_statuses WHERE name = 'Active')
               AND EXISTS (
                   SELECT 1 FROM allocations a
                   JOIN resources r ON r.id = a.resource_id
                   WHERE a.project_id = p.id
                     AND r.name = $2
                     AND (a.end_date IS NULL OR a.end_date < $3)
               )
             ORDER BY p.id"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(name_prefix)
            .bind(resource)
            .bind(period_start)
            .fetch_all(executor)
            .await
    }
}
