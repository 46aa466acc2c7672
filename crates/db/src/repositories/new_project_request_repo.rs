//! Repository for the `new_project_requests` table.

use granta_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::request::{CreateNewProjectRequest, NewProjectRequest};

const COLUMNS: &str = "id, requester_id, pi_id, project_id, allocation_period_id, status_id, \
     request_time, approval_time, completion_time, state, created_at, updated_at";

/// Provides state-machine operations for new-project requests.
pub struct NewProjectRequestRepo;

impl NewProjectRequestRepo {
    /// Insert a new request with the given status name.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        input: &CreateNewProjectRequest,
    ) -> Result<NewProjectRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO new_project_requests
                (requester_id, pi_id, project_id, allocation_period_id, status_id)
             VALUES (
                $1, $2, $3, $4,
                (SELECT id FROM new_project_request_statuses WHERE name = $5)
             )
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NewProjectRequest>(&query)
            .bind(input.requester_id)
            .bind(input.pi_id)
            .bind(input.project_id)
            .bind(input.allocation_period_id)
            .bind(&input.status)
            .fetch_one(executor)
            .await
    }

    /// Find a request by internal ID.
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<NewProjectRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM new_project_requests WHERE id = $1");
        sqlx::query_as::<_, NewProjectRequest>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// List the requests for a period in the given status, in ID order.
    pub async fn list_by_period_and_status(
        executor: impl PgExecutor<'_>,
        allocation_period_id: DbId,
        status: &str,
    ) -> Result<Vec<NewProjectRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM new_project_requests
             WHERE allocation_period_id = $1
               AND status_id = (SELECT id FROM new_project_request_statuses WHERE name = $2)
             ORDER BY id"
        );
        sqlx::query_as::<_, NewProjectRequest>(&query)
            .bind(allocation_period_id)
            .bind(status)
            .fetch_all(executor)
            .await
    }

    /// Set a request's status by lookup name, stamping the approval or
    /// completion time where the target status calls for one.
    pub async fn set_status(
        executor: impl PgExecutor<'_>,
        id: DbId,
        status: &str,
    ) -> Result<Option<NewProjectRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE new_project_requests
             SET status_id = (SELECT id FROM new_project_request_statuses WHERE name = $2),
                 approval_time = CASE
                     WHEN $2 = 'Approved - Scheduled' THEN NOW() ELSE approval_time END,
                 completion_time = CASE
                     WHEN $2 IN ('Approved - Complete', 'Denied') THEN NOW()
                     ELSE completion_time END,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NewProjectRequest>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(executor)
            .await
    }

    /// Resolve a request's status name.
    pub async fn status_name(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT s.name FROM new_project_requests r
             JOIN new_project_request_statuses s ON s.id = r.status_id
             WHERE r.id = $1",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }
}
