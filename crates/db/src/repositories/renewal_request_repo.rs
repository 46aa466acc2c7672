//! Repository for the `renewal_requests` table.

use granta_core::types::DbId;
use rust_decimal::Decimal;
use sqlx::PgExecutor;

use crate::models::request::{CreateRenewalRequest, RenewalRequest};

const COLUMNS: &str = "id, requester_id, pi_id, pre_project_id, post_project_id, \
     allocation_period_id, status_id, num_service_units, request_time, approval_time, \
     completion_time, state, new_project_request_id, created_at, updated_at";

/// Provides state-machine operations for renewal requests.
pub struct RenewalRequestRepo;

impl RenewalRequestRepo {
    /// Insert a new renewal request with the given status name.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        input: &CreateRenewalRequest,
    ) -> Result<RenewalRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO renewal_requests
                (requester_id, pi_id, pre_project_id, post_project_id,
                 allocation_period_id, status_id, new_project_request_id)
             VALUES (
                $1, $2, $3, $4, $5,
                (SELECT id FROM renewal_request_statuses WHERE name = $6),
                $7
             )
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RenewalRequest>(&query)
            .bind(input.requester_id)
            .bind(input.pi_id)
            .bind(input.pre_project_id)
            .bind(input.post_project_id)
            .bind(input.allocation_period_id)
            .bind(&input.status)
            .bind(input.new_project_request_id)
            .fetch_one(executor)
            .await
    }

    /// Find a request by internal ID.
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<RenewalRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM renewal_requests WHERE id = $1");
        sqlx::query_as::<_, RenewalRequest>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// List the requests for a period in the given status, in ID order.
    pub async fn list_by_period_and_status(
        executor: impl PgExecutor<'_>,
        allocation_period_id: DbId,
        status: &str,
    ) -> Result<Vec<RenewalRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM renewal_requests
             WHERE allocation_period_id = $1
               AND status_id = (SELECT id FROM renewal_request_statuses WHERE name = $2)
             ORDER BY id"
        );
        sqlx::query_as::<_, RenewalRequest>(&query)
            .bind(allocation_period_id)
            .bind(status)
            .fetch_all(executor)
            .await
    }

    /// Move a request to Approved and stamp the approval time.
    pub async fn approve(
        executor: impl PgExecutor<'_>,
        id: DbId,
        num_service_units: Decimal,
    ) -> Result<Option<RenewalRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE renewal_requests
             SET status_id = (SELECT id FROM renewal_request_statuses WHERE name = 'Approved'),
                 num_service_units = $2,
                 approval_time = NOW(),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RenewalRequest>(&query)
            .bind(id)
            .bind(num_service_units)
            .fetch_optional(executor)
            .await
    }

    /// Move a request to Complete and stamp the completion time.
    pub async fn complete(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<RenewalRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE renewal_requests
             SET status_id = (SELECT id FROM renewal_request_statuses WHERE name = 'Complete'),
                 completion_time = NOW(),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RenewalRequest>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Move a request to Denied, recording the justification in its state
    /// blob and stamping the completion time.
    pub async fn deny(
        executor: impl PgExecutor<'_>,
        id: DbId,
        state: &serde_json::Value,
    ) -> Result<Option<RenewalRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE renewal_requests
             SET status_id = (SELECT id FROM renewal_request_statuses WHERE name = 'Denied'),
                 state = $2,
                 completion_time = NOW(),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RenewalRequest>(&query)
            .bind(id)
            .bind(state)
            .fetch_optional(executor)
            .await
    }

    /// Resolve a request's status name.
    pub async fn status_name(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT s.name FROM renewal_requests r
             JOIN renewal_request_statuses s ON s.id = r.status_id
             WHERE r.id = $1",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Whether any non-Denied renewal request claims the given pre-project
    /// for the given period. Used to detect competing pooling claims.
    pub async fn exists_non_denied_claim(
        executor: impl PgExecutor<'_>,
        allocation_period_id: DbId,
        pre_project_id: DbId,
        exclude_request_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                 SELECT 1 FROM renewal_requests r
                 JOIN renewal_request_statuses s ON s.id = r.status_id
                 WHERE r.allocation_period_id = $1
                   AND r.pre_project_id = $2
                   AND r.id <> $3
                   AND s.name <> 'Denied'
             )",
        )
        .bind(allocation_period_id)
        .bind(pre_project_id)
        .bind(exclude_request_id)
        .fetch_one(executor)
        .await
    }
}
