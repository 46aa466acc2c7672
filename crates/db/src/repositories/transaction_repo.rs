//! Repository for the append-only accounting ledgers.

use granta_core::types::{DbId, Timestamp};
use rust_decimal::Decimal;
use sqlx::PgExecutor;

use crate::models::transaction::{ProjectTransaction, ProjectUserTransaction};

const PROJECT_COLUMNS: &str = "id, project_id, date_time, allocation, created_at";

const PROJECT_USER_COLUMNS: &str = "id, project_user_id, date_time, allocation, created_at";

/// Appends and reads ledger rows. Ledger rows are never updated or deleted.
pub struct TransactionRepo;

impl TransactionRepo {
    /// Append a project-level ledger row.
    pub async fn create_project_transaction(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
        date_time: Timestamp,
        allocation: Decimal,
    ) -> Result<ProjectTransaction, sqlx::Error> {
        let query = format!(
            "INSERT INTO project_transactions (project_id, date_time, allocation)
             VALUES ($1, $2, $3)
             RETURNING {PROJECT_COLUMNS}"
        );
        sqlx::query_as::<_, ProjectTransaction>(&query)
            .bind(project_id)
            .bind(date_time)
            .bind(allocation)
            .fetch_one(executor)
            .await
    }

    /// Append a user-level ledger row attributed to a project membership.
    pub async fn create_project_user_transaction(
        executor: impl PgExecutor<'_>,
        project_user_id: DbId,
        date_time: Timestamp,
        allocation: Decimal,
    ) -> Result<ProjectUserTransaction, sqlx::Error> {
        let query = format!(
            "INSERT INTO project_user_transactions (project_user_id, date_time, allocation)
             VALUES ($1, $2, $3)
             RETURNING {PROJECT_USER_COLUMNS}"
        );
        sqlx::query_as::<_, ProjectUserTransaction>(&query)
            .bind(project_user_id)
            .bind(date_time)
            .bind(allocation)
            .fetch_one(executor)
            .await
    }

    /// List a project's ledger rows in chronological (ID) order.
    pub async fn list_for_project(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
    ) -> Result<Vec<ProjectTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {PROJECT_COLUMNS} FROM project_transactions
             WHERE project_id = $1
             ORDER BY id"
        );
        sqlx::query_as::<_, ProjectTransaction>(&query)
            .bind(project_id)
            .fetch_all(executor)
            .await
    }

    /// List a membership's ledger rows in chronological (ID) order.
    pub async fn list_for_project_user(
        executor: impl PgExecutor<'_>,
        project_user_id: DbId,
    ) -> Result<Vec<ProjectUserTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {PROJECT_USER_COLUMNS} FROM project_user_transactions
             WHERE project_user_id = $1
             ORDER BY id"
        );
        sqlx::query_as::<_, ProjectUserTransaction>(&query)
            .bind(project_user_id)
            .fetch_all(executor)
            .await
    }

    /// Count a project's ledger rows.
    pub async fn count_for_project(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM project_transactions WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_one(executor)
        .await
    }

    /// Count a membership's ledger rows.
    pub async fn count_for_project_user(
        executor: impl PgExecutor<'_>,
        project_user_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM project_user_transactions WHERE project_user_id = $1",
        )
        .bind(project_user_id)
        .fetch_one(executor)
        .await
    }
}
