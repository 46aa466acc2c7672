//! Repository for the `allocation_users` table.

use granta_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::allocation::AllocationUser;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, allocation_id, user_id, status_id, created_at, updated_at";

/// Provides membership operations between users and allocations.
pub struct AllocationUserRepo;

impl AllocationUserRepo {
    /// Ensure an Active membership exists, reactivating a Removed one if
    /// present.
    pub async fn get_or_create_active(
        executor: impl PgExecutor<'_>,
        allocation_id: DbId,
        user_id: DbId,
    ) -> Result<AllocationUser, sqlx::Error> {
        let query = format!(
            "INSERT INTO allocation_users (allocation_id, user_id, status_id)
             VALUES (
                $1, $2,
                (SELECT id FROM allocation_user_statuses WHERE name = 'Active')
             )
             ON CONFLICT (allocation_id, user_id) DO UPDATE SET
                status_id = (SELECT id FROM allocation_user_statuses WHERE name = 'Active'),
                updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AllocationUser>(&query)
            .bind(allocation_id)
            .bind(user_id)
            .fetch_one(executor)
            .await
    }

    /// Find a membership by internal ID.
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<AllocationUser>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM allocation_users WHERE id = $1");
        sqlx::query_as::<_, AllocationUser>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find the membership between an allocation and a user.
    pub async fn find(
        executor: impl PgExecutor<'_>,
        allocation_id: DbId,
        user_id: DbId,
    ) -> Result<Option<AllocationUser>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM allocation_users
             WHERE allocation_id = $1 AND user_id = $2"
        );
        sqlx::query_as::<_, AllocationUser>(&query)
            .bind(allocation_id)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// List the Active memberships of an allocation in ID order.
    pub async fn list_active_for_allocation(
        executor: impl PgExecutor<'_>,
        allocation_id: DbId,
    ) -> Result<Vec<AllocationUser>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM allocation_users
             WHERE allocation_id = $1
               AND status_id = (SELECT id FROM allocation_user_statuses WHERE name = 'Active')
             ORDER BY id"
        );
        sqlx::query_as::<_, AllocationUser>(&query)
            .bind(allocation_id)
            .fetch_all(executor)
            .await
    }

    /// Set a membership's status by lookup name.
    pub async fn set_status(
        executor: impl PgExecutor<'_>,
        id: DbId,
        status: &str,
    ) -> Result<Option<AllocationUser>, sqlx::Error> {
        let query = format!(
            "UPDATE allocation_users
             SET status_id = (SELECT id FROM allocation_user_statuses WHERE name = $2),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AllocationUser>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(executor)
            .await
    }

    /// Resolve a membership's status name.
    pub async fn status_name(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT s.name FROM allocation_users au
             JOIN allocation_user_statuses s ON s.id = au.status_id
             WHERE au.id = $1",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }
}
