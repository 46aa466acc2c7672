//! Repository for the `users` table.

use granta_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::user::{CreateUser, User};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, username, email, cluster_uid, is_pi, created_at, updated_at";

/// Provides CRUD operations for users.
pub struct UserRepo;

impl UserRepo {
    /// Insert a new user, returning the created row.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        input: &CreateUser,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (username, email, cluster_uid, is_pi)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.username)
            .bind(&input.email)
            .bind(&input.cluster_uid)
            .bind(input.is_pi)
            .fetch_one(executor)
            .await
    }

    /// Find a user by internal ID.
    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find a user by their scheduler-side cluster UID.
    pub async fn find_by_cluster_uid(
        executor: impl PgExecutor<'_>,
        cluster_uid: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE cluster_uid = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(cluster_uid)
            .fetch_optional(executor)
            .await
    }

    /// Find a user by username.
    pub async fn find_by_username(
        executor: impl PgExecutor<'_>,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(executor)
            .await
    }

    /// Mark a user as a PI.
    pub async fn set_is_pi(
        executor: impl PgExecutor<'_>,
        id: DbId,
        is_pi: bool,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET is_pi = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(is_pi)
            .fetch_optional(executor)
            .await
    }
}
