//! User entity model.

use granta_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A user row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub username: String,
    pub email: String,
    /// Scheduler-side identifier; admission control resolves users by it.
    pub cluster_uid: Option<String>,
    pub is_pi: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub cluster_uid: Option<String>,
    pub is_pi: bool,
}
