//! Project and project-membership entity models.

use granta_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A project row from the `projects` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Project {
    pub id: DbId,
    pub name: String,
    pub title: String,
    pub status_id: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new project.
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub name: String,
    pub title: String,
    /// Status name from the `project_statuses` lookup table.
    pub status: String,
}

/// A membership row from the `project_users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectUser {
    pub id: DbId,
    pub project_id: DbId,
    pub user_id: DbId,
    pub role_id: DbId,
    pub status_id: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A membership row joined with its role and status names, for callers that
/// branch on them.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectUserDetail {
    pub id: DbId,
    pub project_id: DbId,
    pub user_id: DbId,
    pub role: String,
    pub status: String,
}
