//! Repository for the `project_users` table.

use granta_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::project::{ProjectUser, ProjectUserDetail};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, project_id, user_id, role_id, status_id, created_at, updated_at";

/// Joined column list resolving role and status names.
const DETAIL_COLUMNS: &str = "pu.id, pu.project_id, pu.user_id, pur.name AS role, pus.name AS status";

const DETAIL_FROM: &str = "FROM project_users pu
     JOIN project_user_roles pur ON pur.id = pu.role_id
     JOIN project_user_statuses pus ON pus.id = pu.status_id";

/// Provides membership operations between users and projects.
pub struct ProjectUserRepo;

impl ProjectUserRepo {
    /// Insert a membership, or update the role/status of an existing one.
    pub async fn upsert(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
        user_id: DbId,
        role: &str,
        status: &str,
    ) -> Result<ProjectUser, sqlx::Error> {
        let query = format!(
            "INSERT INTO project_users (project_id, user_id, role_id, status_id)
             VALUES (
                $1, $2,
                (SELECT id FROM project_user_roles WHERE name = $3),
                (SELECT id FROM project_user_statuses WHERE name = $4)
             )
             ON CONFLICT (project_id, user_id) DO UPDATE SET
                role_id = (SELECT id FROM project_user_roles WHERE name = $3),
                status_id = (SELECT id FROM project_user_statuses WHERE name = $4),
                updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProjectUser>(&query)
            .bind(project_id)
            .bind(user_id)
            .bind(role)
            .bind(status)
            .fetch_one(executor)
            .await
    }

    /// Find the membership between a project and a user, with role and
    /// status names resolved.
    pub async fn find_detail(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
        user_id: DbId,
    ) -> Result<Option<ProjectUserDetail>, sqlx::Error> {
        let query = format!(
            "SELECT {DETAIL_COLUMNS} {DETAIL_FROM}
             WHERE pu.project_id = $1 AND pu.user_id = $2"
        );
        sqlx::query_as::<_, ProjectUserDetail>(&query)
            .bind(project_id)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// Find an Active membership between a project and a user.
    pub async fn find_active(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
        user_id: DbId,
    ) -> Result<Option<ProjectUser>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM project_users
             WHERE project_id = $1 AND user_id = $2
               AND status_id = (SELECT id FROM project_user_statuses WHERE name = 'Active')"
        );
        sqlx::query_as::<_, ProjectUser>(&query)
            .bind(project_id)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// Set the role of an existing membership by lookup name.
    pub async fn set_role(
        executor: impl PgExecutor<'_>,
        id: DbId,
        role: &str,
    ) -> Result<Option<ProjectUser>, sqlx::Error> {
        let query = format!(
            "UPDATE project_users
             SET role_id = (SELECT id FROM project_user_roles WHERE name = $2),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProjectUser>(&query)
            .bind(id)
            .bind(role)
            .fetch_optional(executor)
            .await
    }

    /// List the memberships holding the Principal Investigator role on a
    /// project, regardless of membership status.
    pub async fn pis(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
    ) -> Result<Vec<ProjectUserDetail>, sqlx::Error> {
        let query = format!(
            "SELECT {DETAIL_COLUMNS} {DETAIL_FROM}
             WHERE pu.project_id = $1 AND pur.name = 'Principal Investigator'
             ORDER BY pu.id"
        );
        sqlx::query_as::<_, ProjectUserDetail>(&query)
            .bind(project_id)
            .fetch_all(executor)
            .await
    }

    /// List every membership of a project with names resolved.
    pub async fn list_for_project(
        executor: impl PgExecutor<'_>,
        project_id: DbId,
    ) -> Result<Vec<ProjectUserDetail>, sqlx::Error> {
        let query = format!(
            "SELECT {DETAIL_COLUMNS} {DETAIL_FROM}
             WHERE pu.project_id = $1
             ORDER BY pu.id"
        );
        sqlx::query_as::<_, ProjectUserDetail>(&query)
            .bind(project_id)
            .fetch_all(executor)
            .await
    }
}
