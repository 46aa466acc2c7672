//! Resolution of the accounting object bundle for one project (and
//! optionally one member).
//!
//! The zero/one/many distinction matters at the HTTP edge: a missing active
//! allocation after the account itself resolved is user-correctable (400),
//! while duplicated rows where exactly one is expected are data-integrity
//! bugs (500). [`LoadError`] keeps the cases apart.

use granta_core::su::SERVICE_UNITS_ATTRIBUTE;
use sqlx::PgConnection;

use granta_core::allowance::COMPUTE_RESOURCE;
use granta_db::models::allocation::{
    Allocation, AllocationAttribute, AllocationAttributeUsage, AllocationUser,
    AllocationUserAttribute, AllocationUserAttributeUsage,
};
use granta_db::models::project::{Project, ProjectUser};
use granta_db::models::user::User;
use granta_db::repositories::{
    AllocationRepo, AllocationUserRepo, AttributeRepo, ProjectUserRepo,
};

use crate::error::EngineError;

/// Failure to resolve the bundle, split by HTTP-status class.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("User {username} is not a member of account {account}.")]
    NotProjectMember { username: String, account: String },

    #[error("Account {account} has no active compute allocation.")]
    NoActiveComputeAllocation { account: String },

    #[error("User {username} is not an active member of the compute allocation for account {account}.")]
    NotAllocationMember { username: String, account: String },

    /// Duplicated or missing rows where exactly one is expected.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<LoadError> for EngineError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::NotProjectMember { .. }
            | LoadError::NoActiveComputeAllocation { .. }
            | LoadError::NotAllocationMember { .. } => EngineError::validation(err.to_string()),
            LoadError::Invariant(msg) => EngineError::invariant(msg),
            LoadError::Database(e) => EngineError::Database(e),
        }
    }
}

/// The member-scoped half of the bundle.
#[derive(Debug, Clone)]
pub struct UserAccountingObjects {
    pub project_user: ProjectUser,
    pub allocation_user: AllocationUser,
    pub user_attribute: AllocationUserAttribute,
    pub user_usage: AllocationUserAttributeUsage,
}

/// The related objects needed for accounting against one project.
#[derive(Debug, Clone)]
pub struct AccountingObjects {
    pub project: Project,
    pub allocation: Allocation,
    pub attribute: AllocationAttribute,
    pub usage: AllocationAttributeUsage,
    pub user: Option<UserAccountingObjects>,
}

impl AccountingObjects {
    /// Resolve the bundle for a project, and for one of its members when a
    /// user is given.
    pub async fn load(
        conn: &mut PgConnection,
        project: &Project,
        user: Option<&User>,
    ) -> Result<Self, LoadError> {
        let allocations =
            AllocationRepo::find_active_for_project(&mut *conn, project.id, COMPUTE_RESOURCE)
                .await?;
        let allocation = match allocations.len() {
            0 => {
                return Err(LoadError::NoActiveComputeAllocation {
                    account: project.name.clone(),
                })
            }
            1 => allocations.into_iter().next().ok_or_else(|| {
                LoadError::Invariant("Allocation vanished during resolution.".to_string())
            })?,
            n => {
                return Err(LoadError::Invariant(format!(
                    "Account {} has {n} active compute allocations where exactly one is expected.",
                    project.name
                )))
            }
        };

        let attribute =
            AttributeRepo::find_attribute(&mut *conn, allocation.id, SERVICE_UNITS_ATTRIBUTE)
                .await?
                .ok_or_else(|| {
                    LoadError::Invariant(format!(
                        "Allocation {} has no {SERVICE_UNITS_ATTRIBUTE} attribute.",
                        allocation.id
                    ))
                })?;
        let usage = AttributeRepo::find_usage(&mut *conn, attribute.id)
            .await?
            .ok_or_else(|| {
                LoadError::Invariant(format!(
                    "AllocationAttribute {} has no usage row.",
                    attribute.id
                ))
            })?;

        let user_objects = match user {
            None => None,
            Some(user) => {
                let project_user = ProjectUserRepo::find_active(&mut *conn, project.id, user.id)
                    .await?
                    .ok_or_else(|| LoadError::NotProjectMember {
                        username: user.username.clone(),
                        account: project.name.clone(),
                    })?;

                let allocation_user =
                    AllocationUserRepo::find(&mut *conn, allocation.id, user.id).await?;
                let allocation_user = match allocation_user {
                    Some(au) => {
                        let status =
                            AllocationUserRepo::status_name(&mut *conn, au.id).await?;
                        if status.as_deref() != Some("Active") {
                            return Err(LoadError::NotAllocationMember {
                                username: user.username.clone(),
                                account: project.name.clone(),
                            });
                        }
                        au
                    }
                    None => {
                        return Err(LoadError::NotAllocationMember {
                            username: user.username.clone(),
                            account: project.name.clone(),
                        })
                    }
                };

                let user_attribute = AttributeRepo::find_user_attribute(
                    &mut *conn,
                    allocation_user.id,
                    SERVICE_UNITS_ATTRIBUTE,
                )
                .await?
                .ok_or_else(|| {
                    LoadError::Invariant(format!(
                        "AllocationUser {} has no {SERVICE_UNITS_ATTRIBUTE} attribute.",
                        allocation_user.id
                    ))
                })?;
                let user_usage = AttributeRepo::find_user_usage(&mut *conn, user_attribute.id)
                    .await?
                    .ok_or_else(|| {
                        LoadError::Invariant(format!(
                            "AllocationUserAttribute {} has no usage row.",
                            user_attribute.id
                        ))
                    })?;

                Some(UserAccountingObjects {
                    project_user,
                    allocation_user,
                    user_attribute,
                    user_usage,
                })
            }
        };

        Ok(Self {
            project: project.clone(),
            allocation,
            attribute,
            usage,
            user: user_objects,
        })
    }
}
