//! Request entity models for the period-boundary state machines.

use granta_core::types::{DbId, Timestamp};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

/// A request to carry a project's allowance into a new allocation period.
///
/// `pre_project` and `post_project` differ when the PI changes pooling
/// arrangements as part of the renewal.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RenewalRequest {
    pub id: DbId,
    pub requester_id: DbId,
    pub pi_id: DbId,
    pub pre_project_id: DbId,
    pub post_project_id: DbId,
    pub allocation_period_id: DbId,
    pub status_id: DbId,
    pub num_service_units: Option<Decimal>,
    pub request_time: Timestamp,
    pub approval_time: Option<Timestamp>,
    pub completion_time: Option<Timestamp>,
    /// Free-form state blob; denial justifications are recorded here.
    pub state: serde_json::Value,
    pub new_project_request_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a renewal request.
#[derive(Debug, Clone)]
pub struct CreateRenewalRequest {
    pub requester_id: DbId,
    pub pi_id: DbId,
    pub pre_project_id: DbId,
    pub post_project_id: DbId,
    pub allocation_period_id: DbId,
    /// Status name from the `renewal_request_statuses` lookup table.
    pub status: String,
    pub new_project_request_id: Option<DbId>,
}

/// A request to create and fund a brand-new project for a period.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NewProjectRequest {
    pub id: DbId,
    pub requester_id: DbId,
    pub pi_id: DbId,
    pub project_id: DbId,
    pub allocation_period_id: DbId,
    pub status_id: DbId,
    pub request_time: Timestamp,
    pub approval_time: Option<Timestamp>,
    pub completion_time: Option<Timestamp>,
    pub state: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new-project request.
#[derive(Debug, Clone)]
pub struct CreateNewProjectRequest {
    pub requester_id: DbId,
    pub pi_id: DbId,
    pub project_id: DbId,
    pub allocation_period_id: DbId,
    /// Status name from the `new_project_request_statuses` lookup table.
    pub status: String,
}
