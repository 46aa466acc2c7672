//! Allocation entity models: resources, allocations, memberships, and the
//! typed attribute system with its usage twins.

use granta_core::types::{DbId, Timestamp};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

/// A resource row from the `resources` table (e.g. "Savio Compute").
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Resource {
    pub id: DbId,
    pub name: String,
}

/// An allocation row: a grant of a resource to a project, with its own
/// status/date lifecycle independent of the project's.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Allocation {
    pub id: DbId,
    pub project_id: DbId,
    pub resource_id: DbId,
    pub status_id: DbId,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// An attribute type row (e.g. "Service Units", "Cluster Account Status").
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AllocationAttributeType {
    pub id: DbId,
    pub name: String,
    pub has_usage: bool,
    pub is_unique: bool,
}

/// A typed key/value fact attached to an allocation. Values are stored as
/// strings; service-unit allowances are string-encoded decimals.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AllocationAttribute {
    pub id: DbId,
    pub allocation_id: DbId,
    pub allocation_attribute_type_id: DbId,
    pub value: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The 1:1 usage companion to an [`AllocationAttribute`] whose type has
/// `has_usage`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AllocationAttributeUsage {
    pub id: DbId,
    pub allocation_attribute_id: DbId,
    pub value: Decimal,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Membership of a user in an allocation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AllocationUser {
    pub id: DbId,
    pub allocation_id: DbId,
    pub user_id: DbId,
    pub status_id: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A per-user attribute scoped to one allocation membership.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AllocationUserAttribute {
    pub id: DbId,
    pub allocation_user_id: DbId,
    pub allocation_id: DbId,
    pub allocation_attribute_type_id: DbId,
    pub value: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The 1:1 usage companion to an [`AllocationUserAttribute`].
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AllocationUserAttributeUsage {
    pub id: DbId,
    pub allocation_user_attribute_id: DbId,
    pub value: Decimal,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
