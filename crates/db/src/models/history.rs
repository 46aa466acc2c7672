//! Attribute mutation history rows.

use granta_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// One mutation of a ledger-bearing entity, written in the same transaction
/// as the mutation itself. Rows are immutable except for `change_reason`,
/// which may be attached to the newest row for an entity after the fact.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttributeHistory {
    pub id: DbId,
    pub entity_type: String,
    pub entity_id: DbId,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: String,
    pub change_reason: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for appending a history row.
#[derive(Debug, Clone)]
pub struct CreateAttributeHistory {
    pub entity_type: &'static str,
    pub entity_id: DbId,
    pub field: &'static str,
    pub old_value: Option<String>,
    pub new_value: String,
}
