//! Append-only accounting ledger rows.
//!
//! One row is written per allowance write, never updated or deleted. These
//! are the accounting audit trail, distinct from the generic attribute
//! history.

use granta_core::types::{DbId, Timestamp};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

/// A project-level allowance write.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectTransaction {
    pub id: DbId,
    pub project_id: DbId,
    pub date_time: Timestamp,
    pub allocation: Decimal,
    pub created_at: Timestamp,
}

/// A user-level allowance write, attributed to the project membership.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectUserTransaction {
    pub id: DbId,
    pub project_user_id: DbId,
    pub date_time: Timestamp,
    pub allocation: Decimal,
    pub created_at: Timestamp,
}
