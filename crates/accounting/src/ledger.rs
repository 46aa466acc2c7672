//! Ledger primitives: the only writers of service-unit allowances and
//! usages.
//!
//! Each setter re-reads its row under `FOR UPDATE` so concurrent writers
//! serialize instead of losing updates, writes the new value, and appends
//! an attribute-history row in the same transaction. Allowance setters also
//! append a transaction-ledger row. Callers own the transaction; the
//! `*_atomic` wrappers begin and commit one around a single call.

use chrono::Utc;
use granta_core::su::{serialize_allowance, SERVICE_UNITS_ATTRIBUTE};
use granta_core::types::{DbId, Timestamp};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use granta_db::models::history::CreateAttributeHistory;
use granta_db::repositories::{
    AllocationRepo, AllocationUserRepo, AttributeRepo, HistoryRepo, ProjectUserRepo,
    TransactionRepo,
};

use crate::error::EngineError;

// History entity tags for the ledger-bearing tables.
pub const ALLOCATION_ATTRIBUTE_ENTITY: &str = "allocation_attribute";
pub const ALLOCATION_ATTRIBUTE_USAGE_ENTITY: &str = "allocation_attribute_usage";
pub const ALLOCATION_USER_ATTRIBUTE_ENTITY: &str = "allocation_user_attribute";
pub const ALLOCATION_USER_ATTRIBUTE_USAGE_ENTITY: &str = "allocation_user_attribute_usage";

const VALUE_FIELD: &str = "value";

/// Optional write metadata shared by the four setters.
///
/// `transaction_time` only affects allowance setters (it stamps the ledger
/// row); usage setters have no ledger row to stamp.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub transaction_time: Option<Timestamp>,
    pub change_reason: Option<String>,
}

impl WriteOptions {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            transaction_time: None,
            change_reason: Some(reason.into()),
        }
    }
}

/// Raise an invariant error unless the named attribute type is
/// Service Units. Writing any other attribute through the ledger is a
/// programmer error, not a user-facing one.
fn assert_service_units(type_name: Option<String>, attribute_id: DbId) -> Result<(), EngineError> {
    match type_name {
        Some(name) if name == SERVICE_UNITS_ATTRIBUTE => Ok(()),
        _ => Err(EngineError::invariant(format!(
            "Attribute {attribute_id} does not have allocation_attribute_type \
             {SERVICE_UNITS_ATTRIBUTE}."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Allocation-level setters
// ---------------------------------------------------------------------------

/// Set a project's service-unit allowance, appending a `ProjectTransaction`.
pub async fn set_allocation_allowance(
    conn: &mut PgConnection,
    attribute_id: DbId,
    value: Decimal,
    options: &WriteOptions,
) -> Result<(), EngineError> {
    let attribute = AttributeRepo::lock_attribute(&mut *conn, attribute_id)
        .await?
        .ok_or_else(|| EngineError::not_found("AllocationAttribute", attribute_id))?;
    let type_name = AttributeRepo::attribute_type_name(&mut *conn, attribute_id).await?;
    assert_service_units(type_name, attribute_id)?;

    AttributeRepo::update_attribute_value(&mut *conn, attribute_id, &serialize_allowance(value))
        .await?;
    HistoryRepo::append(
        &mut *conn,
        &CreateAttributeHistory {
            entity_type: ALLOCATION_ATTRIBUTE_ENTITY,
            entity_id: attribute_id,
            field: VALUE_FIELD,
            old_value: Some(attribute.value.clone()),
            new_value: serialize_allowance(value),
        },
    )
    .await?;

    let allocation = AllocationRepo::find_by_id(&mut *conn, attribute.allocation_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Allocation", attribute.allocation_id))?;
    let date_time = options.transaction_time.unwrap_or_else(Utc::now);
    TransactionRepo::create_project_transaction(&mut *conn, allocation.project_id, date_time, value)
        .await?;

    if let Some(reason) = &options.change_reason {
        HistoryRepo::set_latest_change_reason(
            &mut *conn,
            ALLOCATION_ATTRIBUTE_ENTITY,
            attribute_id,
            reason,
        )
        .await?;
    }
    Ok(())
}

/// Set a project's service-unit usage. No ledger row; usage is a counter,
/// not a grant.
pub async fn set_allocation_usage(
    conn: &mut PgConnection,
    usage_id: DbId,
    value: Decimal,
    options: &WriteOptions,
) -> Result<(), EngineError> {
    let usage = AttributeRepo::lock_usage(&mut *conn, usage_id)
        .await?
        .ok_or_else(|| EngineError::not_found("AllocationAttributeUsage", usage_id))?;
    let type_name =
        AttributeRepo::attribute_type_name(&mut *conn, usage.allocation_attribute_id).await?;
    assert_service_units(type_name, usage.allocation_attribute_id)?;

    AttributeRepo::update_usage_value(&mut *conn, usage_id, value).await?;
    HistoryRepo::append(
        &mut *conn,
        &CreateAttributeHistory {
            entity_type: ALLOCATION_ATTRIBUTE_USAGE_ENTITY,
            entity_id: usage_id,
            field: VALUE_FIELD,
            old_value: Some(usage.value.to_string()),
            new_value: value.to_string(),
        },
    )
    .await?;

    if let Some(reason) = &options.change_reason {
        HistoryRepo::set_latest_change_reason(
            &mut *conn,
            ALLOCATION_ATTRIBUTE_USAGE_ENTITY,
            usage_id,
            reason,
        )
        .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// User-level setters
// ---------------------------------------------------------------------------

/// Set one member's service-unit allowance, appending a
/// `ProjectUserTransaction` when a project membership still exists.
///
/// An AllocationUser removed from the project has no membership to attribute
/// a ledger row to, so no row is written for them; the attribute and its
/// history are still updated.
pub async fn set_allocation_user_allowance(
    conn: &mut PgConnection,
    user_attribute_id: DbId,
    value: Decimal,
    options: &WriteOptions,
) -> Result<(), EngineError> {
    let attribute = AttributeRepo::lock_user_attribute(&mut *conn, user_attribute_id)
        .await?
        .ok_or_else(|| EngineError::not_found("AllocationUserAttribute", user_attribute_id))?;
    let type_name = AttributeRepo::user_attribute_type_name(&mut *conn, user_attribute_id).await?;
    assert_service_units(type_name, user_attribute_id)?;

    AttributeRepo::update_user_attribute_value(
        &mut *conn,
        user_attribute_id,
        &serialize_allowance(value),
    )
    .await?;
    HistoryRepo::append(
        &mut *conn,
        &CreateAttributeHistory {
            entity_type: ALLOCATION_USER_ATTRIBUTE_ENTITY,
            entity_id: user_attribute_id,
            field: VALUE_FIELD,
            old_value: Some(attribute.value.clone()),
            new_value: serialize_allowance(value),
        },
    )
    .await?;

    let allocation = AllocationRepo::find_by_id(&mut *conn, attribute.allocation_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Allocation", attribute.allocation_id))?;
    let allocation_user = AllocationUserRepo::find_by_id(&mut *conn, attribute.allocation_user_id)
        .await?
        .ok_or_else(|| EngineError::not_found("AllocationUser", attribute.allocation_user_id))?;
    let membership = ProjectUserRepo::find_detail(
        &mut *conn,
        allocation.project_id,
        allocation_user.user_id,
    )
    .await?;
    if let Some(membership) = membership {
        let date_time = options.transaction_time.unwrap_or_else(Utc::now);
        TransactionRepo::create_project_user_transaction(
            &mut *conn,
            membership.id,
            date_time,
            value,
        )
        .await?;
    }

    if let Some(reason) = &options.change_reason {
        HistoryRepo::set_latest_change_reason(
            &mut *conn,
            ALLOCATION_USER_ATTRIBUTE_ENTITY,
            user_attribute_id,
            reason,
        )
        .await?;
    }
    Ok(())
}

/// Set one member's service-unit usage.
pub async fn set_allocation_user_usage(
    conn: &mut PgConnection,
    user_usage_id: DbId,
    value: Decimal,
    options: &WriteOptions,
) -> Result<(), EngineError> {
    let usage = AttributeRepo::lock_user_usage(&mut *conn, user_usage_id)
        .await?
        .ok_or_else(|| EngineError::not_found("AllocationUserAttributeUsage", user_usage_id))?;
    let type_name =
        AttributeRepo::user_attribute_type_name(&mut *conn, usage.allocation_user_attribute_id)
            .await?;
    assert_service_units(type_name, usage.allocation_user_attribute_id)?;

    AttributeRepo::update_user_usage_value(&mut *conn, user_usage_id, value).await?;
    HistoryRepo::append(
        &mut *conn,
        &CreateAttributeHistory {
            entity_type: ALLOCATION_USER_ATTRIBUTE_USAGE_ENTITY,
            entity_id: user_usage_id,
            field: VALUE_FIELD,
            old_value: Some(usage.value.to_string()),
            new_value: value.to_string(),
        },
    )
    .await?;

    if let Some(reason) = &options.change_reason {
        HistoryRepo::set_latest_change_reason(
            &mut *conn,
            ALLOCATION_USER_ATTRIBUTE_USAGE_ENTITY,
            user_usage_id,
            reason,
        )
        .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pool-level wrappers
// ---------------------------------------------------------------------------

/// Set a project allowance in its own transaction.
pub async fn set_allocation_allowance_atomic(
    pool: &PgPool,
    attribute_id: DbId,
    value: Decimal,
    options: &WriteOptions,
) -> Result<(), EngineError> {
    let mut tx = pool.begin().await?;
    set_allocation_allowance(&mut tx, attribute_id, value, options).await?;
    tx.commit().await?;
    Ok(())
}

/// Set a project usage in its own transaction.
pub async fn set_allocation_usage_atomic(
    pool: &PgPool,
    usage_id: DbId,
    value: Decimal,
    options: &WriteOptions,
) -> Result<(), EngineError> {
    let mut tx = pool.begin().await?;
    set_allocation_usage(&mut tx, usage_id, value, options).await?;
    tx.commit().await?;
    Ok(())
}

/// Set a member allowance in its own transaction.
pub async fn set_allocation_user_allowance_atomic(
    pool: &PgPool,
    user_attribute_id: DbId,
    value: Decimal,
    options: &WriteOptions,
) -> Result<(), EngineError> {
    let mut tx = pool.begin().await?;
    set_allocation_user_allowance(&mut tx, user_attribute_id, value, options).await?;
    tx.commit().await?;
    Ok(())
}

/// Set a member usage in its own transaction.
pub async fn set_allocation_user_usage_atomic(
    pool: &PgPool,
    user_usage_id: DbId,
    value: Decimal,
    options: &WriteOptions,
) -> Result<(), EngineError> {
    let mut tx = pool.begin().await?;
    set_allocation_user_usage(&mut tx, user_usage_id, value, options).await?;
    tx.commit().await?;
    Ok(())
}
