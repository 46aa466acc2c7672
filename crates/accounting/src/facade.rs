//! Composite service-unit adjustments across a project and its members.

use granta_core::config::LedgerConfig;
use granta_core::su::{validate_su_quantity, SERVICE_UNITS_ATTRIBUTE};
use granta_core::types::Timestamp;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use granta_db::repositories::AttributeRepo;

use crate::error::EngineError;
use crate::ledger::{self, WriteOptions};
use crate::objects::AccountingObjects;

/// The changes to apply. Only supplied values are written; per-user values
/// apply uniformly to every member holding a Service Units attribute.
#[derive(Debug, Clone, Default)]
pub struct SetServiceUnits {
    pub allocation_allowance: Option<Decimal>,
    pub allocation_usage: Option<Decimal>,
    pub allocation_transaction_time: Option<Timestamp>,
    pub allocation_change_reason: Option<String>,
    pub user_allowance: Option<Decimal>,
    pub user_usage: Option<Decimal>,
    pub user_transaction_time: Option<Timestamp>,
    pub user_change_reason: Option<String>,
}

/// Apply the changes in one transaction owned by the caller.
///
/// Validation runs before any write so a bad value leaves the ledger
/// untouched. Members lacking a Service Units attribute (removed or errored
/// users) are skipped without error; a Service Units attribute lacking its
/// usage row is an invariant violation that aborts the whole call.
pub async fn apply_service_units(
    conn: &mut PgConnection,
    objects: &AccountingObjects,
    config: &LedgerConfig,
    changes: &SetServiceUnits,
) -> Result<(), EngineError> {
    for value in [
        changes.allocation_allowance,
        changes.allocation_usage,
        changes.user_allowance,
        changes.user_usage,
    ]
    .into_iter()
    .flatten()
    {
        validate_su_quantity(value, config)?;
    }

    let allocation_options = WriteOptions {
        transaction_time: changes.allocation_transaction_time,
        change_reason: changes.allocation_change_reason.clone(),
    };
    if let Some(allowance) = changes.allocation_allowance {
        ledger::set_allocation_allowance(
            &mut *conn,
            objects.attribute.id,
            allowance,
            &allocation_options,
        )
        .await?;
    }
    if let Some(usage) = changes.allocation_usage {
        ledger::set_allocation_usage(&mut *conn, objects.usage.id, usage, &allocation_options)
            .await?;
    }

    if changes.user_allowance.is_none() && changes.user_usage.is_none() {
        return Ok(());
    }

    let user_options = WriteOptions {
        transaction_time: changes.user_transaction_time,
        change_reason: changes.user_change_reason.clone(),
    };
    let user_attributes = AttributeRepo::list_user_attributes_for_allocation(
        &mut *conn,
        objects.allocation.id,
        SERVICE_UNITS_ATTRIBUTE,
    )
    .await?;
    for user_attribute in &user_attributes {
        if let Some(allowance) = changes.user_allowance {
            ledger::set_allocation_user_allowance(
                &mut *conn,
                user_attribute.id,
                allowance,
                &user_options,
            )
            .await?;
        }
        if let Some(usage) = changes.user_usage {
            let usage_row = AttributeRepo::find_user_usage(&mut *conn, user_attribute.id)
                .await?
                .ok_or_else(|| {
                    EngineError::invariant(format!(
                        "AllocationUserAttribute {} has no usage row.",
                        user_attribute.id
                    ))
                })?;
            ledger::set_allocation_user_usage(&mut *conn, usage_row.id, usage, &user_options)
                .await?;
        }
    }
    Ok(())
}

/// Apply the changes in a new transaction: all-or-nothing across every
/// touched row.
pub async fn set_service_units(
    pool: &PgPool,
    objects: &AccountingObjects,
    config: &LedgerConfig,
    changes: &SetServiceUnits,
) -> Result<(), EngineError> {
    let mut tx = pool.begin().await?;
    apply_service_units(&mut tx, objects, config, changes).await?;
    tx.commit().await?;
    Ok(())
}
