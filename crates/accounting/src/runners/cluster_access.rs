//! Cluster-access attribute handling shared by the request runners.

use granta_core::su::CLUSTER_ACCOUNT_STATUS_ATTRIBUTE;
use sqlx::PgConnection;

use granta_db::models::allocation::AllocationUser;
use granta_db::repositories::AttributeRepo;

use crate::error::EngineError;

const PENDING_ADD: &str = "Pending - Add";
const ACTIVE: &str = "Active";

/// Raise an invariant error if the member already has a pending or active
/// cluster-access attribute. Callers must prevent this condition; it is not
/// recoverable here.
pub async fn assert_no_cluster_access(
    conn: &mut PgConnection,
    allocation_user: &AllocationUser,
) -> Result<(), EngineError> {
    let existing = AttributeRepo::find_user_attribute(
        &mut *conn,
        allocation_user.id,
        CLUSTER_ACCOUNT_STATUS_ATTRIBUTE,
    )
    .await?;
    if let Some(attribute) = existing {
        if attribute.value == PENDING_ADD || attribute.value == ACTIVE {
            return Err(EngineError::invariant(format!(
                "AllocationUser {} already has a {} cluster access request.",
                allocation_user.id, attribute.value
            )));
        }
    }
    Ok(())
}

/// Ensure the member has a "Pending - Add" cluster-access attribute.
///
/// An already-active attribute is left alone with a warning (the member can
/// already reach the cluster); an already-pending one is left alone
/// silently; any other value is reset to pending.
pub async fn ensure_pending_cluster_access(
    conn: &mut PgConnection,
    allocation_user: &AllocationUser,
) -> Result<(), EngineError> {
    let existing = AttributeRepo::find_user_attribute(
        &mut *conn,
        allocation_user.id,
        CLUSTER_ACCOUNT_STATUS_ATTRIBUTE,
    )
    .await?;
    match existing {
        None => {
            assert_no_cluster_access(&mut *conn, allocation_user).await?;
            AttributeRepo::upsert_user_attribute(
                &mut *conn,
                allocation_user.id,
                allocation_user.allocation_id,
                CLUSTER_ACCOUNT_STATUS_ATTRIBUTE,
                PENDING_ADD,
            )
            .await?;
        }
        Some(attribute) if attribute.value == ACTIVE => {
            tracing::warn!(
                allocation_user_id = allocation_user.id,
                user_id = allocation_user.user_id,
                "Member unexpectedly already has active cluster access."
            );
        }
        Some(attribute) if attribute.value == PENDING_ADD => {}
        Some(attribute) => {
            AttributeRepo::update_user_attribute_value(&mut *conn, attribute.id, PENDING_ADD)
                .await?;
        }
    }
    Ok(())
}
