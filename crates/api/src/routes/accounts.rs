use axum::extract::{Path, State};
use axum::{routing::get, Json, Router};
use rust_decimal::Decimal;
use serde::Serialize;

use granta_accounting::objects::{AccountingObjects, LoadError};
use granta_core::error::CoreError;
use granta_core::su::parse_stored_allowance;
use granta_db::repositories::ProjectRepo;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Account balance response payload.
#[derive(Serialize)]
pub struct AccountBalanceResponse {
    pub account: String,
    pub allowance: Decimal,
    pub usage: Decimal,
}

/// GET /api/accounts/{account_id}/balance
///
/// The service-unit allowance and usage of an account's active compute
/// allocation. Unknown accounts and accounts without an active allocation
/// are caller mistakes (400); malformed stored values are not (500).
async fn account_balance(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> AppResult<Json<AccountBalanceResponse>> {
    let project = ProjectRepo::find_by_name(&state.pool, &account_id)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest(format!("No account exists with account_id {account_id}."))
        })?;

    let mut conn = state.pool.acquire().await?;
    let objects = AccountingObjects::load(&mut conn, &project, None)
        .await
        .map_err(map_load_error)?;
    let allowance = parse_stored_allowance(&objects.attribute.value)
        .map_err(|message| AppError::Core(CoreError::Invariant(message)))?;

    Ok(Json(AccountBalanceResponse {
        account: objects.project.name,
        allowance,
        usage: objects.usage.value,
    }))
}

fn map_load_error(err: LoadError) -> AppError {
    match err {
        LoadError::NotProjectMember { .. }
        | LoadError::NoActiveComputeAllocation { .. }
        | LoadError::NotAllocationMember { .. } => AppError::BadRequest(err.to_string()),
        LoadError::Invariant(message) => AppError::Core(CoreError::Invariant(message)),
        LoadError::Database(e) => AppError::Database(e),
    }
}

/// Mount account routes (under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route("/accounts/{account_id}/balance", get(account_balance))
}
