use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Serialize;

use granta_accounting::{can_submit_job, StatusClass};

use crate::state::AppState;

/// Admission decision response payload.
#[derive(Serialize)]
pub struct CanSubmitJobResponse {
    pub success: bool,
    pub message: String,
}

/// GET /api/can_submit_job/{job_cost}/{user_id}/{account_id}
///
/// Every outcome is a decision, not an error: denials and malformed inputs
/// come back as JSON with the appropriate status code rather than the
/// generic error envelope.
async fn can_submit_job_handler(
    State(state): State<AppState>,
    Path((job_cost, user_id, account_id)): Path<(String, String, String)>,
) -> Response {
    let outcome =
        can_submit_job(&state.pool, &state.ledger, &job_cost, &user_id, &account_id).await;

    let status = match outcome.status {
        StatusClass::Ok => StatusCode::OK,
        StatusClass::ClientError => StatusCode::BAD_REQUEST,
        StatusClass::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = CanSubmitJobResponse {
        success: outcome.success,
        message: outcome.message,
    };
    (status, Json(body)).into_response()
}

/// Mount admission routes (under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/can_submit_job/{job_cost}/{user_id}/{account_id}",
        get(can_submit_job_handler),
    )
}
