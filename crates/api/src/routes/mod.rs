pub mod accounts;
pub mod admission;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /can_submit_job/{job_cost}/{user_id}/{account_id}    admission decision
/// /accounts/{account_id}/balance                       allowance and usage
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(admission::router())
        .merge(accounts::router())
}
