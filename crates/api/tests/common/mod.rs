use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use granta_api::config::ServerConfig;
use granta_api::router::build_app_router;
use granta_api::state::AppState;
use granta_core::config::LedgerConfig;
use granta_core::su::SERVICE_UNITS_ATTRIBUTE;
use granta_db::models::project::CreateProject;
use granta_db::models::user::CreateUser;
use granta_db::repositories::{
    AllocationRepo, AllocationUserRepo, AttributeRepo, ProjectRepo, ProjectUserRepo, UserRepo,
};

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
///
/// Goes through [`build_app_router`] so integration tests exercise the same
/// middleware stack (CORS, request ID, timeout, tracing, panic recovery)
/// that production uses.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ledger: Arc::new(LedgerConfig::default()),
    };
    build_app_router(state, &config)
}

/// Issue a GET request against the app without binding a socket.
pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Seed an active account with one member carrying the given service-unit
/// allowance and usage, at both the account and member level.
pub async fn seed_funded_account(
    pool: &PgPool,
    account: &str,
    username: &str,
    allowance: &str,
    usage: &str,
) {
    let project = ProjectRepo::create(
        pool,
        &CreateProject {
            name: account.to_string(),
            title: format!("Title for {account}"),
            status: "Active".to_string(),
        },
    )
    .await
    .unwrap();
    let allocation = AllocationRepo::create(pool, project.id, "Savio Compute", "Active", None, None)
        .await
        .unwrap();
    let attribute =
        AttributeRepo::upsert_attribute(pool, allocation.id, SERVICE_UNITS_ATTRIBUTE, allowance)
            .await
            .unwrap();
    let usage_row = AttributeRepo::get_or_create_usage(pool, attribute.id)
        .await
        .unwrap();
    AttributeRepo::update_usage_value(pool, usage_row.id, usage.parse().unwrap())
        .await
        .unwrap();

    let user = UserRepo::create(
        pool,
        &CreateUser {
            username: username.to_string(),
            email: format!("{username}@example.edu"),
            cluster_uid: Some(format!("uid_{username}")),
            is_pi: false,
        },
    )
    .await
    .unwrap();
    ProjectUserRepo::upsert(pool, project.id, user.id, "User", "Active")
        .await
        .unwrap();
    let member = AllocationUserRepo::get_or_create_active(pool, allocation.id, user.id)
        .await
        .unwrap();
    let user_attribute = AttributeRepo::upsert_user_attribute(
        pool,
        member.id,
        allocation.id,
        SERVICE_UNITS_ATTRIBUTE,
        allowance,
    )
    .await
    .unwrap();
    let user_usage = AttributeRepo::get_or_create_user_usage(pool, user_attribute.id)
        .await
        .unwrap();
    AttributeRepo::update_user_usage_value(pool, user_usage.id, usage.parse().unwrap())
        .await
        .unwrap();
}
