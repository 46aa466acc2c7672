use std::sync::Arc;

use granta_core::config::LedgerConfig;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: granta_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Service-unit ledger bounds and switches.
    pub ledger: Arc<LedgerConfig>,
}
