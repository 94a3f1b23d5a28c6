//! Health check endpoint
//!
//! Reports what this engine depends on at runtime: the ledger writer task,
//! the configured backup waterfall and whether rendering is enabled. A stopped
//! ledger writer marks the service `degraded`; resolution still works but
//! analytics stop counting.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::config::MODULE_NAME;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub build: &'static str,
    pub uptime_seconds: u64,
    /// `running` or `stopped`
    pub ledger_writer: &'static str,
    /// Backup sources in waterfall order
    pub backup_sources: Vec<&'static str>,
    pub render_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let orchestrator = state.engine.orchestrator();
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;
    let ledger_running = orchestrator.ledger().is_running();

    Json(HealthResponse {
        status: if ledger_running { "ok" } else { "degraded" },
        module: MODULE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        build: env!("ENRICH_BUILD_ID"),
        uptime_seconds,
        ledger_writer: if ledger_running { "running" } else { "stopped" },
        backup_sources: orchestrator.waterfall().ids().into_iter().map(|id| id.as_str()).collect(),
        render_enabled: orchestrator.render_enabled(),
        last_error: state.last_error.read().await.clone(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
