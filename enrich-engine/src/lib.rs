//! enrich-engine library interface
//!
//! Entity enrichment resolution: turns a sparse identifier (domain or company
//! name) into a confidence-scored [`types::EnrichmentResult`], reconciling
//! scraped pages and backup data sources without ever fabricating a value.

pub mod api;
pub mod batch;
pub mod cache;
pub mod config;
pub mod db;
pub mod dns;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod orchestrator;
pub mod sources;
pub mod tiers;
pub mod types;
pub mod validate;

pub use crate::engine::Engine;
pub use crate::error::{ApiError, ApiResult, EngineError};
pub use crate::orchestrator::{Orchestrator, OrchestratorBuilder};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// Cancelled on shutdown; batches run under child tokens
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(engine: Engine, shutdown: CancellationToken) -> Self {
        Self {
            engine,
            shutdown,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::resolve_routes())
        .merge(api::analytics_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
