//! Resolution endpoints
//!
//! - `POST /resolve` resolves one identifier
//! - `POST /resolve/batch` resolves many under the bounded worker pool

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use tracing::{info, warn};

use crate::batch::BatchReport;
use crate::error::{ApiError, ApiResult};
use crate::types::{EnrichmentResult, RequestHints};
use crate::AppState;

/// Largest batch accepted in one request
pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub identifier: String,
    #[serde(default)]
    pub known_domain: Option<String>,
    #[serde(default)]
    pub known_location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub identifiers: Vec<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

/// POST /resolve
pub async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<EnrichmentResult>> {
    let hints = RequestHints {
        known_domain: request.known_domain,
        known_location: request.known_location,
    };
    let result = state
        .engine
        .resolve_with_hints(&request.identifier, hints)
        .await
        .map_err(|e| {
            warn!(identifier = %request.identifier, error = %e, "Resolve request rejected");
            ApiError::from(e)
        })?;
    Ok(Json(result))
}

/// POST /resolve/batch
///
/// Service shutdown cancels the batch: in-flight items finish, the rest are
/// reported as not started.
pub async fn resolve_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<Json<BatchReport>> {
    if request.identifiers.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BadRequest(format!(
            "batch of {} exceeds the limit of {}",
            request.identifiers.len(),
            MAX_BATCH_SIZE
        )));
    }
    if request.concurrency == Some(0) {
        return Err(ApiError::BadRequest("concurrency must be at least 1".to_string()));
    }

    info!(
        identifiers = request.identifiers.len(),
        concurrency = ?request.concurrency,
        "Batch request received"
    );
    let report = state
        .engine
        .resolve_batch_cancellable(request.identifiers, request.concurrency, state.shutdown.child_token())
        .await;
    Ok(Json(report))
}

pub fn resolve_routes() -> Router<AppState> {
    Router::new()
        .route("/resolve", post(resolve))
        .route("/resolve/batch", post(resolve_batch))
}
