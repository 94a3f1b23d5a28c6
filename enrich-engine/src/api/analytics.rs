//! Cost/outcome analytics endpoint

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::ledger::Analytics;
use crate::AppState;

/// Window used when `since` is omitted
const DEFAULT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    /// RFC 3339 timestamp
    pub since: Option<String>,
}

/// GET /analytics?since=<rfc3339>
pub async fn get_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<Analytics>> {
    let since = match query.since.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| ApiError::BadRequest(format!("invalid since '{}': {}", raw, e)))?,
        None => Utc::now() - Duration::hours(DEFAULT_WINDOW_HOURS),
    };

    match state.engine.analytics(since).await {
        Ok(analytics) => Ok(Json(analytics)),
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

pub fn analytics_routes() -> Router<AppState> {
    Router::new().route("/analytics", get(get_analytics))
}
