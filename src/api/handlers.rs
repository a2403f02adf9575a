//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Handlers only
//! translate between HTTP and the coordinator.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use crate::cache::CacheCoordinator;
use crate::error::{CacheError, Result};
use crate::models::{GetResponse, HealthResponse, SetRequest, StatsResponse};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Write-through cache coordinator
    pub cache: CacheCoordinator,
}

impl AppState {
    /// Creates a new AppState around the given coordinator.
    pub fn new(cache: CacheCoordinator) -> Self {
        Self { cache }
    }
}

/// Handler for GET /cache/{key}
///
/// Returns the stored value, or 404 if the key is absent or expired.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state.cache.get_value(&key)?;
    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for POST /cache/{key}
///
/// Body: `{"value": string, "expiry"?: number | null}`. Responds 204 once the
/// entry is durable; malformed bodies are rejected with 400.
pub async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: std::result::Result<Json<SetRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(req) = payload.map_err(|rejection| CacheError::InvalidRequest(rejection.body_text()))?;
    let entry = req.into_entry(key)?;

    state.cache.set_value(entry).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for DELETE /cache/{key}
///
/// Idempotent: deleting an absent key also responds 204.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    state.cache.delete_value(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.stats(),
        state.cache.engine_name(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
