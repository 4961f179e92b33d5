//! API Handlers
//!
//! HTTP request handlers for the cache admin endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::info;

use crate::cache::CacheHandle;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    ClearResponse, HealthResponse, InvalidateRequest, InvalidateResponse, KeysQuery,
    KeysResponse, OptimizeResponse, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache engine
    pub cache: CacheHandle,
}

impl AppState {
    pub fn new(cache: CacheHandle) -> Self {
        Self { cache }
    }
}

/// Handler for GET /stats
///
/// Returns hit/miss counters, performance metrics and entries per namespace.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let namespaces = state.cache.namespace_counts().await;

    Json(StatsResponse::new(
        state.cache.stats(),
        state.cache.performance(),
        namespaces,
    ))
}

/// Handler for GET /keys
pub async fn keys_handler(
    State(state): State<AppState>,
    Query(query): Query<KeysQuery>,
) -> Json<KeysResponse> {
    let mut keys = state.cache.get_keys().await;
    if let Some(needle) = query.contains.as_deref().filter(|n| !n.is_empty()) {
        keys.retain(|key| key.contains(needle));
    }

    Json(KeysResponse::new(keys))
}

/// Handler for POST /invalidate
///
/// Removes every entry whose key contains the pattern.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> ApiResult<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let removed = state.cache.invalidate(&req.pattern).await;
    Ok(Json(InvalidateResponse::new(req.pattern, removed)))
}

/// Handler for POST /optimize
pub async fn optimize_handler(State(state): State<AppState>) -> Json<OptimizeResponse> {
    let report = state.cache.optimize().await;
    Json(OptimizeResponse::new(report, state.cache.stats().size))
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.cache.clear().await;
    info!("cache cleared through admin API");
    Json(ClearResponse::cleared())
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
