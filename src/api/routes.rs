//! API Routes
//!
//! Configures the Axum router with the cache admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, health_handler, invalidate_handler, keys_handler, optimize_handler,
    stats_handler, AppState,
};

/// Creates the admin router.
///
/// # Endpoints
/// - `GET /health` - Health check
/// - `GET /stats` - Stats, performance and per-namespace counts
/// - `GET /keys` - Stored keys, optionally filtered with `?contains=`
/// - `POST /invalidate` - Remove keys containing a pattern
/// - `POST /optimize` - Run a sweep now
/// - `DELETE /cache` - Remove everything and reset counters
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/keys", get(keys_handler))
        .route("/invalidate", post(invalidate_handler))
        .route("/optimize", post(optimize_handler))
        .route("/cache", delete(clear_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
