//! API Module
//!
//! Admin HTTP surface over a cache instance.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Cache statistics and performance
//! - `GET /keys` - Stored keys
//! - `POST /invalidate` - Substring invalidation
//! - `POST /optimize` - Immediate sweep
//! - `DELETE /cache` - Clear the cache

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
