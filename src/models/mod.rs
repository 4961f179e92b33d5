//! Entity records and admin API models
//!
//! Typed rows of the dashboard tables plus the DTOs used for
//! serializing/deserializing admin HTTP request and response bodies.

pub mod entities;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use entities::{Alert, Product, Record, Sale, Supplier};
pub use requests::{InvalidateRequest, KeysQuery};
pub use responses::{
    ClearResponse, HealthResponse, InvalidateResponse, KeysResponse, OptimizeResponse,
    StatsResponse,
};
