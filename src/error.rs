//! Error types for the cache and data access layers
//!
//! Provides unified error handling using thiserror. Each layer owns an error
//! enum; storage errors are absorbed by the cache engine and never reach the
//! caller of a data access or request operation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Storage Error ==
/// Failure of the backing entry store.
///
/// The cache engine treats these as fail-open: reads become misses and
/// writes are logged and dropped.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying file or device failure
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded or decoded
    #[error("storage serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted document is not in the expected shape
    #[error("storage document corrupt: {0}")]
    Corrupt(String),
}

// == Cache Error ==
/// Errors the cache engine surfaces to its caller.
///
/// Only failures that are specific to a single call end up here; shared
/// state is never touched when one of these is returned.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key could not be reduced to its canonical string form
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Caller-supplied value could not be serialized for storage
    #[error("value encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}

// == Source Error ==
/// Failure reported by the authoritative source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source could not be reached or failed internally
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source refused the operation
    #[error("{operation} on {namespace} rejected: {message}")]
    Rejected {
        namespace: String,
        operation: String,
        message: String,
    },
}

// == Data Error ==
/// Errors returned by the data access layer.
#[derive(Error, Debug)]
pub enum DataError {
    /// Authoritative source failed; never cached
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Cache key or value could not be prepared
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Record supplied by the caller could not be serialized
    #[error("record encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Record returned by the source does not match the requested type
    #[error("record decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

// == Request Error ==
/// Errors returned by the request cache wrapper.
#[derive(Error, Debug)]
pub enum RequestError {
    /// Request never produced a response
    #[error("transport failure: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Request body could not be serialized
    #[error("request encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Response payload does not match the requested type
    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// Cache key could not be derived
    #[error(transparent)]
    Cache(#[from] CacheError),
}

// == API Error ==
/// Errors produced by the admin HTTP surface.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

// == Result Type Aliases ==
/// Result of an entry store operation.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result of a cache engine operation.
pub type EngineResult<T> = std::result::Result<T, CacheError>;

/// Result of a data access operation.
pub type DataResult<T> = std::result::Result<T, DataError>;

/// Result of an admin API handler.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_converts_into_data_error() {
        let err: DataError = SourceError::Unavailable("down".to_string()).into();
        assert!(matches!(err, DataError::Source(SourceError::Unavailable(_))));
        assert_eq!(err.to_string(), "source unavailable: down");
    }

    #[test]
    fn test_rejected_message_names_operation() {
        let err = SourceError::Rejected {
            namespace: "alerts".to_string(),
            operation: "insert".to_string(),
            message: "duplicate id".to_string(),
        };
        assert_eq!(err.to_string(), "insert on alerts rejected: duplicate id");
    }

    #[test]
    fn test_api_error_status_code() {
        let response = ApiError::InvalidRequest("bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
