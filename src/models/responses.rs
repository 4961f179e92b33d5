//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::{CachePerformance, CacheStats, SweepReport};

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub stats: CacheStats,
    pub performance: CachePerformance,
    /// Stored entries per namespace
    pub namespaces: BTreeMap<String, usize>,
    /// hits / (hits + misses), zero before the first lookup
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(
        stats: CacheStats,
        performance: CachePerformance,
        namespaces: BTreeMap<String, usize>,
    ) -> Self {
        let hit_rate = stats.hit_rate();
        Self {
            stats,
            performance,
            namespaces,
            hit_rate,
        }
    }
}

/// Response body for GET /keys
#[derive(Debug, Clone, Serialize)]
pub struct KeysResponse {
    pub count: usize,
    pub keys: Vec<String>,
}

impl KeysResponse {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            count: keys.len(),
            keys,
        }
    }
}

/// Response body for POST /invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    pub pattern: String,
    pub removed: usize,
}

impl InvalidateResponse {
    pub fn new(pattern: impl Into<String>, removed: usize) -> Self {
        let pattern = pattern.into();
        Self {
            message: format!("Invalidated {} entries matching '{}'", removed, pattern),
            pattern,
            removed,
        }
    }
}

/// Response body for POST /optimize
#[derive(Debug, Clone, Serialize)]
pub struct OptimizeResponse {
    pub expired: usize,
    pub evicted: usize,
    /// Entry count after the pass
    pub size: usize,
}

impl OptimizeResponse {
    pub fn new(report: SweepReport, size: usize) -> Self {
        Self {
            expired: report.expired,
            evicted: report.evicted,
            size,
        }
    }
}

/// Response body for DELETE /cache
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
}

impl ClearResponse {
    pub fn cleared() -> Self {
        Self {
            message: "Cache cleared".to_string(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
