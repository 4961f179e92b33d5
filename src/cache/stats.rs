//! Cache Statistics Module
//!
//! Tracks hit/miss accounting and derived performance metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// == Cache Stats ==
/// Hit/miss counters and the last observed entry count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of fresh lookups
    pub hits: u64,
    /// Number of lookups that found nothing or an expired entry
    pub misses: u64,
    /// Live entry count as of the last count operation
    pub size: usize,
    /// Completion time of the last sweep
    pub last_cleanup: DateTime<Utc>,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self {
            hits: 0,
            misses: 0,
            size: 0,
            last_cleanup: Utc::now(),
        }
    }
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total lookups since the last reset.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Records the entry count observed by a count operation.
    pub fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    /// Resets counters and size, as done by `clear`.
    pub fn reset(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.size = 0;
    }
}

// == Cache Performance ==
/// Derived performance metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePerformance {
    /// Running mean of hit response time in milliseconds
    pub average_response_time: f64,
    /// hits / (hits + misses) as of the last completed lookup
    pub hit_rate: f64,
    /// Entry count at the last metrics update
    pub memory_usage: usize,
    /// Time of the last optimization pass
    pub last_optimization: DateTime<Utc>,
}

impl Default for CachePerformance {
    fn default() -> Self {
        Self {
            average_response_time: 0.0,
            hit_rate: 0.0,
            memory_usage: 0,
            last_optimization: Utc::now(),
        }
    }
}

impl CachePerformance {
    /// Folds one hit's elapsed time into the running mean.
    ///
    /// `lookups` is `hits + misses` including the current call, so the
    /// update is `avg' = (avg * (n - 1) + elapsed) / n`.
    pub fn record_response(&mut self, elapsed_ms: f64, lookups: u64) {
        if lookups == 0 {
            return;
        }
        let n = lookups as f64;
        self.average_response_time = (self.average_response_time * (n - 1.0) + elapsed_ms) / n;
    }

    /// Copies the derived fields from the current stats.
    pub fn refresh_from(&mut self, stats: &CacheStats) {
        self.hit_rate = stats.hit_rate();
        self.memory_usage = stats.size;
    }
}
