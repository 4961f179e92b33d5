//! Cache Module
//!
//! Persistent TTL cache with FIFO size eviction, statistics and events.

mod engine;
mod entry;
mod events;
mod key;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use engine::{
    Cache, CacheConfig, CacheHandle, CacheResult, GetOptions, Lookup, SetOptions, SweepReport,
};
pub use entry::{CacheEntry, StoredEntry, DEFAULT_VERSION};
pub use events::{CacheEvent, CacheEventKind, EventBus, Listener};
pub use key::{CacheKey, Filters, Operation};
pub use stats::{CachePerformance, CacheStats};
