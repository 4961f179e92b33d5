//! Tablecache - persistent TTL cache for table-shaped data
//!
//! A cache engine with FIFO size eviction over a pluggable entry store,
//! a cache-aside data access layer kept consistent by invalidate-on-write
//! and change-feed notifications, and a request cache for opaque HTTP
//! endpoints.

pub mod api;
pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod request;
pub mod storage;
pub mod tasks;

pub use api::AppState;
pub use cache::{Cache, CacheConfig, CacheHandle, CacheKey};
pub use config::Config;
pub use data::DataService;
pub use request::RequestCache;
pub use storage::{EntryStore, FileStore, MemoryStore};
