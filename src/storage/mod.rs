//! Storage Module
//!
//! The entry store abstraction consumed by the cache engine, plus an
//! in-memory and a file-backed implementation. Only the cache engine talks
//! to a store; every other layer goes through the engine.

mod file;
mod index;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::StoredEntry;
use crate::error::StorageResult;

pub use file::FileStore;
pub use index::EntryIndex;
pub use memory::MemoryStore;

// == Entry Store ==
/// Transactional key/value store for cache entries.
///
/// Each method is atomic on its own. Sequences of calls are not: the cache
/// engine tolerates interleaving between e.g. a count and the evictions it
/// triggers.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Looks up an entry by canonical key.
    async fn get_by_key(&self, key: &str) -> StorageResult<Option<StoredEntry>>;

    /// Inserts or fully replaces an entry.
    async fn put_by_key(&self, entry: StoredEntry) -> StorageResult<()>;

    /// Removes an entry. Returns whether it existed.
    async fn delete_by_key(&self, key: &str) -> StorageResult<bool>;

    /// Removes every listed key in one transaction. Returns the removed count.
    async fn delete_many(&self, keys: &[String]) -> StorageResult<usize>;

    /// All entries ordered by insertion (`stored_at`, then sequence).
    async fn scan_all(&self) -> StorageResult<Vec<StoredEntry>>;

    /// All keys in arbitrary order.
    async fn keys(&self) -> StorageResult<Vec<String>>;

    /// Keys of the `limit` oldest entries by insertion order.
    async fn oldest_keys(&self, limit: usize) -> StorageResult<Vec<String>>;

    /// Number of stored entries.
    async fn count(&self) -> StorageResult<usize>;

    /// Entry count per namespace.
    async fn namespace_counts(&self) -> StorageResult<BTreeMap<String, usize>>;

    /// Highest write sequence held, zero when empty.
    async fn max_seq(&self) -> StorageResult<u64>;

    /// Removes every entry. Metadata is kept.
    async fn clear(&self) -> StorageResult<()>;

    /// Reads a metadata document.
    async fn load_meta(&self, name: &str) -> StorageResult<Option<Value>>;

    /// Writes a metadata document.
    async fn save_meta(&self, name: &str, value: Value) -> StorageResult<()>;
}
