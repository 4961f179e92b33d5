//! In-Memory Store Module
//!
//! Entry store backed by an [`EntryIndex`] behind an async lock.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{EntryIndex, EntryStore};
use crate::cache::StoredEntry;
use crate::error::StorageResult;

// == Memory Store ==
/// Volatile entry store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: RwLock<EntryIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn get_by_key(&self, key: &str) -> StorageResult<Option<StoredEntry>> {
        Ok(self.index.read().await.get(key).cloned())
    }

    async fn put_by_key(&self, entry: StoredEntry) -> StorageResult<()> {
        self.index.write().await.put(entry);
        Ok(())
    }

    async fn delete_by_key(&self, key: &str) -> StorageResult<bool> {
        Ok(self.index.write().await.remove(key).is_some())
    }

    async fn delete_many(&self, keys: &[String]) -> StorageResult<usize> {
        let mut index = self.index.write().await;
        Ok(keys.iter().filter(|k| index.remove(k.as_str()).is_some()).count())
    }

    async fn scan_all(&self) -> StorageResult<Vec<StoredEntry>> {
        Ok(self.index.read().await.ordered())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.index.read().await.keys())
    }

    async fn oldest_keys(&self, limit: usize) -> StorageResult<Vec<String>> {
        Ok(self.index.read().await.oldest_keys(limit))
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.index.read().await.len())
    }

    async fn namespace_counts(&self) -> StorageResult<BTreeMap<String, usize>> {
        Ok(self.index.read().await.namespace_counts())
    }

    async fn max_seq(&self) -> StorageResult<u64> {
        Ok(self.index.read().await.max_seq())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.index.write().await.clear_entries();
        Ok(())
    }

    async fn load_meta(&self, name: &str) -> StorageResult<Option<Value>> {
        Ok(self.index.read().await.meta(name))
    }

    async fn save_meta(&self, name: &str, value: Value) -> StorageResult<()> {
        self.index.write().await.set_meta(name, value);
        Ok(())
    }
}
