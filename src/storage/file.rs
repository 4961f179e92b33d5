//! File Store Module
//!
//! Entry store persisted as a single JSON document. Every mutation rewrites
//! the document through a temporary file in the same directory and an
//! atomic persist, so a crash leaves either the old or the new contents on
//! disk.
//!
//! Mutations are applied to a copy of the index. The copy replaces the live
//! index only after it has been written, so memory never runs ahead of disk.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{EntryIndex, EntryStore};
use crate::cache::StoredEntry;
use crate::error::{StorageError, StorageResult};

/// Document format version written to disk.
const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: u32,
    entries: Vec<StoredEntry>,
    #[serde(default)]
    meta: BTreeMap<String, Value>,
}

// == File Store ==
/// Persistent entry store rooted at a single file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    index: Mutex<EntryIndex>,
}

impl FileStore {
    // == Open ==
    /// Opens the store at `path`, loading existing contents if present.
    ///
    /// A missing file is an empty store. A file that does not parse is
    /// reported as [`StorageError::Corrupt`].
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut index = EntryIndex::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let document: Document = serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                if document.version != DOCUMENT_VERSION {
                    return Err(StorageError::Corrupt(format!(
                        "unsupported document version {}",
                        document.version
                    )));
                }
                for entry in document.entries {
                    index.put(entry);
                }
                for (name, value) in document.meta {
                    index.set_meta(&name, value);
                }
                info!(path = %path.display(), entries = index.len(), "file store loaded");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file store starting empty");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Commit ==
    /// Persists `next` and installs it as the live index. Called with the
    /// index lock held so that documents land in mutation order.
    async fn commit(&self, live: &mut EntryIndex, next: EntryIndex) -> StorageResult<()> {
        self.persist(&next).await?;
        *live = next;
        Ok(())
    }

    async fn persist(&self, index: &EntryIndex) -> StorageResult<()> {
        let document = Document {
            version: DOCUMENT_VERSION,
            entries: index.ordered(),
            meta: index.all_meta().clone(),
        };
        let bytes = serde_json::to_vec(&document)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e.to_string())))?
    }
}

/// Writes `bytes` to a fresh temp file beside `dest` and persists it over
/// `dest`.
fn write_atomic(dest: &Path, bytes: &[u8]) -> StorageResult<()> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl EntryStore for FileStore {
    async fn get_by_key(&self, key: &str) -> StorageResult<Option<StoredEntry>> {
        Ok(self.index.lock().await.get(key).cloned())
    }

    async fn put_by_key(&self, entry: StoredEntry) -> StorageResult<()> {
        let mut index = self.index.lock().await;
        let mut next = index.clone();
        next.put(entry);
        self.commit(&mut index, next).await
    }

    async fn delete_by_key(&self, key: &str) -> StorageResult<bool> {
        let mut index = self.index.lock().await;
        if index.get(key).is_none() {
            return Ok(false);
        }
        let mut next = index.clone();
        next.remove(key);
        self.commit(&mut index, next).await?;
        Ok(true)
    }

    async fn delete_many(&self, keys: &[String]) -> StorageResult<usize> {
        let mut index = self.index.lock().await;
        let mut next = index.clone();
        let removed = keys
            .iter()
            .filter(|k| next.remove(k.as_str()).is_some())
            .count();
        if removed > 0 {
            self.commit(&mut index, next).await?;
        }
        Ok(removed)
    }

    async fn scan_all(&self) -> StorageResult<Vec<StoredEntry>> {
        Ok(self.index.lock().await.ordered())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.index.lock().await.keys())
    }

    async fn oldest_keys(&self, limit: usize) -> StorageResult<Vec<String>> {
        Ok(self.index.lock().await.oldest_keys(limit))
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.index.lock().await.len())
    }

    async fn namespace_counts(&self) -> StorageResult<BTreeMap<String, usize>> {
        Ok(self.index.lock().await.namespace_counts())
    }

    async fn max_seq(&self) -> StorageResult<u64> {
        Ok(self.index.lock().await.max_seq())
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut index = self.index.lock().await;
        let mut next = index.clone();
        next.clear_entries();
        self.commit(&mut index, next).await
    }

    async fn load_meta(&self, name: &str) -> StorageResult<Option<Value>> {
        Ok(self.index.lock().await.meta(name))
    }

    async fn save_meta(&self, name: &str, value: Value) -> StorageResult<()> {
        let mut index = self.index.lock().await;
        let mut next = index.clone();
        next.set_meta(name, value);
        self.commit(&mut index, next).await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use serde_json::json;
    use std::time::Duration;

    fn stored(key: &str, seq: u64) -> StoredEntry {
        StoredEntry {
            key: key.to_string(),
            namespace: key.split(':').next().unwrap_or_default().to_string(),
            seq,
            entry: CacheEntry::new(json!({"seq": seq}), Duration::from_secs(60), "1.0"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("cache.json")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        {
            let store = FileStore::open(&path).await.unwrap();
            store.put_by_key(stored("products:a", 1)).await.unwrap();
            store.put_by_key(stored("orders:b", 2)).await.unwrap();
            store.delete_by_key("orders:b").await.unwrap();
            store.save_meta("stats", json!({"hits": 2})).await.unwrap();
        }

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.keys().await.unwrap(), vec!["products:a".to_string()]);
        assert_eq!(reopened.max_seq().await.unwrap(), 1);
        assert_eq!(
            reopened.load_meta("stats").await.unwrap(),
            Some(json!({"hits": 2}))
        );
        assert_eq!(
            reopened.namespace_counts().await.unwrap().get("products"),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_insertion_order_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        {
            let store = FileStore::open(&path).await.unwrap();
            for (i, key) in ["x:1", "x:2", "x:3"].iter().enumerate() {
                store.put_by_key(stored(key, i as u64 + 1)).await.unwrap();
            }
        }

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.oldest_keys(2).await.unwrap(), vec!["x:1", "x:2"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let result = FileStore::open(&path).await;
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_clear_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        {
            let store = FileStore::open(&path).await.unwrap();
            store.put_by_key(stored("products:a", 1)).await.unwrap();
            store.clear().await.unwrap();
        }

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = FileStore::open(&path).await.unwrap();
        store.put_by_key(stored("products:a", 1)).await.unwrap();

        // A non-empty directory at the destination makes every persist fail
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();
        tokio::fs::write(path.join("blocker"), b"x").await.unwrap();

        assert!(store.put_by_key(stored("products:b", 2)).await.is_err());
        assert!(store.delete_by_key("products:a").await.is_err());
        assert!(store.delete_many(&["products:a".to_string()]).await.is_err());
        assert!(store.clear().await.is_err());
        assert!(store.save_meta("stats", json!({"hits": 1})).await.is_err());

        assert!(store.get_by_key("products:b").await.unwrap().is_none());
        assert_eq!(store.keys().await.unwrap(), vec!["products:a".to_string()]);
        assert_eq!(store.max_seq().await.unwrap(), 1);
        assert_eq!(store.load_meta("stats").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tmp_named_siblings_do_not_interfere() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("cache.tmp")).await.unwrap();

        let path = dir.path().join("cache.json");
        let store = FileStore::open(&path).await.unwrap();
        store.put_by_key(stored("products:a", 1)).await.unwrap();

        let tmp_path = dir.path().join("entries.tmp");
        let tmp_store = FileStore::open(&tmp_path).await.unwrap();
        tmp_store.put_by_key(stored("orders:b", 2)).await.unwrap();

        assert_eq!(FileStore::open(&path).await.unwrap().count().await.unwrap(), 1);
        assert_eq!(FileStore::open(&tmp_path).await.unwrap().count().await.unwrap(), 1);
    }
}
