//! Entry Index Module
//!
//! Primary map plus insertion-order and namespace indexes shared by the
//! store implementations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::cache::StoredEntry;

type OrderKey = (DateTime<Utc>, u64, String);

// == Entry Index ==
/// In-memory entry table with secondary indexes.
///
/// Not synchronized; stores wrap it in their own lock.
#[derive(Debug, Clone, Default)]
pub struct EntryIndex {
    entries: HashMap<String, StoredEntry>,
    by_order: BTreeSet<OrderKey>,
    by_namespace: BTreeMap<String, usize>,
    meta: BTreeMap<String, Value>,
}

impl EntryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&StoredEntry> {
        self.entries.get(key)
    }

    /// Inserts or replaces, keeping both indexes in step.
    pub fn put(&mut self, entry: StoredEntry) {
        self.remove(&entry.key);

        let (stored_at, seq) = entry.order();
        self.by_order.insert((stored_at, seq, entry.key.clone()));
        *self.by_namespace.entry(entry.namespace.clone()).or_insert(0) += 1;
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn remove(&mut self, key: &str) -> Option<StoredEntry> {
        let entry = self.entries.remove(key)?;

        let (stored_at, seq) = entry.order();
        self.by_order.remove(&(stored_at, seq, entry.key.clone()));
        if let Some(count) = self.by_namespace.get_mut(&entry.namespace) {
            *count -= 1;
            if *count == 0 {
                self.by_namespace.remove(&entry.namespace);
            }
        }
        Some(entry)
    }

    /// Entries in insertion order.
    pub fn ordered(&self) -> Vec<StoredEntry> {
        self.by_order
            .iter()
            .filter_map(|(_, _, key)| self.entries.get(key).cloned())
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn oldest_keys(&self, limit: usize) -> Vec<String> {
        self.by_order
            .iter()
            .take(limit)
            .map(|(_, _, key)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn namespace_counts(&self) -> BTreeMap<String, usize> {
        self.by_namespace.clone()
    }

    pub fn max_seq(&self) -> u64 {
        self.entries.values().map(|e| e.seq).max().unwrap_or(0)
    }

    /// Drops every entry, keeping metadata.
    pub fn clear_entries(&mut self) {
        self.entries.clear();
        self.by_order.clear();
        self.by_namespace.clear();
    }

    pub fn meta(&self, name: &str) -> Option<Value> {
        self.meta.get(name).cloned()
    }

    pub fn set_meta(&mut self, name: &str, value: Value) {
        self.meta.insert(name.to_string(), value);
    }

    pub fn all_meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }
}
