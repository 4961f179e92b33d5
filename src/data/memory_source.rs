//! In-Memory Source Module
//!
//! Process-local authoritative store. Rows are JSON objects keyed by their
//! `id` field. When attached to an [`InMemoryChangeFeed`] every successful
//! write is published, which is how tests and the demo binary simulate
//! other writers.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::cache::Filters;
use crate::data::feed::{ChangeEvent, ChangeKind, InMemoryChangeFeed};
use crate::data::source::{SelectOptions, SortDirection, Source, SourceResult};
use crate::error::SourceError;

type Table = BTreeMap<String, Value>;

// == Memory Source ==
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: RwLock<HashMap<String, Table>>,
    feed: Option<Arc<InMemoryChangeFeed>>,
    /// Error returned by every call while set
    failure: Mutex<Option<SourceError>>,
    calls: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes every successful write to `feed`.
    pub fn with_feed(mut self, feed: Arc<InMemoryChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Loads rows into `namespace` without publishing changes.
    pub fn seed<I>(&self, namespace: &str, rows: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let mut tables = self.tables.write();
        let table = tables.entry(namespace.to_string()).or_default();
        for row in rows {
            if let Some(id) = row_id(&row) {
                table.insert(id, row);
            }
        }
    }

    /// Makes every following call fail with `error` until cleared.
    pub fn fail_with(&self, error: Option<SourceError>) {
        *self.failure.lock() = error;
    }

    /// Number of calls served, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    pub fn row_count(&self, namespace: &str) -> usize {
        self.tables
            .read()
            .get(namespace)
            .map(|table| table.len())
            .unwrap_or(0)
    }

    fn begin(&self) -> SourceResult<()> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        match self.failure.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn publish(&self, namespace: &str, kind: ChangeKind, id: &str, payload: Option<&Value>) {
        if let Some(feed) = &self.feed {
            let mut event = ChangeEvent::new(namespace, kind, Some(id.to_string()));
            if let Some(payload) = payload {
                event = event.with_payload(payload.clone());
            }
            feed.publish(event);
        }
    }
}

fn row_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn rejected(namespace: &str, operation: &str, message: impl Into<String>) -> SourceError {
    SourceError::Rejected {
        namespace: namespace.to_string(),
        operation: operation.to_string(),
        message: message.into(),
    }
}

fn matches(row: &Value, filters: &Filters) -> bool {
    filters
        .iter()
        .filter(|(_, expected)| !expected.is_null())
        .all(|(column, expected)| row.get(column) == Some(expected))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None, Some(_)) | (Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), None) | (Some(_), Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (field, value) in patch {
                target.insert(field, value);
            }
        }
        (target, patch) => *target = patch,
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn select(
        &self,
        namespace: &str,
        filters: &Filters,
        options: &SelectOptions,
    ) -> SourceResult<Vec<Value>> {
        self.begin()?;
        let tables = self.tables.read();
        let mut rows: Vec<Value> = tables
            .get(namespace)
            .map(|table| {
                table
                    .values()
                    .filter(|row| matches(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &options.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                match order.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let offset = options.offset.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);
        let rows: Vec<Value> = rows.into_iter().skip(offset).take(limit).collect();
        debug!(namespace, returned = rows.len(), "source select");
        Ok(rows)
    }

    async fn select_by_id(&self, namespace: &str, id: &str) -> SourceResult<Option<Value>> {
        self.begin()?;
        Ok(self
            .tables
            .read()
            .get(namespace)
            .and_then(|table| table.get(id))
            .cloned())
    }

    async fn insert(&self, namespace: &str, record: Value) -> SourceResult<Value> {
        self.begin()?;
        let id = row_id(&record).ok_or_else(|| rejected(namespace, "insert", "missing id"))?;

        {
            let mut tables = self.tables.write();
            let table = tables.entry(namespace.to_string()).or_default();
            if table.contains_key(&id) {
                return Err(rejected(namespace, "insert", format!("duplicate id {}", id)));
            }
            table.insert(id.clone(), record.clone());
        }

        self.publish(namespace, ChangeKind::Insert, &id, Some(&record));
        Ok(record)
    }

    async fn update(&self, namespace: &str, id: &str, patch: Value) -> SourceResult<Value> {
        self.begin()?;
        let updated = {
            let mut tables = self.tables.write();
            let row = tables
                .get_mut(namespace)
                .and_then(|table| table.get_mut(id))
                .ok_or_else(|| rejected(namespace, "update", format!("no row with id {}", id)))?;
            merge(row, patch);
            row.clone()
        };

        self.publish(namespace, ChangeKind::Update, id, Some(&updated));
        Ok(updated)
    }

    async fn upsert(&self, namespace: &str, record: Value) -> SourceResult<Value> {
        self.begin()?;
        let id = row_id(&record).ok_or_else(|| rejected(namespace, "upsert", "missing id"))?;

        let existed = self
            .tables
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(id.clone(), record.clone())
            .is_some();

        let kind = if existed {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        };
        self.publish(namespace, kind, &id, Some(&record));
        Ok(record)
    }

    async fn delete(&self, namespace: &str, id: &str) -> SourceResult<()> {
        self.begin()?;
        let removed = self
            .tables
            .write()
            .get_mut(namespace)
            .and_then(|table| table.remove(id));

        if removed.is_none() {
            return Err(rejected(namespace, "delete", format!("no row with id {}", id)));
        }
        self.publish(namespace, ChangeKind::Delete, id, None);
        Ok(())
    }
}
