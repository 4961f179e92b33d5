//! Change Feed Module
//!
//! Push notifications of row-level changes made by any writer.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SourceError;

// == Change Event ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row change observed in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub namespace: String,
    pub kind: ChangeKind,
    pub record_id: Option<String>,
    pub payload: Option<Value>,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(namespace: impl Into<String>, kind: ChangeKind, record_id: Option<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            record_id,
            payload: None,
            at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Receiving half of a namespace subscription. The subscription ends when
/// the feed drops its sender or the receiver is dropped.
pub type ChangeStream = mpsc::UnboundedReceiver<ChangeEvent>;

// == Change Feed ==
/// Source of change notifications.
///
/// Delivery is at-least-once and best-effort; consumers must tolerate
/// duplicates.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a stream of changes to `namespace`.
    async fn subscribe(&self, namespace: &str) -> Result<ChangeStream, SourceError>;
}

// == In-Memory Change Feed ==
/// In-process event bus for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryChangeFeed {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<ChangeEvent>>>>,
}

impl InMemoryChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every live subscriber of its namespace and
    /// returns how many received it. Closed subscribers are pruned.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        let Some(senders) = subscribers.get_mut(&event.namespace) else {
            return 0;
        };

        senders.retain(|tx| tx.send(event.clone()).is_ok());
        let delivered = senders.len();
        debug!(namespace = %event.namespace, kind = ?event.kind, delivered, "change published");
        delivered
    }

    /// Number of live subscribers for `namespace`.
    pub fn subscriber_count(&self, namespace: &str) -> usize {
        self.subscribers
            .lock()
            .get(namespace)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn subscribe(&self, namespace: &str) -> Result<ChangeStream, SourceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
