//! Cache Events Module
//!
//! Event notification for completed cache operations. Listeners are keyed
//! by event kind with one listener per kind; registering again replaces the
//! previous listener. Consumers that need every event use [`EventBus::subscribe`].

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::error;

/// Capacity of the broadcast channel behind [`EventBus::subscribe`].
const BROADCAST_CAPACITY: usize = 256;

// == Event Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEventKind {
    Hit,
    Miss,
    Set,
    Delete,
    Clear,
}

impl fmt::Display for CacheEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheEventKind::Hit => "hit",
            CacheEventKind::Miss => "miss",
            CacheEventKind::Set => "set",
            CacheEventKind::Delete => "delete",
            CacheEventKind::Clear => "clear",
        };
        f.write_str(name)
    }
}

// == Cache Event ==
/// Notification emitted after a cache operation completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    /// Canonical string key, `"all"` for `clear`
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub scope: Option<String>,
}

impl CacheEvent {
    pub fn new(kind: CacheEventKind, key: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            timestamp: Utc::now(),
            scope,
        }
    }
}

/// Callback invoked synchronously for events of one kind.
pub type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

// == Event Bus ==
/// Listener registry plus a broadcast channel for multi-consumer observers.
pub struct EventBus {
    listeners: RwLock<HashMap<CacheEventKind, Listener>>,
    sender: broadcast::Sender<CacheEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().keys().collect::<Vec<_>>())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            listeners: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Registers `listener` for `kind`, returning the listener it replaced.
    pub fn on<F>(&self, kind: CacheEventKind, listener: F) -> Option<Listener>
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.listeners.write().insert(kind, Arc::new(listener))
    }

    /// Removes the listener for `kind`. Returns whether one was registered.
    pub fn off(&self, kind: CacheEventKind) -> bool {
        self.listeners.write().remove(&kind).is_some()
    }

    /// Receives every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    /// Drops all registered listeners.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    // == Emit ==
    /// Delivers `event` to the listener for its kind and to subscribers.
    ///
    /// A panicking listener is logged and otherwise ignored.
    pub fn emit(&self, event: CacheEvent) {
        let listener = self.listeners.read().get(&event.kind).cloned();

        if let Some(listener) = listener {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                error!(kind = %event.kind, key = %event.key, "cache event listener panicked");
            }
        }

        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}
