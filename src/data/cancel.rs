//! Cancellation Module
//!
//! Cooperative cancellation for in-flight fetches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

// == Cancel Token ==
/// Shared flag a fetch checks before touching the cache.
///
/// Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token cancelled and wakes every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent cancel is not missed
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Whether both handles refer to the same token.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// == Fetch ==
/// Outcome of a cancellable read.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    /// The read completed
    Ready(T),
    /// The token was cancelled first; nothing was cached
    Cancelled,
}

impl<T> Fetch<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Fetch::Cancelled)
    }

    /// The value, or `None` if cancelled.
    pub fn ready(self) -> Option<T> {
        match self {
            Fetch::Ready(value) => Some(value),
            Fetch::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Fetch::Ready(value) => Fetch::Ready(f(value)),
            Fetch::Cancelled => Fetch::Cancelled,
        }
    }
}
