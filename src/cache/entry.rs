//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version tag written when the caller does not supply one.
pub const DEFAULT_VERSION: &str = "1.0";

// == Cache Entry ==
/// A single cached value with its write time and lifetime.
///
/// `stored_at` is fixed at write time. Reads never renew it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The stored value
    pub data: T,
    /// Write timestamp
    pub stored_at: DateTime<Utc>,
    /// Lifetime in milliseconds
    pub ttl_ms: u64,
    /// Caller-supplied version tag
    pub version: String,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates an entry stamped with the current time.
    pub fn new(data: T, ttl: Duration, version: impl Into<String>) -> Self {
        Self {
            data,
            stored_at: Utc::now(),
            ttl_ms: duration_ms(ttl),
            version: version.into(),
        }
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once strictly more than `ttl` has elapsed since
    /// `stored_at`. At exactly `ttl` it is still fresh.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiry test against an explicit clock reading.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let elapsed_ms = (now - self.stored_at).num_milliseconds().max(0) as u64;
        elapsed_ms > self.ttl_ms
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        let elapsed_ms = (Utc::now() - self.stored_at).num_milliseconds().max(0) as u64;
        Duration::from_millis(self.ttl_ms.saturating_sub(elapsed_ms))
    }
}

// == Stored Entry ==
/// Type-erased entry as held by an entry store.
///
/// `seq` is a per-cache write counter that breaks `stored_at` ties so that
/// insertion order is total even when many writes share a millisecond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Canonical string key
    pub key: String,
    /// Namespace of the originating [`CacheKey`](super::CacheKey)
    pub namespace: String,
    /// Write sequence number
    pub seq: u64,
    /// The entry itself
    #[serde(flatten)]
    pub entry: CacheEntry<Value>,
}

impl StoredEntry {
    /// Position of this entry in insertion order.
    pub fn order(&self) -> (DateTime<Utc>, u64) {
        (self.entry.stored_at, self.seq)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new("test_value".to_string(), Duration::from_secs(60), "2.0");

        assert_eq!(entry.data, "test_value");
        assert_eq!(entry.ttl(), Duration::from_secs(60));
        assert_eq!(entry.version, "2.0");
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new("test_value", Duration::from_millis(200), DEFAULT_VERSION);

        assert!(!entry.is_expired());

        // Wait for expiration
        sleep(Duration::from_millis(300));

        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new("test", Duration::from_millis(1000), DEFAULT_VERSION);
        let at_ttl = entry.stored_at + ChronoDuration::milliseconds(1000);
        let past_ttl = entry.stored_at + ChronoDuration::milliseconds(1001);

        assert!(!entry.is_expired_at(at_ttl), "Entry is fresh at exactly ttl");
        assert!(entry.is_expired_at(past_ttl), "Entry is expired past ttl");
    }

    #[test]
    fn test_clock_behind_store_time_is_fresh() {
        let entry = CacheEntry::new("test", Duration::ZERO, DEFAULT_VERSION);
        let earlier = entry.stored_at - ChronoDuration::milliseconds(50);
        assert!(!entry.is_expired_at(earlier));
    }

    #[test]
    fn test_unbounded_ttl_never_expires() {
        let entry = CacheEntry::new("test", Duration::MAX, DEFAULT_VERSION);
        let far_future = entry.stored_at + ChronoDuration::days(365 * 100);

        assert_eq!(entry.ttl_ms, u64::MAX);
        assert!(!entry.is_expired());
        assert!(!entry.is_expired_at(far_future));

        let past_i64 = CacheEntry::new("test", Duration::from_millis(u64::MAX), DEFAULT_VERSION);
        assert!(!past_i64.is_expired());
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new("test_value", Duration::from_secs(10), DEFAULT_VERSION);

        let remaining = entry.ttl_remaining();
        assert!(remaining <= Duration::from_secs(10));
        assert!(remaining >= Duration::from_secs(9));
    }

    #[test]
    fn test_ttl_remaining_expired() {
        let entry = CacheEntry::new("test_value", Duration::from_millis(50), DEFAULT_VERSION);

        sleep(Duration::from_millis(100));

        assert_eq!(entry.ttl_remaining(), Duration::ZERO);
    }

    #[test]
    fn test_stored_entry_serializes_flat() {
        let stored = StoredEntry {
            key: "products:select:".to_string(),
            namespace: "products".to_string(),
            seq: 3,
            entry: CacheEntry::new(serde_json::json!([1, 2]), Duration::from_secs(1), "1.0"),
        };

        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["key"], "products:select:");
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["ttl_ms"], 1000);

        let back: StoredEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, stored);
    }
}
