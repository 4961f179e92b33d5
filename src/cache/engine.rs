//! Cache Engine Module
//!
//! TTL-bounded cache over an [`EntryStore`] with FIFO size eviction,
//! hit/miss accounting, performance metrics and event emission.
//!
//! Storage failures never escape this module: lookups degrade to misses and
//! writes are logged and dropped, since the cache only ever sits in front
//! of an authoritative source.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheEntry, CacheEvent, CacheEventKind, CacheKey, CachePerformance, CacheStats, EventBus,
    StoredEntry, DEFAULT_VERSION,
};
use crate::config::Config;
use crate::error::{CacheError, EngineResult, StorageError, StorageResult};
use crate::storage::EntryStore;
use crate::tasks::spawn_sweep_task;

const STATS_META: &str = "stats";
const PERFORMANCE_META: &str = "performance";

// == Cache Config ==
/// Engine parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without one
    pub default_ttl: Duration,
    /// Live entry count the eviction pass settles to
    pub max_size: usize,
    /// Interval of the background expiry sweep
    pub cleanup_interval: Duration,
    /// Whether performance metrics are maintained
    pub enable_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),
            max_size: 1000,
            cleanup_interval: Duration::from_secs(60),
            enable_metrics: true,
        }
    }
}

impl From<&Config> for CacheConfig {
    fn from(config: &Config) -> Self {
        Self {
            default_ttl: config.default_ttl,
            max_size: config.max_size,
            cleanup_interval: config.cleanup_interval,
            enable_metrics: config.enable_metrics,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }
}

// == Options ==
/// Options for [`Cache::get`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Skip storage entirely and report absence
    pub force_refresh: bool,
}

impl GetOptions {
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// Options for [`Cache::set`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub version: Option<String>,
}

impl SetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            version: None,
        }
    }
}

/// Value returned by a fresh lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
    pub data: T,
    pub from_cache: bool,
    /// When the entry was written
    pub stored_at: DateTime<Utc>,
}

/// Pending outcome of [`Cache::peek`].
#[derive(Debug)]
pub struct Lookup<T> {
    key: String,
    outcome: Outcome<T>,
}

#[derive(Debug)]
enum Outcome<T> {
    Hit { result: CacheResult<T>, elapsed_ms: f64 },
    Miss { expired: bool },
    Bypassed,
}

impl<T> Lookup<T> {
    fn new(key: String, outcome: Outcome<T>) -> Self {
        Self { key, outcome }
    }

    /// Whether a fresh entry was found.
    pub fn is_hit(&self) -> bool {
        matches!(self.outcome, Outcome::Hit { .. })
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries removed because their TTL had elapsed
    pub expired: usize,
    /// Entries removed to bring the count down to `max_size`
    pub evicted: usize,
}

// == Cache ==
/// Cache engine. Shared as [`CacheHandle`] between the data access layer,
/// the request cache and the admin API.
pub struct Cache {
    store: Arc<dyn EntryStore>,
    config: CacheConfig,
    stats: Mutex<CacheStats>,
    performance: Mutex<CachePerformance>,
    events: EventBus,
    seq: AtomicU64,
    sweep_lock: tokio::sync::Mutex<()>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Shared handle to a cache instance.
pub type CacheHandle = Arc<Cache>;

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("stats", &*self.stats.lock())
            .finish_non_exhaustive()
    }
}

impl Cache {
    // == Constructor ==
    /// Creates an engine without a background sweep.
    ///
    /// Use [`Cache::open`] for the full lifecycle; this constructor suits
    /// callers that drive [`Cache::optimize`] themselves.
    pub fn new(store: Arc<dyn EntryStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            stats: Mutex::new(CacheStats::new()),
            performance: Mutex::new(CachePerformance::default()),
            events: EventBus::new(),
            seq: AtomicU64::new(0),
            sweep_lock: tokio::sync::Mutex::new(()),
            sweeper: Mutex::new(None),
        }
    }

    // == Open ==
    /// Opens an engine over `store`: restores the write sequence and the
    /// persisted stats, then starts the periodic sweep.
    pub async fn open(store: Arc<dyn EntryStore>, config: CacheConfig) -> CacheHandle {
        let cache = Arc::new(Self::new(store, config));
        cache.restore().await;

        let handle = spawn_sweep_task(Arc::downgrade(&cache), cache.config.cleanup_interval);
        *cache.sweeper.lock() = Some(handle);

        info!(
            max_size = cache.config.max_size,
            default_ttl_ms = cache.config.default_ttl.as_millis() as u64,
            "cache opened"
        );
        cache
    }

    async fn restore(&self) {
        match self.store.max_seq().await {
            Ok(max) => self.seq.store(max, Ordering::SeqCst),
            Err(e) => warn!(error = %e, "could not read write sequence"),
        }

        match self.load_meta::<CacheStats>(STATS_META).await {
            Ok(Some(stats)) => *self.stats.lock() = stats,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not restore cache stats"),
        }

        match self.store.count().await {
            Ok(count) => self.stats.lock().set_size(count),
            Err(e) => warn!(error = %e, "could not count cache entries"),
        }
    }

    async fn load_meta<T: DeserializeOwned>(&self, name: &str) -> StorageResult<Option<T>> {
        match self.store.load_meta(name).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    // == Close ==
    /// Stops the background sweep, flushes stats and drops listeners.
    pub async fn close(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.persist_stats().await;
        self.persist_performance().await;
        self.events.clear();
        info!("cache closed");
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Get ==
    /// Looks up `key`.
    ///
    /// Returns `Ok(None)` on a miss, on an expired entry (which is removed),
    /// when `force_refresh` is set, and when the store fails. Only a key
    /// that cannot be derived is an error.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        options: GetOptions,
    ) -> EngineResult<Option<CacheResult<T>>> {
        let lookup = self.peek(key, options).await?;
        Ok(self.commit_lookup(key, lookup).await)
    }

    // == Peek ==
    /// Looks up `key` without touching stats, events or storage.
    ///
    /// The returned [`Lookup`] has no effect until passed to
    /// [`Cache::commit_lookup`]; dropping it leaves the cache as if the
    /// lookup never happened.
    pub async fn peek<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        options: GetOptions,
    ) -> EngineResult<Lookup<T>> {
        let started = Instant::now();
        let key_string = key.generate_key()?;

        if options.force_refresh {
            debug!(key = %key_string, "force refresh requested");
            return Ok(Lookup::new(key_string, Outcome::Bypassed));
        }

        let entry = match self.store.get_by_key(&key_string).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key_string, error = %e, "cache read failed, treating as miss");
                None
            }
        };

        let Some(stored) = entry else {
            return Ok(Lookup::new(key_string, Outcome::Miss { expired: false }));
        };

        if stored.entry.is_expired() {
            return Ok(Lookup::new(key_string, Outcome::Miss { expired: true }));
        }

        let stored_at = stored.entry.stored_at;
        let outcome = match serde_json::from_value::<T>(stored.entry.data) {
            Ok(data) => Outcome::Hit {
                result: CacheResult {
                    data,
                    from_cache: true,
                    stored_at,
                },
                elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            },
            Err(e) => {
                warn!(key = %key_string, error = %e, "cached value has unexpected shape");
                Outcome::Miss { expired: false }
            }
        };
        Ok(Lookup::new(key_string, outcome))
    }

    /// Applies the effects of a lookup taken with [`Cache::peek`]: hit or
    /// miss accounting, the matching event, and removal of an expired entry.
    pub async fn commit_lookup<T>(
        &self,
        key: &CacheKey,
        lookup: Lookup<T>,
    ) -> Option<CacheResult<T>> {
        let Lookup { key: key_string, outcome } = lookup;

        match outcome {
            Outcome::Bypassed => None,
            Outcome::Miss { expired } => {
                if expired {
                    if let Err(e) = self.store.delete_by_key(&key_string).await {
                        warn!(key = %key_string, error = %e, "failed to drop expired entry");
                    }
                    debug!(key = %key_string, "cache entry expired");
                } else {
                    debug!(key = %key_string, "cache miss");
                }
                self.record_miss(&key_string, key);
                None
            }
            Outcome::Hit { result, elapsed_ms } => {
                self.record_hit(&key_string, key, elapsed_ms);
                debug!(key = %key_string, elapsed_ms, "cache hit");
                Some(result)
            }
        }
    }

    fn record_miss(&self, key_string: &str, key: &CacheKey) {
        {
            let mut stats = self.stats.lock();
            stats.record_miss();
            if self.config.enable_metrics {
                self.performance.lock().refresh_from(&stats);
            }
        }
        self.emit(CacheEventKind::Miss, key_string, key.scope.clone());
    }

    fn record_hit(&self, key_string: &str, key: &CacheKey, elapsed_ms: f64) {
        {
            let mut stats = self.stats.lock();
            stats.record_hit();
            if self.config.enable_metrics {
                let mut performance = self.performance.lock();
                performance.record_response(elapsed_ms, stats.lookups());
                performance.refresh_from(&stats);
            }
        }
        self.emit(CacheEventKind::Hit, key_string, key.scope.clone());
    }

    // == Set ==
    /// Stores `data` under `key`, fully replacing any previous entry.
    ///
    /// The size check that follows is not atomic with the write; concurrent
    /// writers may leave the cache above `max_size` until the next check.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        data: &T,
        options: SetOptions,
    ) -> EngineResult<()> {
        let key_string = key.generate_key()?;
        let value = serde_json::to_value(data).map_err(CacheError::Encode)?;

        let ttl = options.ttl.unwrap_or(self.config.default_ttl);
        let version = options
            .version
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        let stored = StoredEntry {
            key: key_string.clone(),
            namespace: key.namespace.clone(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            entry: CacheEntry::new(value, ttl, version),
        };

        if let Err(e) = self.store.put_by_key(stored).await {
            warn!(key = %key_string, error = %e, "cache write failed");
            return Ok(());
        }

        debug!(key = %key_string, ttl_ms = ttl.as_millis() as u64, "cache set");
        self.emit(CacheEventKind::Set, &key_string, key.scope.clone());

        if let Err(e) = self.enforce_size_bound().await {
            warn!(error = %e, "size check after set failed");
        }
        Ok(())
    }

    // == Delete ==
    /// Removes `key`. The `delete` event is emitted whether or not an entry
    /// existed.
    pub async fn delete(&self, key: &CacheKey) -> EngineResult<()> {
        let key_string = key.generate_key()?;

        match self.store.delete_by_key(&key_string).await {
            Ok(removed) => debug!(key = %key_string, removed, "cache delete"),
            Err(e) => warn!(key = %key_string, error = %e, "cache delete failed"),
        }

        self.emit(CacheEventKind::Delete, &key_string, key.scope.clone());
        Ok(())
    }

    // == Invalidate ==
    /// Removes every entry whose key contains `pattern` as a substring.
    ///
    /// Returns the number of entries removed, zero if the store failed.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        match self.try_invalidate(pattern).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(pattern, removed, "cache entries invalidated");
                }
                removed
            }
            Err(e) => {
                warn!(pattern, error = %e, "cache invalidation failed");
                0
            }
        }
    }

    async fn try_invalidate(&self, pattern: &str) -> StorageResult<usize> {
        let matching: Vec<String> = self
            .store
            .keys()
            .await?
            .into_iter()
            .filter(|key| key.contains(pattern))
            .collect();

        if matching.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete_many(&matching).await?;
        self.refresh_size().await?;
        Ok(removed)
    }

    // == Clear ==
    /// Removes every entry and resets hits, misses and size.
    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "cache clear failed");
        }

        self.stats.lock().reset();
        info!("cache cleared");
        self.emit(CacheEventKind::Clear, "all", None);
        self.persist_stats().await;
    }

    // == Has ==
    /// Equivalent to `get(key).is_some()`, including its hit/miss accounting.
    pub async fn has(&self, key: &CacheKey) -> EngineResult<bool> {
        Ok(self
            .get::<serde_json::Value>(key, GetOptions::default())
            .await?
            .is_some())
    }

    // == Get Keys ==
    /// All stored keys. Expired entries stay listed until read or swept.
    pub async fn get_keys(&self) -> Vec<String> {
        match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "listing cache keys failed");
                Vec::new()
            }
        }
    }

    /// Entry count per namespace, empty if the store failed.
    pub async fn namespace_counts(&self) -> BTreeMap<String, usize> {
        match self.store.namespace_counts().await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "namespace counts unavailable");
                BTreeMap::new()
            }
        }
    }

    // == Sweep ==
    /// Runs a sweep unless one is already in flight, in which case the
    /// request is dropped and `None` returned.
    pub async fn sweep(&self) -> Option<SweepReport> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            debug!("sweep already in flight, tick dropped");
            return None;
        };
        Some(self.run_sweep().await)
    }

    // == Optimize ==
    /// Sweeps immediately, waiting for any in-flight sweep to finish first.
    pub async fn optimize(&self) -> SweepReport {
        let report = {
            let _guard = self.sweep_lock.lock().await;
            self.run_sweep().await
        };

        self.performance.lock().last_optimization = Utc::now();
        self.persist_performance().await;
        info!(
            expired = report.expired,
            evicted = report.evicted,
            "cache optimization completed"
        );
        report
    }

    /// Expiry pass in insertion order, then the size bound.
    async fn run_sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.remove_expired().await {
            Ok(expired) => report.expired = expired,
            Err(e) => warn!(error = %e, "expiry sweep failed"),
        }
        self.stats.lock().last_cleanup = Utc::now();

        match self.enforce_size_bound().await {
            Ok(evicted) => report.evicted = evicted,
            Err(e) => warn!(error = %e, "size check after sweep failed"),
        }

        if report.expired > 0 {
            info!(expired = report.expired, "cache cleanup removed expired entries");
        }
        self.persist_stats().await;
        report
    }

    async fn remove_expired(&self) -> StorageResult<usize> {
        let now = Utc::now();
        let expired: Vec<String> = self
            .store
            .scan_all()
            .await?
            .into_iter()
            .filter(|stored| stored.entry.is_expired_at(now))
            .map(|stored| stored.key)
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }
        self.store.delete_many(&expired).await
    }

    // == Size Bound ==
    /// Evicts the oldest entries by `stored_at` until at most `max_size`
    /// remain. Returns the number evicted.
    async fn enforce_size_bound(&self) -> StorageResult<usize> {
        let count = self.store.count().await?;
        self.stats.lock().set_size(count);

        if count <= self.config.max_size {
            return Ok(0);
        }

        let victims = self.store.oldest_keys(count - self.config.max_size).await?;
        let evicted = self.store.delete_many(&victims).await?;
        self.stats.lock().set_size(count.saturating_sub(evicted));
        debug!(evicted, "evicted oldest entries over max size");
        Ok(evicted)
    }

    async fn refresh_size(&self) -> StorageResult<()> {
        let count = self.store.count().await?;
        self.stats.lock().set_size(count);
        Ok(())
    }

    // == Metadata Persistence ==
    async fn persist_stats(&self) {
        let stats = self.stats();
        if let Err(e) = self.save_meta(STATS_META, &stats).await {
            warn!(error = %e, "persisting cache stats failed");
        }
    }

    async fn persist_performance(&self) {
        let performance = self.performance();
        if let Err(e) = self.save_meta(PERFORMANCE_META, &performance).await {
            warn!(error = %e, "persisting cache performance failed");
        }
    }

    async fn save_meta<T: Serialize>(&self, name: &str, value: &T) -> StorageResult<()> {
        let value = serde_json::to_value(value).map_err(StorageError::Serialization)?;
        self.store.save_meta(name, value).await
    }

    // == Accessors ==
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    pub fn performance(&self) -> CachePerformance {
        self.performance.lock().clone()
    }

    // == Events ==
    /// Registers the listener for `kind`, replacing any earlier one.
    pub fn on<F>(&self, kind: CacheEventKind, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        if self.events.on(kind, listener).is_some() {
            debug!(%kind, "replaced cache event listener");
        }
    }

    /// Removes the listener for `kind`.
    pub fn off(&self, kind: CacheEventKind) {
        self.events.off(kind);
    }

    /// Receiver for every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn emit(&self, kind: CacheEventKind, key: &str, scope: Option<String>) {
        self.events.emit(CacheEvent::new(kind, key, scope));
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}
