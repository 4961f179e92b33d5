//! Data Service Module
//!
//! Cache-aside reads and invalidate-on-write mutations over a [`Source`],
//! with change-feed driven invalidation for writes made elsewhere.
//!
//! Reads derive a `select` key from the namespace, filters and current
//! scope. Mutations always reach the source before the cache is touched,
//! so a failed write never invalidates anything.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheHandle, CacheKey, CachePerformance, CacheStats, Filters, GetOptions, SetOptions,
    SweepReport,
};
use crate::data::cancel::{CancelToken, Fetch};
use crate::data::feed::ChangeFeed;
use crate::data::source::{SelectOptions, SortDirection, Source, SourceResult};
use crate::data::table::Table;
use crate::error::{DataError, DataResult};
use crate::models::Record;

// == Options ==
/// Options for reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Paging and ordering forwarded to the source
    pub select: SelectOptions,
    /// Bypass the cached entry and refetch
    pub force_refresh: bool,
    /// TTL of the written-back entry; the cache default when unset
    pub ttl: Option<Duration>,
    pub version: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_select(mut self, select: SelectOptions) -> Self {
        self.select = select;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    fn set_options(&self) -> SetOptions {
        SetOptions {
            ttl: self.ttl,
            version: self.version.clone(),
        }
    }
}

/// Options for mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOptions {
    /// Invalidate every cached entry of the namespace after a successful write
    pub invalidate_cache: bool,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            invalidate_cache: true,
        }
    }
}

impl MutationOptions {
    /// Leaves the cache untouched after the write.
    pub fn keep_cache() -> Self {
        Self {
            invalidate_cache: false,
        }
    }
}

// == Data Service ==
pub struct DataService {
    source: Arc<dyn Source>,
    cache: CacheHandle,
    scope: RwLock<Option<String>>,
    /// Latest outstanding fetch per derived key
    inflight: Mutex<HashMap<String, CancelToken>>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for DataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataService")
            .field("scope", &*self.scope.read())
            .field("inflight", &self.inflight.lock().len())
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish_non_exhaustive()
    }
}

impl DataService {
    pub fn new(source: Arc<dyn Source>, cache: CacheHandle) -> Self {
        Self {
            source,
            cache,
            scope: RwLock::new(None),
            inflight: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    // == Scope ==
    /// Sets the scope folded into every read key, typically the user id.
    pub fn set_scope(&self, scope: Option<String>) {
        *self.scope.write() = scope;
    }

    pub fn scope(&self) -> Option<String> {
        self.scope.read().clone()
    }

    // == Typed Tables ==
    /// Typed handle over `namespace`.
    pub fn table<T>(&self, namespace: impl Into<String>) -> Table<'_, T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        Table::new(self, namespace.into())
    }

    /// Typed handle over the namespace a record type lives in.
    pub fn table_for<R: Record>(&self) -> Table<'_, R> {
        Table::new(self, R::NAMESPACE.to_string())
    }

    // == Keys ==
    fn query_key(
        &self,
        namespace: &str,
        filters: Option<&Filters>,
        select: &SelectOptions,
    ) -> CacheKey {
        let mut key_filters = filters.cloned();

        if !select.is_default() {
            let folded = key_filters.get_or_insert_with(Filters::new);
            if let Some(limit) = select.limit {
                folded.insert("$limit".to_string(), Value::from(limit));
            }
            if let Some(offset) = select.offset {
                folded.insert("$offset".to_string(), Value::from(offset));
            }
            if let Some(order) = &select.order_by {
                let direction = match order.direction {
                    SortDirection::Asc => "asc",
                    SortDirection::Desc => "desc",
                };
                folded.insert(
                    "$order".to_string(),
                    Value::from(format!("{}.{}", order.column, direction)),
                );
            }
        }

        let key = CacheKey::select(namespace).with_scope(self.scope());
        match key_filters {
            Some(filters) => key.with_filters(filters),
            None => key,
        }
    }

    fn id_key(&self, namespace: &str, id: &str) -> CacheKey {
        CacheKey::select(namespace)
            .with_filter("id", id)
            .with_scope(self.scope())
    }

    // == Read Through ==
    /// Cache-aside lookup shared by every read.
    ///
    /// `fetch` yields `None` when the source has no such record; that
    /// outcome is returned as absence and never cached. A cancelled token
    /// skips the cache entirely when seen up front, and discards the fetched
    /// value when it fires while the source call is outstanding. A cancelled
    /// read leaves stats and events untouched: the miss of a tokenised read
    /// is only committed once its fetch has run to completion.
    async fn read_through<T, F>(
        &self,
        key: CacheKey,
        options: &QueryOptions,
        token: Option<&CancelToken>,
        fetch: F,
    ) -> DataResult<Fetch<Option<T>>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: Future<Output = SourceResult<Option<Value>>> + Send,
    {
        if token.is_some_and(CancelToken::is_cancelled) {
            return Ok(Fetch::Cancelled);
        }

        let get_options = GetOptions {
            force_refresh: options.force_refresh,
        };
        let lookup = self.cache.peek::<T>(&key, get_options).await?;
        let pending = if token.is_some() && !lookup.is_hit() {
            Some(lookup)
        } else {
            if let Some(hit) = self.cache.commit_lookup(&key, lookup).await {
                return Ok(Fetch::Ready(Some(hit.data)));
            }
            None
        };

        let fetched = match token {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(namespace = %key.namespace, "fetch cancelled while in flight");
                        return Ok(Fetch::Cancelled);
                    }
                    result = fetch => result,
                }
            }
            None => fetch.await,
        };

        if token.is_some_and(CancelToken::is_cancelled) {
            return Ok(Fetch::Cancelled);
        }
        if let Some(lookup) = pending {
            self.cache.commit_lookup(&key, lookup).await;
        }

        let Some(value) = fetched? else {
            return Ok(Fetch::Ready(None));
        };
        let data: T = serde_json::from_value(value)?;

        self.cache.set(&key, &data, options.set_options()).await?;
        Ok(Fetch::Ready(Some(data)))
    }

    /// Runs `read` under a fresh token for `key`, cancelling the previous
    /// outstanding fetch of the same key.
    async fn latest<T, F, Fut>(&self, key: &CacheKey, read: F) -> DataResult<Fetch<T>>
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = DataResult<Fetch<T>>>,
    {
        let key_string = key.generate_key()?;
        let token = CancelToken::new();

        if let Some(previous) = self.inflight.lock().insert(key_string.clone(), token.clone()) {
            debug!(key = %key_string, "superseding in-flight fetch");
            previous.cancel();
        }

        let result = read(token.clone()).await;

        let mut inflight = self.inflight.lock();
        if inflight.get(&key_string).is_some_and(|current| current.same_as(&token)) {
            inflight.remove(&key_string);
        }
        result
    }

    // == Query ==
    /// Rows of `namespace` matching `filters`, served from cache when fresh.
    pub async fn query<T>(
        &self,
        namespace: &str,
        filters: Option<Filters>,
        options: &QueryOptions,
    ) -> DataResult<Vec<T>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let rows = self.query_with(namespace, filters, options, None).await?;
        Ok(rows.ready().unwrap_or_default())
    }

    /// As [`DataService::query`], abandoning the read once `token` fires.
    pub async fn query_cancellable<T>(
        &self,
        namespace: &str,
        filters: Option<Filters>,
        options: &QueryOptions,
        token: &CancelToken,
    ) -> DataResult<Fetch<Vec<T>>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        self.query_with(namespace, filters, options, Some(token)).await
    }

    /// As [`DataService::query`], cancelling any earlier outstanding query
    /// that derives the same key.
    pub async fn query_latest<T>(
        &self,
        namespace: &str,
        filters: Option<Filters>,
        options: &QueryOptions,
    ) -> DataResult<Fetch<Vec<T>>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let key = self.query_key(namespace, filters.as_ref(), &options.select);
        self.latest(&key, |token| async move {
            self.query_with(namespace, filters, options, Some(&token)).await
        })
        .await
    }

    async fn query_with<T>(
        &self,
        namespace: &str,
        filters: Option<Filters>,
        options: &QueryOptions,
        token: Option<&CancelToken>,
    ) -> DataResult<Fetch<Vec<T>>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let key = self.query_key(namespace, filters.as_ref(), &options.select);
        let source_filters = filters.unwrap_or_default();
        let fetch = async {
            self.source
                .select(namespace, &source_filters, &options.select)
                .await
                .map(|rows| Some(Value::Array(rows)))
        };

        let rows = self.read_through::<Vec<T>, _>(key, options, token, fetch).await?;
        Ok(rows.map(Option::unwrap_or_default))
    }

    // == Get By Id ==
    /// The row with `id`, or `None` if the source has no such row.
    pub async fn get_by_id<T>(
        &self,
        namespace: &str,
        id: &str,
        options: &QueryOptions,
    ) -> DataResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let row = self.get_by_id_with(namespace, id, options, None).await?;
        Ok(row.ready().flatten())
    }

    pub async fn get_by_id_cancellable<T>(
        &self,
        namespace: &str,
        id: &str,
        options: &QueryOptions,
        token: &CancelToken,
    ) -> DataResult<Fetch<Option<T>>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        self.get_by_id_with(namespace, id, options, Some(token)).await
    }

    pub async fn get_by_id_latest<T>(
        &self,
        namespace: &str,
        id: &str,
        options: &QueryOptions,
    ) -> DataResult<Fetch<Option<T>>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let key = self.id_key(namespace, id);
        self.latest(&key, |token| async move {
            self.get_by_id_with(namespace, id, options, Some(&token)).await
        })
        .await
    }

    async fn get_by_id_with<T>(
        &self,
        namespace: &str,
        id: &str,
        options: &QueryOptions,
        token: Option<&CancelToken>,
    ) -> DataResult<Fetch<Option<T>>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let key = self.id_key(namespace, id);
        let fetch = self.source.select_by_id(namespace, id);
        self.read_through(key, options, token, fetch).await
    }

    // == Mutations ==
    pub async fn insert<T>(
        &self,
        namespace: &str,
        record: &T,
        options: MutationOptions,
    ) -> DataResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let value = serde_json::to_value(record).map_err(DataError::Encode)?;
        let stored = self.source.insert(namespace, value).await?;
        self.after_write(namespace, "insert", options).await;
        Ok(serde_json::from_value(stored)?)
    }

    /// Applies `patch` to the row with `id` and returns the updated row.
    pub async fn update<T, P>(
        &self,
        namespace: &str,
        id: &str,
        patch: &P,
        options: MutationOptions,
    ) -> DataResult<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let patch = serde_json::to_value(patch).map_err(DataError::Encode)?;
        let stored = self.source.update(namespace, id, patch).await?;
        self.after_write(namespace, "update", options).await;
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn delete(
        &self,
        namespace: &str,
        id: &str,
        options: MutationOptions,
    ) -> DataResult<()> {
        self.source.delete(namespace, id).await?;
        self.after_write(namespace, "delete", options).await;
        Ok(())
    }

    pub async fn upsert<T>(
        &self,
        namespace: &str,
        record: &T,
        options: MutationOptions,
    ) -> DataResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let value = serde_json::to_value(record).map_err(DataError::Encode)?;
        let stored = self.source.upsert(namespace, value).await?;
        self.after_write(namespace, "upsert", options).await;
        Ok(serde_json::from_value(stored)?)
    }

    async fn after_write(&self, namespace: &str, operation: &str, options: MutationOptions) {
        if !options.invalidate_cache {
            return;
        }
        let removed = self.cache.invalidate(namespace).await;
        debug!(namespace, operation, removed, "namespace invalidated after write");
    }

    // == Change Feed ==
    /// Subscribes to `feed` for each namespace and invalidates that
    /// namespace on every notification, whoever made the change.
    ///
    /// Returns the number of subscriptions opened. A namespace whose
    /// subscription fails is logged and skipped.
    pub async fn watch<S: AsRef<str>>(
        &self,
        feed: Arc<dyn ChangeFeed>,
        namespaces: &[S],
    ) -> usize {
        let mut opened = 0;

        for namespace in namespaces {
            let namespace = namespace.as_ref().to_string();
            let mut stream = match feed.subscribe(&namespace).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "change feed subscription failed");
                    continue;
                }
            };

            let cache = Arc::clone(&self.cache);
            let handle = tokio::spawn(async move {
                while let Some(event) = stream.recv().await {
                    let removed = cache.invalidate(&namespace).await;
                    debug!(
                        namespace = %namespace,
                        kind = ?event.kind,
                        removed,
                        "invalidated on change notification"
                    );
                }
                debug!(namespace = %namespace, "change stream closed");
            });

            self.subscriptions.lock().push(handle);
            opened += 1;
        }

        info!(subscriptions = opened, "watching change feed");
        opened
    }

    /// Stops every change-feed subscription.
    pub fn unwatch(&self) {
        let handles: Vec<JoinHandle<()>> = self.subscriptions.lock().drain(..).collect();
        for handle in &handles {
            handle.abort();
        }
        if !handles.is_empty() {
            info!(subscriptions = handles.len(), "change feed subscriptions stopped");
        }
    }

    // == Cache Pass-Throughs ==
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub async fn optimize_cache(&self) -> SweepReport {
        self.cache.optimize().await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_performance(&self) -> CachePerformance {
        self.cache.performance()
    }
}

impl Drop for DataService {
    fn drop(&mut self) {
        for handle in self.subscriptions.get_mut().drain(..) {
            handle.abort();
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, CacheConfig};
    use crate::data::memory_source::MemorySource;
    use crate::error::SourceError;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn setup() -> (Arc<MemorySource>, DataService) {
        let source = Arc::new(MemorySource::new());
        source.seed(
            "products",
            vec![
                json!({"id": "P1", "name": "Milk", "stock": 5}),
                json!({"id": "P2", "name": "Bread", "stock": 0}),
            ],
        );
        let cache = Arc::new(Cache::new(Arc::new(MemoryStore::new()), CacheConfig::new()));
        let service = DataService::new(source.clone(), cache);
        (source, service)
    }

    #[tokio::test]
    async fn test_query_is_served_from_cache_second_time() {
        let (source, service) = setup();

        let options = QueryOptions::new();
        let first: Vec<Value> = service.query("products", None, &options).await.unwrap();
        let second: Vec<Value> = service.query("products", None, &options).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.call_count(), 1);
        assert_eq!(service.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_query_key_carries_scope() {
        let (_, service) = setup();
        service.set_scope(Some("user-1".to_string()));

        let _: Vec<Value> = service.query("products", None, &QueryOptions::new()).await.unwrap();

        let keys = service.cache().get_keys().await;
        assert_eq!(keys, vec!["products:select:scope:user-1:".to_string()]);
    }

    #[tokio::test]
    async fn test_paged_queries_use_distinct_keys() {
        let (source, service) = setup();
        let paged = QueryOptions::new().with_select(SelectOptions::default().with_limit(1));

        let all: Vec<Value> = service.query("products", None, &QueryOptions::new()).await.unwrap();
        let page: Vec<Value> = service.query("products", None, &paged).await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(page.len(), 1);
        assert_eq!(source.call_count(), 2);
        assert!(service
            .cache()
            .get_keys()
            .await
            .contains(&r#"products:select::{"$limit":1}"#.to_string()));
    }

    #[tokio::test]
    async fn test_get_by_id_not_found_is_absent_and_uncached() {
        let (_, service) = setup();

        let row: Option<Value> = service
            .get_by_id("products", "P9", &QueryOptions::new())
            .await
            .unwrap();

        assert!(row.is_none());
        assert!(service.cache().get_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_source_error_propagates_and_is_not_cached() {
        let (source, service) = setup();
        source.fail_with(Some(SourceError::Unavailable("down".to_string())));

        let result: DataResult<Vec<Value>> =
            service.query("products", None, &QueryOptions::new()).await;
        assert!(matches!(result, Err(DataError::Source(_))));
        assert!(service.cache().get_keys().await.is_empty());

        source.fail_with(None);
        let rows: Vec<Value> = service.query("products", None, &QueryOptions::new()).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_intact() {
        let (_, service) = setup();
        let _: Vec<Value> = service.query("products", None, &QueryOptions::new()).await.unwrap();

        let result: DataResult<Value> = service
            .insert("products", &json!({"id": "P1"}), MutationOptions::default())
            .await;

        assert!(result.is_err());
        assert_eq!(service.cache().get_keys().await.len(), 1);
    }

    #[tokio::test]
    async fn test_write_without_invalidation() {
        let (_, service) = setup();
        let _: Vec<Value> = service.query("products", None, &QueryOptions::new()).await.unwrap();

        let _: Value = service
            .insert("products", &json!({"id": "P3"}), MutationOptions::keep_cache())
            .await
            .unwrap();

        let rows: Vec<Value> = service.query("products", None, &QueryOptions::new()).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_invalidate_namespace() {
        let (_, service) = setup();
        let opts = QueryOptions::new();
        let _: Option<Value> = service.get_by_id("products", "P1", &opts).await.unwrap();

        let updated: Value = service
            .update("products", "P1", &json!({"stock": 9}), MutationOptions::default())
            .await
            .unwrap();
        assert_eq!(updated["stock"], json!(9));

        let row: Option<Value> = service.get_by_id("products", "P1", &opts).await.unwrap();
        assert_eq!(row.unwrap()["stock"], json!(9));

        service
            .delete("products", "P1", MutationOptions::default())
            .await
            .unwrap();
        let row: Option<Value> = service.get_by_id("products", "P1", &opts).await.unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_cache_and_source() {
        let (source, service) = setup();
        let token = CancelToken::new();
        token.cancel();

        let fetch: Fetch<Vec<Value>> = service
            .query_cancellable("products", None, &QueryOptions::new(), &token)
            .await
            .unwrap();

        assert!(fetch.is_cancelled());
        assert_eq!(source.call_count(), 0);
        assert_eq!(service.cache_stats().lookups(), 0);
    }

    #[tokio::test]
    async fn test_force_refresh_refetches() {
        let (source, service) = setup();
        let _: Vec<Value> = service.query("products", None, &QueryOptions::new()).await.unwrap();

        let _: Vec<Value> = service
            .query("products", None, &QueryOptions::new().force_refresh())
            .await
            .unwrap();

        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_watch_configured_namespaces() {
        let (_, service) = setup();
        let feed = Arc::new(crate::data::feed::InMemoryChangeFeed::new());
        let config = crate::config::Config::default();

        let opened = service.watch(feed.clone(), &config.watched_namespaces).await;

        assert_eq!(opened, config.watched_namespaces.len());
        assert_eq!(feed.subscriber_count("products"), 1);
        assert_eq!(feed.subscriber_count("profiles"), 1);
    }

    #[tokio::test]
    async fn test_unwatch_stops_subscriptions() {
        let (_, service) = setup();
        let feed = Arc::new(crate::data::feed::InMemoryChangeFeed::new());

        let opened = service.watch(feed.clone(), &["products", "alerts"]).await;
        assert_eq!(opened, 2);

        service.unwatch();
        tokio::task::yield_now().await;
        assert!(format!("{:?}", service).contains("subscriptions: 0"));
    }
}
