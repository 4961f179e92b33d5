//! Request Cache Module
//!
//! Cache-aside for network requests that do not map onto a single table,
//! such as report and analytics endpoints. Successful GET responses are
//! cached; a successful mutation drops cached GET responses of every
//! endpoint family the mutated endpoint belongs to.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{CacheHandle, CacheKey, CacheStats, GetOptions, SetOptions};
use crate::config::{Config, DEFAULT_ENDPOINT_FAMILIES};
use crate::error::RequestError;
use crate::request::hash::body_hash;
use crate::request::transport::{ApiRequest, HttpMethod, Transport};

/// Namespace of request-derived keys.
pub const REQUEST_NAMESPACE: &str = "req";

/// Substring shared by every derived request key once stored.
const REQUEST_KEY_MARKER: &str = "custom:req:";

// == Config ==
#[derive(Debug, Clone, PartialEq)]
pub struct RequestCacheConfig {
    /// Prepended to endpoints that are not absolute URLs
    pub base_url: String,
    /// TTL of cached GET responses when the request names none
    pub default_ttl: Duration,
    /// Endpoint prefixes used for invalidation after mutations
    pub endpoint_families: Vec<String>,
}

impl Default for RequestCacheConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            default_ttl: Duration::from_secs(5 * 60),
            endpoint_families: DEFAULT_ENDPOINT_FAMILIES
                .iter()
                .map(|family| family.to_string())
                .collect(),
        }
    }
}

impl From<&Config> for RequestCacheConfig {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}

// == Options ==
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub ttl: Option<Duration>,
    /// Extra headers sent with the request
    pub headers: BTreeMap<String, String>,
    /// Drop related cached GET responses after a successful mutation
    pub invalidate_on_success: bool,
    /// Explicit key replacing the derived one
    pub cache_key: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            headers: BTreeMap::new(),
            invalidate_on_success: true,
            cache_key: None,
        }
    }
}

impl RequestOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn without_invalidation(mut self) -> Self {
        self.invalidate_on_success = false;
        self
    }
}

/// Decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
    pub from_cache: bool,
}

// == Request Cache ==
pub struct RequestCache {
    cache: CacheHandle,
    transport: Arc<dyn Transport>,
    config: RequestCacheConfig,
}

impl std::fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RequestCache {
    pub fn new(
        cache: CacheHandle,
        transport: Arc<dyn Transport>,
        config: RequestCacheConfig,
    ) -> Self {
        Self {
            cache,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &RequestCacheConfig {
        &self.config
    }

    // == Verbs ==
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, RequestError> {
        self.request(HttpMethod::Get, endpoint, None, options).await
    }

    pub async fn post<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, RequestError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = encode_body(body)?;
        self.request(HttpMethod::Post, endpoint, body, options).await
    }

    pub async fn put<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, RequestError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = encode_body(body)?;
        self.request(HttpMethod::Put, endpoint, body, options).await
    }

    pub async fn patch<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, RequestError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = encode_body(body)?;
        self.request(HttpMethod::Patch, endpoint, body, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, RequestError> {
        self.request(HttpMethod::Delete, endpoint, None, options).await
    }

    // == Key Derivation ==
    /// `req:<METHOD>:<endpoint>`, followed by `:<body hash>` for a non-GET
    /// request that carries a body. An explicit cache key wins.
    pub fn request_key(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> CacheKey {
        if let Some(custom) = options.cache_key.as_deref().filter(|k| !k.is_empty()) {
            return CacheKey::custom(REQUEST_NAMESPACE, custom);
        }

        let mut key = format!("{}:{}:{}", REQUEST_NAMESPACE, method, endpoint);
        if method != HttpMethod::Get {
            if let Some(body) = body {
                key.push(':');
                key.push_str(&body_hash(&body.to_string()));
            }
        }
        CacheKey::custom(REQUEST_NAMESPACE, key)
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}{}", self.config.base_url, endpoint)
        }
    }

    // == Request ==
    async fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, RequestError> {
        let key = self.request_key(method, endpoint, body.as_ref(), &options);

        if method == HttpMethod::Get {
            if let Some(hit) = self.cache.get::<T>(&key, GetOptions::default()).await? {
                return Ok(ApiResponse {
                    data: hit.data,
                    status: 200,
                    from_cache: true,
                });
            }
        }

        let response = self
            .transport
            .send(ApiRequest {
                method,
                url: self.url_for(endpoint),
                headers: options.headers.clone(),
                body,
            })
            .await?;

        if !response.is_success() {
            debug!(%method, endpoint, status = response.status, "request failed");
            return Err(RequestError::Status {
                status: response.status,
                message: error_message(&response.body),
            });
        }

        let payload = unwrap_envelope(response.body);
        let data: T = serde_json::from_value(payload.clone())?;

        if method == HttpMethod::Get {
            let ttl = options.ttl.unwrap_or(self.config.default_ttl);
            self.cache
                .set(&key, &payload, SetOptions::with_ttl(ttl))
                .await?;
        } else if options.invalidate_on_success {
            self.invalidate_related(endpoint).await;
        }

        Ok(ApiResponse {
            data,
            status: response.status,
            from_cache: false,
        })
    }

    // == Invalidation ==
    /// Drops cached GET responses of every family `endpoint` belongs to.
    /// Returns the number of entries removed.
    pub async fn invalidate_related(&self, endpoint: &str) -> usize {
        let mut removed = 0;
        for family in &self.config.endpoint_families {
            if endpoint.contains(family.as_str()) {
                let pattern = format!("{}:{}:{}", REQUEST_NAMESPACE, HttpMethod::Get, family);
                removed += self.cache.invalidate(&pattern).await;
            }
        }
        debug!(endpoint, removed, "related request entries invalidated");
        removed
    }

    /// Drops every derived request entry. Entries stored under an explicit
    /// cache key are left alone.
    pub async fn clear(&self) -> usize {
        let removed = self.cache.invalidate(REQUEST_KEY_MARKER).await;
        info!(removed, "request cache cleared");
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn encode_body<B: Serialize + ?Sized>(body: Option<&B>) -> Result<Option<Value>, RequestError> {
    body.map(serde_json::to_value)
        .transpose()
        .map_err(RequestError::Encode)
}

/// Unwraps a `{ "data": ... }` envelope; any other body is the payload.
fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.get("data").is_some_and(|data| !data.is_null()) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn error_message(body: &Value) -> String {
    match body {
        Value::Object(map) => map
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string(),
        Value::String(text) if !text.is_empty() => text.clone(),
        _ => "request failed".to_string(),
    }
}
