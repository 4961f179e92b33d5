//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Namespaces whose change notifications invalidate the cache by default.
pub const DEFAULT_WATCHED_NAMESPACES: &[&str] = &[
    "products",
    "data_points",
    "sales",
    "inventory_snapshots",
    "alerts",
    "demand_predictions",
    "pricing_strategies",
    "suppliers",
    "purchase_orders",
    "weather_snapshots",
    "profiles",
];

/// Endpoint families whose cached GET responses are dropped after a mutation.
pub const DEFAULT_ENDPOINT_FAMILIES: &[&str] = &[
    "/api/agents/",
    "/api/analytics",
    "/api/alerts",
    "/api/forecasting",
    "/api/suppliers",
    "/api/store-status",
];

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default TTL for entries stored without an explicit TTL
    pub default_ttl: Duration,
    /// Live entry count above which the oldest entries are evicted
    pub max_size: usize,
    /// Interval between periodic expiry sweeps
    pub cleanup_interval: Duration,
    /// Whether performance metrics are maintained
    pub enable_metrics: bool,
    /// Path of the file-backed entry store, in-memory when unset
    pub store_path: Option<PathBuf>,
    /// HTTP port of the admin API
    pub server_port: u16,
    /// Namespaces subscribed on the change feed
    pub watched_namespaces: Vec<String>,
    /// Base URL prepended to relative request endpoints
    pub api_base_url: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CACHE_MAX_SIZE` - Maximum live entries (default: 1000)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Sweep frequency in milliseconds (default: 60000)
    /// - `CACHE_ENABLE_METRICS` - Maintain performance metrics (default: true)
    /// - `CACHE_STORE_PATH` - JSON store file (default: unset, in-memory)
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    /// - `CACHE_WATCHED_NAMESPACES` - Comma separated namespaces
    /// - `API_BASE_URL` - Base URL for the request cache (default: empty)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_ttl: parse_env::<u64>("CACHE_DEFAULT_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_ttl),
            max_size: parse_env("CACHE_MAX_SIZE").unwrap_or(defaults.max_size),
            cleanup_interval: parse_env::<u64>("CACHE_CLEANUP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cleanup_interval),
            enable_metrics: parse_env("CACHE_ENABLE_METRICS").unwrap_or(defaults.enable_metrics),
            store_path: env::var("CACHE_STORE_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
            watched_namespaces: env::var("CACHE_WATCHED_NAMESPACES")
                .ok()
                .map(|v| split_list(&v))
                .filter(|list| !list.is_empty())
                .unwrap_or(defaults.watched_namespaces),
            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),
            max_size: 1000,
            cleanup_interval: Duration::from_secs(60),
            enable_metrics: true,
            store_path: None,
            server_port: 3000,
            watched_namespaces: DEFAULT_WATCHED_NAMESPACES
                .iter()
                .map(|ns| ns.to_string())
                .collect(),
            api_base_url: String::new(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.cleanup_interval, Duration::from_secs(60));
        assert!(config.enable_metrics);
        assert!(config.store_path.is_none());
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.watched_namespaces.len(), 11);
        assert!(config.watched_namespaces.contains(&"alerts".to_string()));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_DEFAULT_TTL_MS");
        env::remove_var("CACHE_MAX_SIZE");
        env::remove_var("CACHE_CLEANUP_INTERVAL_MS");
        env::remove_var("CACHE_STORE_PATH");
        env::remove_var("CACHE_WATCHED_NAMESPACES");

        let config = Config::from_env();
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.cleanup_interval, Duration::from_secs(60));
        assert!(config.store_path.is_none());
    }

    #[test]
    fn test_split_list_skips_blanks() {
        assert_eq!(
            split_list(" products, ,alerts ,"),
            vec!["products".to_string(), "alerts".to_string()]
        );
        assert!(split_list(" , ").is_empty());
    }
}
