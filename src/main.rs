//! Tablecache admin server
//!
//! Opens the cache over the configured entry store, attaches the data
//! access layer and the request cache to it, and serves the admin API
//! until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tablecache::api::{create_router, AppState};
use tablecache::data::{InMemoryChangeFeed, MemorySource};
use tablecache::request::{HttpTransport, RequestCacheConfig};
use tablecache::{
    Cache, CacheConfig, CacheHandle, Config, DataService, EntryStore, FileStore, MemoryStore,
    RequestCache,
};

/// Timeout of a single request made through the request cache.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the entry store and the cache (starts the expiry sweep)
/// 4. Attach the data service (watching the configured namespaces) and the
///    request cache
/// 5. Serve the admin router on the configured port
/// 6. On SIGINT/SIGTERM stop serving, stop watching and close the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablecache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tablecache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_size={}, default_ttl={}ms, port={}, cleanup_interval={}ms",
        config.max_size,
        config.default_ttl.as_millis(),
        config.server_port,
        config.cleanup_interval.as_millis()
    );

    let store: Arc<dyn EntryStore> = match &config.store_path {
        Some(path) => Arc::new(
            FileStore::open(path)
                .await
                .with_context(|| format!("opening entry store at {}", path.display()))?,
        ),
        None => {
            warn!("CACHE_STORE_PATH not set, entries will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let cache = Cache::open(store, CacheConfig::from(&config)).await;

    let feed = Arc::new(InMemoryChangeFeed::new());
    let source = Arc::new(MemorySource::new().with_feed(feed.clone()));
    let data = DataService::new(source, cache.clone());
    data.watch(feed, &config.watched_namespaces).await;

    let transport = HttpTransport::new(REQUEST_TIMEOUT).context("building HTTP transport")?;
    let requests = RequestCache::new(
        cache.clone(),
        Arc::new(transport),
        RequestCacheConfig::from(&config),
    );
    info!(
        base_url = %requests.config().base_url,
        families = requests.config().endpoint_families.len(),
        "request cache ready"
    );

    let app = create_router(AppState::new(cache.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cache, data))
        .await
        .context("serving admin API")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then stops the change-feed subscriptions
/// and closes the cache so stats are flushed.
async fn shutdown_signal(cache: CacheHandle, data: DataService) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    data.unwatch();
    cache.close().await;
}
