//! Shipping service entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use external_services::{
    Cache, MemoryCache, MemoryShipmentStore, MemoryWebhookStore, ReqwestTransport,
    SharedRedisClient, ShipmentStore, TransportConfig, WebhookStore,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use reconciler::worker::{self, DEFAULT_QUEUE_CAPACITY};
use reconciler::Reconciler;
use shipping_service::{create_router, AppState, RateLimiter, ServiceConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracker::{providers, TrackerConfig, TrackingResolver};

/// How long shutdown waits for pending webhook retries.
const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Shipping service");

    let config = ServiceConfig::from_env()?;
    let tracker_config = TrackerConfig::from_env()?;

    info!("Configuration:");
    info!("  HTTP_PORT: {}", config.http_port);
    info!("  METRICS_PORT: {}", config.metrics_port);
    info!(
        "  REDIS_URL: {}",
        config.redis_url.as_deref().unwrap_or("(in-memory)")
    );
    info!("  SHIPPING_PROVIDERS: {}", tracker_config.providers.join(","));
    info!(
        "  SHIPPING_DEFAULT_PROVIDER: {}",
        tracker_config.default_provider.as_deref().unwrap_or("(none)")
    );
    info!(
        "  WEBHOOK_RATE_LIMIT_PER_MINUTE: {}",
        config.webhook_rate_limit_per_minute
    );
    info!(
        "  WEBHOOK_RETRY: {:?} x{}",
        config.webhook_retry_backoff, config.webhook_max_attempts
    );

    // Start Prometheus metrics server
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()?;
    info!("Prometheus metrics server started on port {}", config.metrics_port);

    // Cache and stores
    let mut memory_cache = None;
    let (cache, shipments, webhooks) = match &config.redis_url {
        Some(url) => {
            info!("Connecting to Redis at {}", url);
            let redis = Arc::new(SharedRedisClient::new(url)?);
            redis.get_connection().await?;
            info!("Connected to Redis");
            let cache: Arc<dyn Cache> = redis.clone();
            let shipments: Arc<dyn ShipmentStore> = redis.clone();
            let webhooks: Arc<dyn WebhookStore> = redis;
            (cache, shipments, webhooks)
        }
        None => {
            warn!("REDIS_URL not set, shipments and webhooks are kept in memory");
            let memory = Arc::new(MemoryCache::new());
            memory_cache = Some(memory.clone());
            let cache: Arc<dyn Cache> = memory;
            let shipments: Arc<dyn ShipmentStore> = Arc::new(MemoryShipmentStore::new());
            let webhooks: Arc<dyn WebhookStore> = Arc::new(MemoryWebhookStore::new());
            (cache, shipments, webhooks)
        }
    };

    // Connect carriers
    let transport = Arc::new(ReqwestTransport::new(TransportConfig {
        timeout: tracker_config.http_timeout,
        ..TransportConfig::default()
    })?);
    let registry = providers::connect_all(&tracker_config, transport, cache.clone()).await?;
    let resolver = TrackingResolver::new(Arc::new(registry), cache)
        .with_default_provider(tracker_config.default_provider.clone());

    // Spawn reconciliation worker
    let reconciler = Arc::new(Reconciler::with_defaults(shipments));
    let (queue, worker_handle) = worker::spawn(
        reconciler.clone(),
        config.retry_policy(),
        DEFAULT_QUEUE_CAPACITY,
    );

    let state = Arc::new(AppState {
        resolver,
        reconciler,
        webhooks,
        queue,
        rate_limiter: RateLimiter::per_minute(config.webhook_rate_limit_per_minute),
    });

    // Periodically drop finished rate-limit windows and expired cache entries
    let purge_state = state.clone();
    let purge_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            purge_state.rate_limiter.purge_expired();
            if let Some(cache) = &memory_cache {
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "Purged expired cache entries");
                }
            }
        }
    });

    let app = create_router(state);

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr).await?;
    info!("Shipping service listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // The router (and with it the last queue handle) is gone once serve returns.
    purge_handle.abort();
    let _ = purge_handle.await;

    info!("Waiting for reconciliation worker...");
    match tokio::time::timeout(WORKER_SHUTDOWN_TIMEOUT, worker_handle).await {
        Ok(_) => info!("Reconciliation worker drained"),
        Err(_) => warn!("Reconciliation worker still busy, abandoning pending retries"),
    }

    info!("Shipping service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
