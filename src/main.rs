use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use freerooms::cache::{AvailabilityCache, SystemClock};
use freerooms::catalog::{OperatingHours, RoomCatalog, RoomPolicy};
use freerooms::config::Config;
use freerooms::engine::Engine;
use freerooms::fetcher::SiriusClient;
use freerooms::http;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    freerooms::observability::init(config.metrics_port)?;

    let policy = Arc::new(RoomPolicy::new(
        RoomCatalog::default(),
        OperatingHours::default(),
        config.tz,
    ));
    let fetcher = Arc::new(SiriusClient::new(config.sirius.clone(), config.tz)?);
    let cache = AvailabilityCache::new(config.cache_ttl, Arc::new(SystemClock));
    let engine = Arc::new(Engine::new(policy.clone(), fetcher, cache));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("freerooms listening on {addr}");
    info!("  upstream: {}", config.sirius.base_url);
    info!("  timezone: {}", config.tz);
    info!("  rooms: {}", policy.catalog.len());
    info!("  cache_ttl: {}s", config.cache_ttl.as_secs());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, http::router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("freerooms stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM; in-flight requests are drained by axum.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
