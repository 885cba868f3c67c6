use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total `/api/freeRooms` requests. Labels: status.
pub const REQUESTS_TOTAL: &str = "freerooms_requests_total";

/// Histogram: request latency in seconds.
pub const REQUEST_DURATION_SECONDS: &str = "freerooms_request_duration_seconds";

// ── Cache ───────────────────────────────────────────────────────

/// Counter: lookups answered from the cache.
pub const CACHE_HITS_TOTAL: &str = "freerooms_cache_hits_total";

/// Counter: lookups that required an upstream fetch.
pub const CACHE_MISSES_TOTAL: &str = "freerooms_cache_misses_total";

/// Gauge: number of cached days.
pub const CACHE_ENTRIES: &str = "freerooms_cache_entries";

// ── Upstream ────────────────────────────────────────────────────

/// Histogram: upstream fetch duration in seconds (all pages of one day).
pub const UPSTREAM_FETCH_DURATION_SECONDS: &str = "freerooms_upstream_fetch_duration_seconds";

/// Counter: failed upstream fetches.
pub const UPSTREAM_FAILURES_TOTAL: &str = "freerooms_upstream_failures_total";

/// Histogram: occupancy records received per fetch.
pub const UPSTREAM_EVENTS: &str = "freerooms_upstream_events";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(
    port: Option<u16>,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an HTTP status to a short label for metrics.
pub fn status_label(status: u16) -> &'static str {
    match status {
        200..=299 => "ok",
        400..=499 => "client_error",
        _ => "server_error",
    }
}
