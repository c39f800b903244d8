use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations. Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "roombook_operations_total";

/// Histogram: operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "roombook_operation_duration_seconds";

/// Counter: booking requests rejected because a room was busy.
pub const BOOKING_CONFLICTS_TOTAL: &str = "roombook_booking_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: reservations currently in the store.
pub const RESERVATIONS_ACTIVE: &str = "roombook_reservations_active";

/// Gauge: registered rooms.
pub const ROOMS_ACTIVE: &str = "roombook_rooms_active";

/// Histogram: journal append plus fsync duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "roombook_journal_flush_duration_seconds";

/// Counter: journal compactions performed.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "roombook_journal_compactions_total";

/// Install the fmt tracing subscriber. Safe to call more than once.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record outcome and latency of one engine operation.
pub(crate) fn record_operation<T, E>(
    operation: &'static str,
    started: std::time::Instant,
    result: &Result<T, E>,
) {
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
