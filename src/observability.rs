use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;
use tracing_subscriber::EnvFilter;

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: reservations created.
pub const RESERVATIONS_CREATED_TOTAL: &str = "roomslot_reservations_created_total";

/// Counter: reservations cancelled.
pub const RESERVATIONS_CANCELLED_TOTAL: &str = "roomslot_reservations_cancelled_total";

/// Counter: booking attempts refused by eligibility. Labels: reason.
pub const BOOKING_DENIED_TOTAL: &str = "roomslot_booking_denied_total";

/// Counter: mutual-exclusion conflicts. Labels: kind (room, user).
pub const CONFLICTS_TOTAL: &str = "roomslot_conflicts_total";

/// Counter: lock waits that hit the timeout.
pub const LOCK_TIMEOUTS_TOTAL: &str = "roomslot_lock_timeouts_total";

/// Gauge: live reservations across all dates.
pub const RESERVATIONS_ACTIVE: &str = "roomslot_reservations_active";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomslot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomslot_wal_flush_batch_size";

/// Counter: WAL appends retried after an I/O failure.
pub const WAL_RETRIES_TOTAL: &str = "roomslot_wal_retries_total";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "roomslot_wal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install a `fmt` subscriber filtered by `RUST_LOG`. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
