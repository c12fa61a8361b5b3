use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{BookingError, Engine};

/// Compact the WAL once more than `threshold` events were appended since the
/// last compaction. Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, BookingError> {
    let appended = engine.wal_appends_since_compact().await;
    if appended < threshold {
        debug!(appended, threshold, "WAL below compaction threshold");
        return Ok(false);
    }
    engine.compact_wal().await?;
    info!(appended, "WAL compacted");
    Ok(true)
}

/// Background task that checks the WAL size every `every`.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            warn!("WAL compaction failed: {e}");
        }
    }
}

pub fn spawn_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) -> JoinHandle<()> {
    tokio::spawn(run_compactor(engine, threshold, every))
}
