use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::collab::{IdentityResolver, RoomCatalog};
use crate::compactor::spawn_compactor;
use crate::config::Config;
use crate::engine::{Collaborators, Engine};
use crate::observability::init_metrics;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("opening ledger: {0}")]
    Io(#[from] io::Error),
    #[error("installing metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// A launched ledger and its background compactor.
pub struct Running {
    pub engine: Arc<Engine>,
    pub compactor: JoinHandle<()>,
}

/// Open the ledger under `config.data_dir`, install the metrics exporter if a
/// port is configured, and start the compactor. Must run inside a tokio runtime.
pub fn launch(
    config: &Config,
    rooms: Arc<dyn RoomCatalog>,
    identities: Arc<dyn IdentityResolver>,
) -> Result<Running, LaunchError> {
    init_metrics(config.metrics_port)?;
    let engine = Arc::new(Engine::open(
        config,
        Collaborators::system(config, rooms, identities),
    )?);
    let compactor = spawn_compactor(engine.clone(), config.compact_threshold, COMPACT_CHECK_INTERVAL);

    info!("roomslot ledger ready");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  lock_timeout: {:?}", config.lock_timeout);
    info!("  advance window: {:?}", config.advance_window);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );
    Ok(Running { engine, compactor })
}
