//! FleetFlow trip scoring service

use fleetflow_api::{init_logging, run, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    info!("=== FleetFlow Trip Scoring v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Scoring policy: floor {:?}, aggregation {:?}, {} workers",
        config.scoring.floor, config.scoring.aggregation, config.worker.workers
    );

    run(config).await
}
