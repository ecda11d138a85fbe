//! ledgerline: in-process broker host
//!
//! Loads configuration, opens storage and keeps the broker alive until
//! Ctrl+C, then closes storage cleanly.
//!
//! ## Configuration
//! ```yaml
//! storage:
//!   type: sqlite
//!   sqlite:
//!     path: ./data/ledgerline.db
//!
//! delivery:
//!   high_water_bytes: 1048576
//!   low_water_bytes: 524288
//!   buffer_limit: 10000
//!   overflow: drop_oldest
//! ```

use tracing::{error, info};

use ledgerline::config::{Config, CONFIG_ENV_VAR};
use ledgerline::utils::bootstrap::init_tracing;
use ledgerline::Broker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref()).map_err(|e| {
        error!(error = %e, env = CONFIG_ENV_VAR, "Failed to load configuration");
        e
    })?;
    config.validate()?;

    let broker = Broker::from_config(&config).await?;
    info!(
        storage = ?config.storage.storage_type,
        "ledgerline started"
    );

    info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    broker.close().await;
    Ok(())
}
