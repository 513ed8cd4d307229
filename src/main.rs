use std::sync::Arc;

use simex::ExchangeError;
use simex::clock::SystemClock;
use simex::config::fetch_config;
use simex::exchange::Exchange;
use simex::store::{MemoryCandleStore, MemoryWalletStore};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ExchangeError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;
    info!(environment = ?app_config.environment, "Starting exchange core");

    let exchange = Exchange::new(
        app_config.exchange,
        Arc::new(MemoryWalletStore::new()),
        Arc::new(MemoryCandleStore::new()),
        Arc::new(SystemClock),
    );
    let tasks = exchange.spawn_background();

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ExchangeError::Unavailable(format!("failed to listen for ctrl-c: {e}")))?;
    info!("Shutdown requested");
    tasks.close().await;

    Ok(())
}
