use anyhow::Context;
use tracing_subscriber::EnvFilter;

use homelinkd::config::Config;
use homelinkd::runtime::Runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let runtime = Runtime::build(&config)?;
    let started = runtime.start();
    tracing::info!(
        devices = runtime.devices.list().len(),
        started,
        "homelinkd running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutting down");
    runtime.shutdown().await;
    Ok(())
}
