use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use sqlgate::api::GatewayApi;
use sqlgate::conf::Config;
use sqlgate::core::{CliArgs, setup_logging};
use sqlgate::driver::SqliteDriver;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let args = CliArgs::parse();
    let config = Config::load(args.config.as_deref())?;
    info!(args = args; "sqlgate started.");

    let api = GatewayApi::mount(
        Arc::new(SqliteDriver::new()),
        &config.backend,
        config.server.ping_timeout,
    )
    .await;
    if !api.is_ready() {
        warn!("backend unavailable, every query will be answered with 500");
    }

    let served = api
        .serve(&config.server.addr(), &config.server.path, shutdown_signal())
        .await;
    api.close();
    served?;
    Ok(())
}
