use std::sync::Arc;

use clap::arg;
use clap::command;
use clap::Parser;
use anyhow::{Context, Result};
use managed_token::manager::AutoManagedTokenManager;
use managed_token::server;
use managed_token::utils::config_loader;
use managed_token::utils::constants::DEFAULT_CONFIG_PATH;
use managed_token::utils::logging;
use managed_token::utils::logging::LogLevel;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level)?;

    // -------------------------------
    // 2. Obtain the first token
    // -------------------------------

    let manager = Arc::new(
        AutoManagedTokenManager::from_config(&service_config).context("cannot build token manager")?,
    );
    manager.start().await.context("initial token exchange failed")?;

    // -------------------------------
    // 3. Start http server
    // -------------------------------

    let shutdown = CancellationToken::new();
    let http_server = tokio::spawn({
        let settings = service_config.settings.clone();
        let manager = manager.clone();
        let shutdown = shutdown.clone();
        async move { server::server::start(&settings, manager, shutdown).await }
    });

    info!("Service started");

    // -------------------------------
    // 4. Wait for ctrl-c, then shut down
    // -------------------------------

    tokio::signal::ctrl_c().await.context("cannot listen for shutdown signal")?;
    info!("Shutdown requested");

    shutdown.cancel();
    manager.stop().await;

    match http_server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!("http server error: {:#}", err),
        Err(err) => error!("http server task failed: {}", err),
    }

    info!("Service stopped");
    Ok(())
}
