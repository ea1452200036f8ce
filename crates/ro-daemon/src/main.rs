//! repo-oracle daemon: serves the repository question-answering API.

use anyhow::{Context, Result};
use ro_core::config::Config;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real deployments use the environment.
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    ro_telemetry::logging::init_from_config(&config.general);
    if let Some(e) = config_error {
        warn!(error = %e, "failed to load config, using defaults");
    }
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        dotenv = dotenv_loaded,
        "repo-oracle daemon starting"
    );

    let daemon = ro_daemon::daemon::Daemon::new(config).context("failed to initialise daemon")?;
    let shutdown = daemon.shutdown_handle();

    // Wire ctrl-c to trigger graceful shutdown.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });

    daemon.run().await?;
    info!("daemon stopped");
    Ok(())
}
