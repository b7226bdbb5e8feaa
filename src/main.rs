mod logging;

use anyhow::Context;
use clap::Parser;
use discord_notifier::DiscordNotifier;
use monitor_core::{RunConfig, DEFAULT_CONFIG_PATH};
use monitor_service::MonitorLoop;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vinted_client::{VintedApiClient, VintedApiConfig};

/// Watch Vinted searches and post new listings to a Discord channel.
#[derive(Parser, Debug)]
#[command(name = "vinted-monitor", version, about)]
struct Args {
    /// Run configuration (JSON, or TOML with a .toml extension)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, source) = RunConfig::load_with_source(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    logging::init_logging(&level, config.logging.file.as_deref())?;
    info!("Starting Vinted Monitor");
    source.log();

    let store = seen_store::open_store(&config.storage)
        .await
        .context("failed to open the seen-listing ledger")?;

    let client = VintedApiClient::new(VintedApiConfig::from_marketplace(&config.marketplace)?)?;

    let notifier = DiscordNotifier::new(&config)?;
    if notifier.is_configured() {
        notifier
            .connect()
            .await
            .context("Discord rejected the bot login")?;
    } else {
        warn!("No Discord token or channel configured, listings will be recorded but not posted");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Unable to listen for shutdown signal: {}", e);
                // Keep the sender alive so the monitor keeps running
                std::future::pending::<()>().await;
            }
        }
    });

    let mut monitor = MonitorLoop::new(client, store, notifier, config);
    monitor.run(shutdown_rx).await;

    match monitor.client().export_metrics().await {
        Ok(metrics) => debug!("API metrics at shutdown: {}", metrics),
        Err(e) => warn!("Could not export API metrics: {}", e),
    }
    info!("Vinted Monitor stopped");
    Ok(())
}
