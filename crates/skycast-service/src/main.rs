//! Skycast Service - keeps forecasts for configured locations fresh.
//!
//! Run with: `cargo run -p skycast-service`

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use skycast_core::{ForecastModel, OpenWeatherClient};
use skycast_service::{Config, Watcher};
use skycast_store::Store;

/// Environment variable that overrides `provider.api_key`.
const API_KEY_ENV: &str = "SKYCAST_API_KEY";

/// Skycast Service - background forecast refresher.
#[derive(Parser, Debug)]
#[command(name = "skycast-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Poll interval in seconds (overrides config).
    #[arg(short, long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skycast_service=info".parse()?)
                .add_directive("skycast_core=info".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args and environment
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(interval) = args.interval {
        config.polling.interval_secs = interval;
    }
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        config.provider.api_key = key;
    }
    config.validate()?;

    if config.locations.is_empty() {
        warn!("No locations configured, nothing to do");
        return Ok(());
    }

    info!("Opening cache at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let source = OpenWeatherClient::new(config.provider.api_key.clone(), &config.provider.base_url)?;
    let model = Arc::new(ForecastModel::with_system_clock(
        Arc::new(source),
        Arc::new(store),
        config.poll_config(),
    )?);

    let watcher = Watcher::new(Arc::clone(&model), config.locations.clone());
    let tasks = watcher.start();
    info!(
        "Refreshing {} pair(s) every {}s",
        model.active_polls(),
        config.polling.interval_secs
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let stopped = model.stop_all_polling();
    for task in tasks {
        let _ = task.await;
    }

    let metrics = model.metrics();
    info!(
        "Stopped {} poll task(s) after {} fetches ({} failed)",
        stopped,
        metrics.total_fetches(),
        metrics.momentum.failure_count + metrics.long_term.failure_count
    );

    Ok(())
}
