use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use thermobridged::api;
use thermobridged::config::{Config, LoggingConfig};
use thermobridged::device::HttpTransport;
use thermobridged::engine::Thermostat;
use thermobridged::store::StateStore;

/// Bridge thermostats with ad-hoc HTTP APIs into a hub-friendly accessory
/// surface.
#[derive(Parser)]
#[command(name = "thermobridged", version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "thermobridged.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    init_tracing(&config.logging);

    tracing::info!("thermobridged starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let request_timeout = config.system.request_timeout_secs.map(Duration::from_secs);

    let mut accessories: HashMap<String, Arc<Thermostat<HttpTransport>>> = HashMap::new();
    let mut poll_handles = Vec::new();

    for (id, accessory) in &config.accessories {
        tracing::info!("[{}] starting accessory '{}'", id, accessory.name);

        let endpoints = accessory
            .endpoints()
            .with_context(|| format!("invalid endpoint config for accessory '{}'", id))?;
        let transport =
            HttpTransport::new(request_timeout).context("failed to create HTTP client")?;
        let store = StateStore::new(&config.system.data_dir, id);

        let thermostat = Arc::new(Thermostat::new(
            id.clone(),
            endpoints,
            Duration::from_secs(accessory.poll_interval),
            transport,
            store,
        ));

        thermostat.initialize().await;
        poll_handles.push(thermostat.clone().spawn_poll_loop());

        accessories.insert(id.clone(), thermostat);
    }

    if accessories.is_empty() {
        tracing::warn!("No accessories configured");
    }

    // Hub-facing API server, if enabled
    let (shutdown_tx, api_task) = match &config.api {
        Some(api_config) if api_config.enabled => {
            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
            let task = tokio::spawn(api::serve(
                accessories.clone(),
                api_config.listen.clone(),
                api_config.port,
                shutdown_rx,
            ));
            (Some(shutdown_tx), Some(task))
        }
        _ => (None, None),
    };

    tracing::info!("All accessories started, entering main loop");
    tracing::info!("Press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    if let Some(shutdown_tx) = shutdown_tx {
        let _ = shutdown_tx.send(());
    }
    if let Some(task) = api_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("API server error: {}", e),
            Err(e) => tracing::error!("API server task failed: {}", e),
        }
    }

    for handle in poll_handles {
        handle.abort();
    }

    tracing::info!("thermobridged shutdown complete");

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let mut filter = Targets::new().with_default(logging.level);
    for (target, level) in &logging.overrides {
        filter = filter.with_target(target.clone(), *level);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}
