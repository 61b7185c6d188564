//! Lensors Daemon
//!
//! Background service polling hwmon sensors and USB liquid coolers, with a
//! D-Bus interface for reading snapshots and controlling the poller.

mod config;
mod dbus;

use anyhow::{Context, Result};
use lensors_hw::{CoolerSource, HwmonSource, PollEvent, Scheduler, SensorTree, SourceBackend};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

/// Minimum time between two status summaries in the log.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = Config::load_or_init(&config_path).context("Failed to load configuration")?;

    // Discover hardware
    let trees = discover(&config).await?;
    let scheduler = Arc::new(Scheduler::new(trees));

    // Create channel for shutdown requests
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Keep a clone of shutdown_tx to prevent the channel from closing if D-Bus fails
    let _shutdown_tx_keepalive = shutdown_tx.clone();

    // Start D-Bus service
    let _dbus_connection =
        match dbus::run_dbus_server(scheduler.clone(), shutdown_tx, config.dbus.bus).await {
            Ok(conn) => {
                info!("D-Bus service started");
                Some(conn)
            }
            Err(e) => {
                warn!(
                    "Failed to start D-Bus service: {}. Continuing without D-Bus.",
                    e
                );
                None
            }
        };

    // Start status logging
    let status_scheduler = scheduler.clone();
    let events = scheduler.subscribe();
    tokio::spawn(async move {
        status_loop(status_scheduler, events).await;
    });

    // Start polling
    scheduler
        .start(config.poll_interval())
        .await
        .context("Invalid polling interval")?;

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    // Wait for shutdown signal
    tokio::select! {
        _ = shutdown_rx.recv() => {
            info!("Shutdown requested via D-Bus");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    scheduler.shutdown().await;
    Ok(())
}

/// Builds and populates one registry per enabled backend.
async fn discover(config: &Config) -> Result<Vec<Arc<SensorTree>>> {
    let mut backends: Vec<Box<dyn SourceBackend>> = Vec::new();
    if config.hwmon.enable {
        backends.push(Box::new(HwmonSource::new(&config.hwmon.root)));
    }
    if config.cooler.enable {
        backends.push(Box::new(CoolerSource::hid()));
    }

    let options = config.tree_options();
    let trees: Vec<Arc<SensorTree>> = backends
        .into_iter()
        .map(|backend| Arc::new(SensorTree::with_options(backend, options)))
        .collect();

    // Discovery reads files and USB devices
    let discovered = trees.clone();
    tokio::task::spawn_blocking(move || {
        for tree in &discovered {
            tree.discover();
        }
    })
    .await
    .context("Discovery task failed")?;

    Ok(trees)
}

async fn status_loop(scheduler: Arc<Scheduler>, mut events: broadcast::Receiver<PollEvent>) {
    let mut last_summary: Option<Instant> = None;

    loop {
        match events.recv().await {
            Ok(PollEvent::Refreshed { source, devices }) => {
                debug!("{} refreshed ({} devices)", source, devices);
            }
            Ok(PollEvent::Evicted { source, name, .. }) => {
                info!("{} device {} is gone", source, name);
            }
            Ok(PollEvent::Rediscovered { source, added }) => {
                info!("{} rediscovery added {} devices", source, added);
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!("Status logger skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }

        // Only summarize once per minute
        if last_summary.is_some_and(|t| t.elapsed() < SUMMARY_INTERVAL) {
            continue;
        }
        for tree in scheduler.trees() {
            let snapshot = tree.snapshot();
            let sensors: usize = snapshot.iter().map(|d| d.sensors.len()).sum();
            info!(
                "{}: {} devices, {} sensors displayed",
                tree.name(),
                snapshot.len(),
                sensors
            );
        }
        last_summary = Some(Instant::now());
    }
}
