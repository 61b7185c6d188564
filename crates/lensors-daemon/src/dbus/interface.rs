//! D-Bus interface implementation using zbus.
//!
//! Provides the `org.lensors.Daemon1` interface.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lensors_hw::{DeviceId, DeviceView, PollEvent, Scheduler};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use zbus::object_server::SignalEmitter;
use zbus::{interface, Connection};

use crate::config::BusKind;

/// Object path of the daemon.
pub const OBJECT_PATH: &str = "/org/lensors/Daemon";

/// Well-known bus name of the daemon.
pub const BUS_NAME: &str = "org.lensors.Daemon";

/// Devices of one backend, as serialized for `ListDevices`.
#[derive(Serialize)]
struct SourceView<'a> {
    source: &'a str,
    devices: Vec<DeviceView>,
}

/// D-Bus interface implementation for the Lensors daemon.
pub struct Daemon1Interface {
    scheduler: Arc<Scheduler>,
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
}

impl Daemon1Interface {
    /// Creates a new D-Bus interface.
    pub fn new(scheduler: Arc<Scheduler>, shutdown_tx: tokio::sync::mpsc::Sender<()>) -> Self {
        Self {
            scheduler,
            shutdown_tx,
        }
    }
}

#[interface(name = "org.lensors.Daemon1")]
impl Daemon1Interface {
    /// Lists displayable devices, one JSON document per backend.
    fn list_devices(&self) -> zbus::fdo::Result<Vec<String>> {
        self.scheduler
            .trees()
            .iter()
            .map(|tree| {
                let view = SourceView {
                    source: tree.name(),
                    devices: tree.snapshot(),
                };
                serde_json::to_string(&view).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
            })
            .collect()
    }

    /// Returns one sensor's history as (unix milliseconds, value) pairs.
    fn get_history(
        &self,
        source: &str,
        device: &str,
        sensor: &str,
    ) -> zbus::fdo::Result<Vec<(i64, f64)>> {
        let tree = self
            .scheduler
            .tree(source)
            .ok_or_else(|| zbus::fdo::Error::InvalidArgs(format!("Unknown source {}", source)))?;

        let history = tree
            .history(&DeviceId::new(device), sensor)
            .ok_or_else(|| {
                zbus::fdo::Error::InvalidArgs(format!("Unknown sensor {}/{}", device, sensor))
            })?;

        Ok(history
            .iter()
            .map(|p| (p.at.timestamp_millis(), p.value))
            .collect())
    }

    /// Refreshes every backend once and waits for it.
    async fn refresh(&self) {
        debug!("D-Bus: Refresh");
        self.scheduler.refresh_now().await;
    }

    /// Runs discovery again. Returns the number of new devices.
    async fn rediscover(&self) -> u32 {
        let added = self.scheduler.rediscover().await;
        info!("D-Bus: Rediscover found {} new devices", added);
        added as u32
    }

    /// Starts polling at the given interval.
    async fn start(&self, interval_ms: u64) -> zbus::fdo::Result<()> {
        self.scheduler
            .start(Duration::from_millis(interval_ms))
            .await
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;

        debug!("D-Bus: Start({})", interval_ms);
        Ok(())
    }

    /// Stops polling.
    async fn stop(&self) {
        debug!("D-Bus: Stop");
        self.scheduler.stop().await;
    }

    /// Shuts down the daemon.
    async fn quit(&self) -> zbus::fdo::Result<()> {
        info!("D-Bus: Quit requested");
        self.shutdown_tx
            .send(())
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(())
    }

    // Properties

    /// Whether periodic polling is running.
    #[zbus(property)]
    async fn running(&self) -> bool {
        self.scheduler.is_running().await
    }

    // Signals

    /// A backend finished a refresh pass.
    #[zbus(signal)]
    async fn refreshed(emitter: &SignalEmitter<'_>, source: &str, devices: u32)
        -> zbus::Result<()>;

    /// A faulty device was removed.
    #[zbus(signal)]
    async fn device_removed(
        emitter: &SignalEmitter<'_>,
        source: &str,
        device: &str,
        name: &str,
    ) -> zbus::Result<()>;
}

/// Opens the configured bus and reports which one was used.
async fn connect_to_bus(bus: BusKind) -> anyhow::Result<(Connection, &'static str)> {
    match bus {
        BusKind::Session => {
            let conn = Connection::session().await.context("No session bus")?;
            Ok((conn, "session"))
        }
        BusKind::System => {
            let conn = Connection::system().await.context("No system bus")?;
            Ok((conn, "system"))
        }
        BusKind::Auto => {
            match Connection::session().await {
                Ok(conn) => return Ok((conn, "session")),
                Err(e) => debug!("No session bus ({}), falling back to the system bus", e),
            }
            let conn = Connection::system()
                .await
                .context("Neither the session nor the system bus is reachable")?;
            Ok((conn, "system"))
        }
    }
}

/// Runs the D-Bus server.
pub async fn run_dbus_server(
    scheduler: Arc<Scheduler>,
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
    bus: BusKind,
) -> anyhow::Result<Connection> {
    let events = scheduler.subscribe();
    let interface = Daemon1Interface::new(scheduler, shutdown_tx);

    let (connection, bus_name) = connect_to_bus(bus).await?;

    connection
        .object_server()
        .at(OBJECT_PATH, interface)
        .await
        .context("Failed to register object")?;

    connection
        .request_name(BUS_NAME)
        .await
        .context("Failed to request bus name")?;

    tokio::spawn(forward_events(connection.clone(), events));

    info!("D-Bus service registered at {} on {} bus", BUS_NAME, bus_name);
    Ok(connection)
}

/// Re-emits scheduler events as D-Bus signals.
async fn forward_events(
    connection: Connection,
    mut events: tokio::sync::broadcast::Receiver<PollEvent>,
) {
    let emitter = match SignalEmitter::new(&connection, OBJECT_PATH) {
        Ok(emitter) => emitter,
        Err(e) => {
            warn!("Cannot emit D-Bus signals: {}", e);
            return;
        }
    };

    loop {
        let result = match events.recv().await {
            Ok(PollEvent::Refreshed { source, devices }) => {
                Daemon1Interface::refreshed(&emitter, &source, devices as u32).await
            }
            Ok(PollEvent::Evicted {
                source,
                device,
                name,
            }) => Daemon1Interface::device_removed(&emitter, &source, device.as_str(), &name).await,
            Ok(PollEvent::Rediscovered { .. }) => Ok(()),
            Err(RecvError::Lagged(skipped)) => {
                debug!("D-Bus signal forwarder skipped {} events", skipped);
                Ok(())
            }
            Err(RecvError::Closed) => break,
        };

        if let Err(e) = result {
            warn!("Failed to emit D-Bus signal: {}", e);
        }
    }
}
