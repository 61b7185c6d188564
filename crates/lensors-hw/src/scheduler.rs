//! Background polling of sensor registries.
//!
//! The scheduler is either idle or running one periodic task. Each tick
//! refreshes every registry on the blocking thread pool and waits for the
//! pass to finish before the next tick is considered, so passes never
//! overlap. Late ticks are skipped rather than queued.

use crate::device::DeviceId;
use crate::tree::SensorTree;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Capacity of the event channel.
const EVENT_CAPACITY: usize = 64;

/// Change notifications published by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// A registry finished a refresh pass.
    Refreshed {
        /// Backend name.
        source: String,
        /// Live devices after the pass.
        devices: usize,
    },
    /// A faulty device was removed.
    Evicted {
        source: String,
        device: DeviceId,
        name: String,
    },
    /// A registry finished an explicit rediscovery.
    Rediscovered {
        source: String,
        /// Newly registered devices.
        added: usize,
    },
}

/// Running periodic task.
struct PollTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    period: Duration,
}

/// Periodic refresh across registries.
pub struct Scheduler {
    trees: Vec<Arc<SensorTree>>,
    events: broadcast::Sender<PollEvent>,
    task: Mutex<Option<PollTask>>,
}

impl Scheduler {
    /// Creates an idle scheduler over the given registries.
    pub fn new(trees: Vec<Arc<SensorTree>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            trees,
            events,
            task: Mutex::new(None),
        }
    }

    /// Returns the registries polled by this scheduler.
    pub fn trees(&self) -> &[Arc<SensorTree>] {
        &self.trees
    }

    /// Finds a registry by backend name.
    pub fn tree(&self, source: &str) -> Option<&Arc<SensorTree>> {
        self.trees.iter().find(|t| t.name() == source)
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.events.subscribe()
    }

    /// Returns true while the periodic task is running.
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Returns the current period, if running.
    pub async fn period(&self) -> Option<Duration> {
        self.task.lock().await.as_ref().map(|task| task.period)
    }

    /// Starts periodic refreshes, replacing any running task.
    ///
    /// The first refresh happens one period after the call.
    pub async fn start(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(Error::InvalidInterval(0));
        }

        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            Self::join(previous).await;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let trees = self.trees.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(poll_loop(trees, events, period, stop_rx));

        info!("Polling started every {:?}", period);
        *task = Some(PollTask {
            stop_tx,
            handle,
            period,
        });
        Ok(())
    }

    /// Stops periodic refreshes.
    ///
    /// Returns once any in-flight pass has finished; no sensor changes after
    /// this returns.
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            Self::join(task).await;
            info!("Polling stopped");
        }
    }

    /// Runs one refresh pass across all registries and waits for it.
    ///
    /// Works whether or not polling is running and leaves the schedule alone.
    pub async fn refresh_now(&self) {
        refresh_all(self.trees.clone(), self.events.clone()).await;
    }

    /// Runs discovery again on every registry to pick up new hardware.
    ///
    /// Returns the number of newly registered devices.
    pub async fn rediscover(&self) -> usize {
        let trees = self.trees.clone();
        let events = self.events.clone();

        let result = tokio::task::spawn_blocking(move || {
            trees
                .iter()
                .map(|tree| {
                    let added = tree.discover();
                    let _ = events.send(PollEvent::Rediscovered {
                        source: tree.name().to_string(),
                        added,
                    });
                    added
                })
                .sum::<usize>()
        })
        .await;

        result.unwrap_or_else(|e| {
            warn!("Rediscovery task failed: {}", e);
            0
        })
    }

    /// Stops polling and releases every device.
    ///
    /// Order: cancel the timer, wait for the in-flight pass, then drop the
    /// devices so USB handles disconnect.
    pub async fn shutdown(&self) {
        self.stop().await;
        for tree in &self.trees {
            tree.close();
        }
        info!("Scheduler shut down");
    }

    async fn join(task: PollTask) {
        let _ = task.stop_tx.send(true);
        if let Err(e) = task.handle.await {
            warn!("Polling task ended abnormally: {}", e);
        }
    }
}

async fn poll_loop(
    trees: Vec<Arc<SensorTree>>,
    events: broadcast::Sender<PollEvent>,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                // Stop requests seen mid-pass take effect after the pass
                refresh_all(trees.clone(), events.clone()).await;
                if *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Polling loop exited");
}

/// Refreshes every registry in order on the blocking pool.
async fn refresh_all(trees: Vec<Arc<SensorTree>>, events: broadcast::Sender<PollEvent>) {
    let result = tokio::task::spawn_blocking(move || {
        for tree in &trees {
            let report = tree.refresh();

            for (device, name) in report.evicted {
                let _ = events.send(PollEvent::Evicted {
                    source: tree.name().to_string(),
                    device,
                    name,
                });
            }
            let _ = events.send(PollEvent::Refreshed {
                source: tree.name().to_string(),
                devices: report.devices,
            });
        }
    })
    .await;

    if let Err(e) = result {
        warn!("Refresh task failed: {}", e);
    }
}
