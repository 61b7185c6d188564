//! Per-backend device registry.

use crate::backend::SourceBackend;
use crate::device::{Device, DeviceId, Sample, SharedLink};
use crate::sensor::{HistoryPoint, Locator, Sensor, SensorKind};
use crate::Result;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Default number of history points kept per sensor.
pub const DEFAULT_HISTORY_LIMIT: usize = 3600;

/// Registry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    /// History cap per sensor. `None` keeps every point.
    pub history_limit: Option<usize>,
    /// Hide sensors reading exactly zero from snapshots.
    pub hide_zero: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
            hide_zero: true,
        }
    }
}

/// Read-only view of one sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorView {
    /// Key identifying the sensor within its device.
    pub key: String,
    pub label: String,
    pub kind: SensorKind,
    pub value: String,
    pub min: String,
    pub max: String,
}

impl SensorView {
    fn new(sensor: &Sensor) -> Self {
        Self {
            key: sensor.locator().key().to_string(),
            label: sensor.label().to_string(),
            kind: sensor.kind(),
            value: sensor.format(sensor.value()),
            min: sensor.format(sensor.min()),
            max: sensor.format(sensor.max()),
        }
    }
}

/// Read-only view of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    pub id: DeviceId,
    pub name: String,
    pub sensors: Vec<SensorView>,
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// Devices still live after the pass.
    pub devices: usize,
    /// Devices removed in this pass, as `(id, name)`.
    pub evicted: Vec<(DeviceId, String)>,
}

/// Live devices of one backend.
///
/// A refresh reads the hardware without holding the device lock and only
/// takes it to apply the results, so snapshots wait for memory updates but
/// never for I/O. Refreshes, discovery and close are serialized by a
/// separate pass lock, so passes never overlap.
pub struct SensorTree {
    name: String,
    options: TreeOptions,
    pass: Mutex<()>,
    backend: Mutex<Box<dyn SourceBackend>>,
    devices: Mutex<Vec<Device>>,
}

impl SensorTree {
    /// Creates an empty registry with default options.
    pub fn new(backend: Box<dyn SourceBackend>) -> Self {
        Self::with_options(backend, TreeOptions::default())
    }

    /// Creates an empty registry.
    pub fn with_options(backend: Box<dyn SourceBackend>, options: TreeOptions) -> Self {
        Self {
            name: backend.name().to_string(),
            options,
            pass: Mutex::new(()),
            backend: Mutex::new(backend),
            devices: Mutex::new(Vec::new()),
        }
    }

    /// Returns the backend name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the registry options.
    pub fn options(&self) -> TreeOptions {
        self.options
    }

    /// Returns the number of live devices.
    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    /// Returns true if no device is registered.
    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    /// Runs backend discovery and registers what it finds.
    ///
    /// Devices already registered keep their identity and history; only new
    /// sensors are added to them. Returns the number of new devices.
    pub fn discover(&self) -> usize {
        let _pass = self.pass.lock();
        let mut backend = self.backend.lock();
        let known: Vec<DeviceId> = self.devices.lock().iter().map(|d| d.id().clone()).collect();

        let found = backend.discover(&known);

        let mut devices = self.devices.lock();
        let mut added = 0;
        for mut device in found {
            match devices.iter_mut().find(|d| d.id() == device.id()) {
                Some(existing) => {
                    let sensors = existing.merge(device);
                    if sensors > 0 {
                        debug!("{}: {} new sensors on {}", self.name, sensors, existing.name());
                    }
                }
                None => {
                    device.set_history_limit(self.options.history_limit);
                    devices.push(device);
                    added += 1;
                }
            }
        }

        info!(
            "{}: discovery added {} devices ({} total)",
            self.name,
            added,
            devices.len()
        );
        added
    }

    /// Refreshes every device and evicts the ones that failed.
    ///
    /// Devices are read in registry order. All results are applied under a
    /// single acquisition of the device lock, so a snapshot sees either the
    /// previous pass or this one.
    pub fn refresh(&self) -> RefreshReport {
        let _pass = self.pass.lock();

        let pending: Vec<(DeviceId, SharedLink, Vec<Locator>)> = self
            .devices
            .lock()
            .iter()
            .filter(|d| !d.is_faulty())
            .map(|d| (d.id().clone(), d.link(), d.locators()))
            .collect();

        let results: Vec<(DeviceId, Result<Vec<Sample>>)> = pending
            .into_iter()
            .map(|(id, link, locators)| {
                let result = link.lock().read(&locators);
                (id, result)
            })
            .collect();

        let (report, evicted) = {
            let mut devices = self.devices.lock();
            for (id, result) in results {
                if let Some(device) = devices.iter_mut().find(|d| *d.id() == id) {
                    device.apply(result);
                }
            }

            let (evicted, live): (Vec<Device>, Vec<Device>) =
                std::mem::take(&mut *devices).into_iter().partition(|d| d.is_faulty());
            *devices = live;

            let report = RefreshReport {
                devices: devices.len(),
                evicted: evicted
                    .iter()
                    .map(|d| (d.id().clone(), d.name().to_string()))
                    .collect(),
            };
            (report, evicted)
        };

        // Dropping releases backend resources, outside the lock
        for device in evicted {
            warn!("{}: removed the faulty device {}", self.name, device.name());
            drop(device);
        }

        report
    }

    /// Returns the displayable devices and sensors.
    ///
    /// Faulty devices are left out, as are devices with no displayable
    /// sensors.
    pub fn snapshot(&self) -> Vec<DeviceView> {
        let devices = self.devices.lock();
        devices
            .iter()
            .filter(|d| !d.is_faulty())
            .filter_map(|device| {
                let sensors: Vec<SensorView> = device
                    .sensors()
                    .iter()
                    .filter(|s| !self.options.hide_zero || s.is_displayed())
                    .map(SensorView::new)
                    .collect();

                if sensors.is_empty() {
                    return None;
                }

                Some(DeviceView {
                    id: device.id().clone(),
                    name: device.name().to_string(),
                    sensors,
                })
            })
            .collect()
    }

    /// Returns a copy of one sensor's history.
    pub fn history(&self, device: &DeviceId, key: &str) -> Option<Vec<HistoryPoint>> {
        let devices = self.devices.lock();
        devices
            .iter()
            .find(|d| d.id() == device)
            .and_then(|d| d.sensor(key))
            .map(|s| s.history().copied().collect())
    }

    /// Drops every device, releasing backend resources.
    ///
    /// Waits for an in-flight refresh to finish first.
    pub fn close(&self) {
        let _pass = self.pass.lock();
        let devices = std::mem::take(&mut *self.devices.lock());
        if !devices.is_empty() {
            info!("{}: releasing {} devices", self.name, devices.len());
        }
        drop(devices);
    }
}

impl Drop for SensorTree {
    fn drop(&mut self) {
        self.close();
    }
}
