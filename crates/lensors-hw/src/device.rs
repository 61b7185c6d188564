//! Devices grouping the sensors of one hardware source.

use crate::sensor::{Locator, Reading, Sensor};
use crate::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stable identity of a device within its backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value read from a device during one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Where the value came from.
    pub locator: Locator,
    /// Label to use if this is a sensor the device has not seen yet.
    pub label: String,
    /// Unit reported by the backend, if any.
    pub unit: Option<String>,
    /// The raw value.
    pub reading: Reading,
}

/// Transport used by a device to read its sensors.
///
/// A link owns whatever hardware resource the device needs and releases it
/// when dropped.
pub trait DeviceLink: Send {
    /// Reads all sensors of the device.
    ///
    /// `locators` address the sensors known so far, in discovery order. Any
    /// error fails the whole read; no partial results are applied.
    fn read(&mut self, locators: &[Locator]) -> Result<Vec<Sample>>;
}

/// Link handle that can be read without borrowing the device.
///
/// The hardware resource is released when the last handle is dropped.
pub type SharedLink = Arc<Mutex<Box<dyn DeviceLink>>>;

/// A physical or logical hardware source and its sensors.
pub struct Device {
    id: DeviceId,
    name: String,
    sensors: Vec<Sensor>,
    faulty: bool,
    history_limit: Option<usize>,
    link: SharedLink,
}

impl Device {
    /// Creates a device with no sensors.
    pub fn new(id: DeviceId, name: &str, link: Box<dyn DeviceLink>) -> Self {
        Self {
            id,
            name: name.trim().to_string(),
            sensors: Vec::new(),
            faulty: false,
            history_limit: None,
            link: Arc::new(Mutex::new(link)),
        }
    }

    /// Returns the device identity.
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the sensors in discovery order.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    /// Finds a sensor by its locator key.
    pub fn sensor(&self, key: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.locator().key() == key)
    }

    /// Returns true once a read has failed.
    pub fn is_faulty(&self) -> bool {
        self.faulty
    }

    /// Caps the history of current and future sensors.
    pub fn set_history_limit(&mut self, limit: Option<usize>) {
        self.history_limit = limit;
        for sensor in &mut self.sensors {
            sensor.set_history_limit(limit);
        }
    }

    /// Adds a sensor. Returns false if one with the same locator exists.
    pub fn add(&mut self, mut sensor: Sensor) -> bool {
        if self.sensors.iter().any(|s| s.locator() == sensor.locator()) {
            debug!(
                "{}: sensor {} already present",
                self.name,
                sensor.locator().key()
            );
            return false;
        }

        sensor.set_history_limit(self.history_limit);
        self.sensors.push(sensor);
        true
    }

    /// Moves every sensor of `other` into this device, skipping duplicates.
    ///
    /// Returns the number of sensors added.
    pub fn merge(&mut self, other: Device) -> usize {
        let mut added = 0;
        for sensor in other.sensors {
            if self.add(sensor) {
                added += 1;
            }
        }
        added
    }

    /// Returns the locators of the known sensors, in discovery order.
    pub fn locators(&self) -> Vec<Locator> {
        self.sensors.iter().map(|s| s.locator().clone()).collect()
    }

    /// Returns a handle to the device's link.
    ///
    /// Lets a caller read the hardware without holding the device.
    pub fn link(&self) -> SharedLink {
        self.link.clone()
    }

    /// Re-reads every sensor.
    ///
    /// A failed read marks the device faulty and leaves all sensor values
    /// untouched. A faulty device is never read again.
    pub fn refresh(&mut self) {
        if self.faulty {
            return;
        }

        let result = self.link.lock().read(&self.locators());
        self.apply(result);
    }

    /// Applies the outcome of one read of this device's link.
    ///
    /// Samples update the matching sensors or create new ones. An error
    /// marks the device faulty and changes nothing else.
    pub fn apply(&mut self, result: Result<Vec<Sample>>) {
        if self.faulty {
            return;
        }

        let samples = match result {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Couldn't read {}, marking device as faulty: {}", self.name, e);
                self.faulty = true;
                return;
            }
        };

        for sample in samples {
            match self
                .sensors
                .iter_mut()
                .find(|s| *s.locator() == sample.locator)
            {
                Some(sensor) => sensor.update(sample.reading),
                None => {
                    let mut sensor = Sensor::new(&sample.label, sample.locator, sample.unit);
                    sensor.update(sample.reading);
                    self.add(sensor);
                }
            }
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("sensors", &self.sensors.len())
            .field("faulty", &self.faulty)
            .finish()
    }
}
