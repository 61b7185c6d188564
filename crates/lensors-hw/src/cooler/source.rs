//! Cooler discovery and status polling.

use super::{CoolerBus, CoolerHandle, HidCoolerBus, StatusValue};
use crate::backend::SourceBackend;
use crate::device::{Device, DeviceId, DeviceLink, Sample};
use crate::sensor::{round2, Locator, Reading};
use crate::Result;
use tracing::{debug, info, warn};

/// USB-protocol-backed source.
pub struct CoolerSource {
    bus: Box<dyn CoolerBus>,
}

impl CoolerSource {
    /// Creates a source over a cooler bus.
    pub fn new(bus: Box<dyn CoolerBus>) -> Self {
        Self { bus }
    }

    /// Creates a source over the system's USB HID devices.
    pub fn hid() -> Self {
        Self::new(Box::new(HidCoolerBus::new()))
    }
}

impl SourceBackend for CoolerSource {
    fn name(&self) -> &str {
        "cooler"
    }

    fn discover(&mut self, known: &[DeviceId]) -> Vec<Device> {
        let handles = match self.bus.list_devices() {
            Ok(handles) => handles,
            Err(e) => {
                warn!("Cannot list coolers: {}", e);
                return Vec::new();
            }
        };

        let mut devices = Vec::new();
        for mut handle in handles {
            let id = DeviceId::new(handle.address());
            if known.contains(&id) {
                debug!("Cooler {} already connected", id);
                continue;
            }

            let description = handle.description();
            if let Err(e) = handle.connect() {
                warn!("Cannot connect to {} at {}: {}", description, id, e);
                continue;
            }

            // From here on the link disconnects the handle when dropped
            let mut link = CoolerLink::new(handle);
            if let Err(e) = link.handle.initialize() {
                warn!("Cannot initialize {} at {}: {}", description, id, e);
                continue;
            }

            let mut device = Device::new(id, &description, Box::new(link));
            device.refresh();
            info!(
                "Found cooler {} ({} sensors)",
                device.name(),
                device.sensors().len()
            );
            devices.push(device);
        }

        devices
    }
}

/// Connected cooler owned by a device.
///
/// Disconnects the handle exactly once, when dropped.
pub struct CoolerLink {
    handle: Box<dyn CoolerHandle>,
}

impl CoolerLink {
    /// Takes ownership of a connected handle.
    pub fn new(handle: Box<dyn CoolerHandle>) -> Self {
        Self { handle }
    }
}

impl DeviceLink for CoolerLink {
    fn read(&mut self, _locators: &[Locator]) -> Result<Vec<Sample>> {
        let status = self.handle.get_status()?;

        Ok(status
            .into_iter()
            .map(|entry| Sample {
                label: entry.key.clone(),
                locator: Locator::Field { key: entry.key },
                unit: Some(entry.unit),
                reading: match entry.value {
                    StatusValue::Number(value) => Reading::Value(round2(value)),
                    StatusValue::Text(text) => Reading::Invalid(text),
                },
            })
            .collect())
    }
}

impl Drop for CoolerLink {
    fn drop(&mut self) {
        debug!("Disconnecting cooler {}", self.handle.address());
        self.handle.disconnect();
    }
}
