//! USB liquid cooler backend.
//!
//! Coolers are reached through a vendor protocol client: a [`CoolerBus`]
//! lists attached devices and each [`CoolerHandle`] is connected,
//! initialized and then polled for status reports. Sensors are not known
//! up front; they appear as the status report names them.

mod device;
mod protocol;
mod source;

pub use device::{HidCoolerBus, KrakenX3};
pub use protocol::{parse_status, KRAKEN_X3_PID, NZXT_VID};
pub use source::{CoolerLink, CoolerSource};

use crate::Result;

/// Value of one status report field.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusValue {
    /// A numeric measurement.
    Number(f64),
    /// Free text, such as a firmware version.
    Text(String),
}

/// One `(key, value, unit)` triple of a status report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    /// Field name, e.g. `Liquid temperature`.
    pub key: String,
    /// Reported value.
    pub value: StatusValue,
    /// Unit reported by the device, e.g. `°C`.
    pub unit: String,
}

impl StatusEntry {
    /// Creates a numeric entry.
    pub fn number(key: &str, value: f64, unit: &str) -> Self {
        Self {
            key: key.to_string(),
            value: StatusValue::Number(value),
            unit: unit.to_string(),
        }
    }
}

/// Lists attached coolers.
pub trait CoolerBus: Send {
    /// Enumerates attached devices. Returned handles are not yet connected.
    fn list_devices(&mut self) -> Result<Vec<Box<dyn CoolerHandle>>>;
}

/// Vendor protocol client for one cooler.
pub trait CoolerHandle: Send {
    /// Returns a stable address for the device (e.g. its HID path).
    fn address(&self) -> String;

    /// Returns a human-readable description.
    fn description(&self) -> String;

    /// Opens the device.
    fn connect(&mut self) -> Result<()>;

    /// Performs the initialization handshake.
    fn initialize(&mut self) -> Result<()>;

    /// Requests a status report.
    fn get_status(&mut self) -> Result<Vec<StatusEntry>>;

    /// Closes the device.
    fn disconnect(&mut self);
}
