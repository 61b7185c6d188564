//! Lensors hardware library
//!
//! Collects live readings from kernel hwmon sensor files and USB liquid
//! coolers, normalizes them into typed sensors with min/max and history
//! tracking, and keeps them fresh with a background polling scheduler.

pub mod backend;
pub mod cooler;
pub mod device;
pub mod error;
pub mod hwmon;
pub mod scheduler;
pub mod sensor;
pub mod tree;

pub use backend::SourceBackend;
pub use cooler::{CoolerBus, CoolerHandle, CoolerSource, HidCoolerBus, StatusEntry, StatusValue};
pub use device::{Device, DeviceId, DeviceLink, Sample, SharedLink};
pub use error::{Error, Result};
pub use hwmon::HwmonSource;
pub use scheduler::{PollEvent, Scheduler};
pub use sensor::{HistoryPoint, Locator, Reading, Sensor, SensorKind};
pub use tree::{DeviceView, SensorTree, SensorView, TreeOptions};

/// Default polling period in milliseconds.
pub const DEFAULT_POLL_MS: u64 = 1000;

/// Default root of the kernel hwmon class directory.
pub const HWMON_ROOT: &str = "/sys/class/hwmon";
