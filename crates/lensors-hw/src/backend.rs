//! Source backend abstraction.

use crate::device::{Device, DeviceId};

/// A data-acquisition strategy that discovers devices.
///
/// Discovered devices carry their own [`DeviceLink`](crate::DeviceLink), so
/// refreshing never goes back through the backend.
pub trait SourceBackend: Send {
    /// Returns a short name for logs and views (e.g. `hwmon`).
    fn name(&self) -> &str;

    /// Discovers devices.
    ///
    /// `known` lists devices already owned by the registry. Backends holding
    /// exclusive resources must skip them instead of opening them again.
    /// Discovery errors are logged and never abort the pass.
    fn discover(&mut self, known: &[DeviceId]) -> Vec<Device>;
}
