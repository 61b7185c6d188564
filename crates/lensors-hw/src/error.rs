//! Error types for the Lensors hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while discovering or reading hardware.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem error while reading a sensor file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// USB HID communication error.
    #[error("USB HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Device not found or could not be opened.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Device was opened but its initialization handshake failed.
    #[error("Handshake with {device} failed: {reason}")]
    Handshake { device: String, reason: String },

    /// Device is not connected.
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// Device answered with a malformed report.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Polling interval out of range.
    #[error("Invalid polling interval: {0} ms")]
    InvalidInterval(u64),
}
