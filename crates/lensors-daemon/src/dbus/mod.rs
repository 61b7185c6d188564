//! D-Bus interface for the Lensors daemon.
//!
//! Provides the `org.lensors.Daemon1` interface on the session or system bus.

mod interface;

pub use interface::run_dbus_server;
