//! Configuration management.

use anyhow::{Context, Result};
use lensors_hw::{tree::DEFAULT_HISTORY_LIMIT, TreeOptions, DEFAULT_POLL_MS, HWMON_ROOT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Polling interval in milliseconds
    #[serde(default = "default_poll")]
    pub poll: u64,

    /// History points kept per sensor (0 = unbounded)
    #[serde(default = "default_history")]
    pub history: usize,

    /// Hide sensors reading exactly zero
    #[serde(default = "default_true")]
    pub hide_zero: bool,

    /// hwmon backend configuration
    #[serde(default)]
    pub hwmon: HwmonConfig,

    /// USB cooler backend configuration
    #[serde(default)]
    pub cooler: CoolerConfig,

    /// D-Bus configuration
    #[serde(default)]
    pub dbus: DbusConfig,
}

/// hwmon backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HwmonConfig {
    /// Discover hwmon devices
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Root of the hwmon class directory
    #[serde(default = "default_hwmon_root")]
    pub root: String,
}

impl Default for HwmonConfig {
    fn default() -> Self {
        Self {
            enable: true,
            root: default_hwmon_root(),
        }
    }
}

/// USB cooler backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoolerConfig {
    /// Discover USB liquid coolers
    #[serde(default = "default_true")]
    pub enable: bool,
}

impl Default for CoolerConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}

/// Message bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
    /// Session bus when one is running, else the system bus.
    #[default]
    Auto,
}

/// D-Bus configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DbusConfig {
    #[serde(default)]
    pub bus: BusKind,
}

// Default value functions
fn default_poll() -> u64 {
    DEFAULT_POLL_MS
}

fn default_history() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_true() -> bool {
    true
}

fn default_hwmon_root() -> String {
    HWMON_ROOT.to_string()
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Loads configuration, writing the defaults to `path` if it is missing.
    ///
    /// A default file that cannot be written is logged and otherwise ignored.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let config = Self::load(path)?;
            info!("Loaded configuration from: {}", path.display());
            return Ok(config);
        }

        let config = Self::default();
        match config.save(path) {
            Ok(()) => info!("Wrote default configuration to {}", path.display()),
            Err(e) => warn!("{} not found, using defaults ({:#})", path.display(), e),
        }
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
        Ok(())
    }

    /// Returns the polling period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll)
    }

    /// Returns the registry options.
    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            history_limit: (self.history > 0).then_some(self.history),
            hide_zero: self.hide_zero,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll: default_poll(),
            history: default_history(),
            hide_zero: true,
            hwmon: HwmonConfig::default(),
            cooler: CoolerConfig::default(),
            dbus: DbusConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.hwmon.root, "/sys/class/hwmon");
        assert_eq!(config.tree_options(), TreeOptions::default());
    }

    #[test]
    fn test_partial_config() {
        let config: Config = toml::from_str(
            r#"
            poll = 250
            history = 0

            [cooler]
            enable = false

            [dbus]
            bus = "system"
            "#,
        )
        .unwrap();

        assert_eq!(config.poll, 250);
        assert!(!config.cooler.enable);
        assert!(config.hwmon.enable);
        assert_eq!(config.dbus.bus, BusKind::System);
        assert_eq!(config.tree_options().history_limit, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lensors.toml");

        let config = Config {
            poll: 500,
            hide_zero: false,
            ..Config::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_initialized_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lensors.toml");

        let config = Config::load_or_init(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lensors.toml");
        std::fs::write(&path, "poll = 250\n").unwrap();

        assert_eq!(Config::load_or_init(&path).unwrap().poll, 250);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "poll = 250\n");
    }

    #[test]
    fn test_unwritable_location_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("lensors.toml");

        assert_eq!(Config::load_or_init(&path).unwrap(), Config::default());
        assert!(!path.exists());
    }
}
