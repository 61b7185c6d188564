//! hwmon discovery and sensor file reads.

use crate::backend::SourceBackend;
use crate::device::{Device, DeviceId, DeviceLink, Sample};
use crate::sensor::{Locator, Reading, Sensor};
use crate::{Error, Result, HWMON_ROOT};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix of files holding a live reading.
const INPUT_SUFFIX: &str = "_input";

/// Suffix of files holding a human label.
const LABEL_SUFFIX: &str = "_label";

/// Filesystem-backed source rooted at an hwmon class directory.
#[derive(Debug, Clone)]
pub struct HwmonSource {
    root: PathBuf,
}

impl HwmonSource {
    /// Creates a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a source rooted at `/sys/class/hwmon`.
    pub fn system() -> Self {
        Self::new(HWMON_ROOT)
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds a device from one hwmon directory.
    ///
    /// Sensors whose first read fails are skipped.
    fn discover_device(&self, dir: &Path) -> io::Result<Device> {
        let name = read_trimmed(&dir.join("name"))?;
        let mut device = Device::new(
            DeviceId::new(dir.display().to_string()),
            &name,
            Box::new(HwmonLink),
        );

        for path in sorted_entries(dir)? {
            let Some(feature) = path
                .file_name()
                .and_then(|f| f.to_str())
                .and_then(|f| f.strip_suffix(INPUT_SUFFIX))
                .map(str::to_string)
            else {
                continue;
            };

            if !path.is_file() {
                continue;
            }

            let label = read_trimmed(&dir.join(format!("{}{}", feature, LABEL_SUFFIX)))
                .ok()
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| feature.clone());

            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            let mut sensor = Sensor::new(&label, Locator::File { path, feature }, None);
            sensor.update(Reading::parse(&content));
            device.add(sensor);
        }

        Ok(device)
    }
}

impl Default for HwmonSource {
    fn default() -> Self {
        Self::system()
    }
}

impl SourceBackend for HwmonSource {
    fn name(&self) -> &str {
        "hwmon"
    }

    fn discover(&mut self, _known: &[DeviceId]) -> Vec<Device> {
        let dirs = match sorted_entries(&self.root) {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!("Cannot list {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        let mut devices = Vec::new();
        for dir in dirs.into_iter().filter(|d| d.is_dir()) {
            match self.discover_device(&dir) {
                Ok(device) => {
                    debug!(
                        "Found hwmon device {} at {} ({} sensors)",
                        device.name(),
                        dir.display(),
                        device.sensors().len()
                    );
                    devices.push(device);
                }
                Err(e) => warn!("Skipping hwmon device {}: {}", dir.display(), e),
            }
        }

        info!(
            "hwmon discovery found {} devices under {}",
            devices.len(),
            self.root.display()
        );
        devices
    }
}

/// Reads hwmon sensor files.
#[derive(Debug, Clone, Copy, Default)]
pub struct HwmonLink;

impl DeviceLink for HwmonLink {
    fn read(&mut self, locators: &[Locator]) -> Result<Vec<Sample>> {
        locators
            .iter()
            .map(|locator| {
                let Locator::File { path, feature } = locator else {
                    return Err(Error::Protocol(format!(
                        "{} is not an hwmon sensor",
                        locator.key()
                    )));
                };

                let content = fs::read_to_string(path)?;
                Ok(Sample {
                    locator: locator.clone(),
                    label: feature.clone(),
                    unit: None,
                    reading: Reading::parse(&content),
                })
            })
            .collect()
    }
}

/// Lists a directory, sorted by name for a stable discovery order.
fn sorted_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    Ok(entries)
}

fn read_trimmed(path: &Path) -> io::Result<String> {
    fs::read_to_string(path).map(|s| s.trim().to_string())
}
