//! Typed sensor measurements with min/max and history tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Sensor classification driving unit and divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Temperature, millidegrees Celsius on hwmon.
    Temperature,
    /// Voltage, millivolts on hwmon.
    Voltage,
    /// Fan or pump speed.
    Fan,
    /// Current, milliamperes on hwmon.
    Current,
    /// Power, microwatts on hwmon.
    Power,
    /// Chassis intrusion alarm.
    Intrusion,
    /// Coolant flow.
    Flow,
    /// Anything the classifier does not recognize.
    Unknown,
}

impl SensorKind {
    /// Classifies a sensor from its locator and human label.
    ///
    /// Total and deterministic: every input maps to exactly one kind.
    pub fn classify(locator: &Locator, label: &str) -> Self {
        match locator {
            Locator::File { feature, .. } => Self::from_feature(feature, label),
            Locator::Field { key } => Self::from_field(key),
        }
    }

    /// Classifies an hwmon feature name such as `temp1` or `fan2`.
    fn from_feature(feature: &str, label: &str) -> Self {
        let feature = feature.to_lowercase();

        if feature.contains("temp") {
            SensorKind::Temperature
        } else if feature.contains("fan") {
            // Flow meters are exposed as fan channels
            if label.to_lowercase().contains("flow") {
                SensorKind::Flow
            } else {
                SensorKind::Fan
            }
        } else if feature.contains("curr") {
            SensorKind::Current
        } else if feature.contains("power") {
            SensorKind::Power
        } else if feature.contains("intrusion") {
            SensorKind::Intrusion
        } else if feature.contains("in") {
            SensorKind::Voltage
        } else {
            SensorKind::Unknown
        }
    }

    /// Classifies a cooler status field such as `Pump speed`.
    fn from_field(key: &str) -> Self {
        let key = key.to_lowercase();

        if key.contains("flow") {
            SensorKind::Flow
        } else if key.contains("temp") {
            SensorKind::Temperature
        } else if key.contains("voltage") {
            SensorKind::Voltage
        } else if key.contains("speed") || key.contains("duty") {
            SensorKind::Fan
        } else if key.contains("current") {
            SensorKind::Current
        } else if key.contains("power") {
            SensorKind::Power
        } else {
            SensorKind::Unknown
        }
    }

    /// Returns the divisor applied to raw hwmon values.
    pub fn divisor(&self) -> f64 {
        match self {
            SensorKind::Temperature | SensorKind::Voltage | SensorKind::Current => 1_000.0,
            SensorKind::Power => 1_000_000.0,
            SensorKind::Fan | SensorKind::Flow | SensorKind::Intrusion | SensorKind::Unknown => 1.0,
        }
    }

    /// Returns the display unit for raw hwmon values.
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Voltage => "V",
            SensorKind::Current => "A",
            SensorKind::Power => "W",
            SensorKind::Fan => "RPM",
            SensorKind::Flow | SensorKind::Intrusion | SensorKind::Unknown => "",
        }
    }

    /// Formats a raw value using the divisor/unit table.
    pub fn format(&self, raw: f64) -> String {
        // Debug keeps the trailing ".0" on whole numbers
        let scaled = format!("{:?}", raw / self.divisor());
        match self.unit() {
            "" => scaled,
            unit => format!("{} {}", scaled, unit),
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Temperature => write!(f, "temperature"),
            SensorKind::Voltage => write!(f, "voltage"),
            SensorKind::Fan => write!(f, "fan"),
            SensorKind::Current => write!(f, "current"),
            SensorKind::Power => write!(f, "power"),
            SensorKind::Intrusion => write!(f, "intrusion"),
            SensorKind::Flow => write!(f, "flow"),
            SensorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Backend-specific address used to re-read a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// An hwmon `*_input` file and its feature name (e.g. `temp1`).
    File { path: PathBuf, feature: String },
    /// A field of a cooler status report.
    Field { key: String },
}

impl Locator {
    /// Returns the short key identifying the sensor within its device.
    pub fn key(&self) -> &str {
        match self {
            Locator::File { feature, .. } => feature,
            Locator::Field { key } => key,
        }
    }
}

/// Raw value delivered by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// A numeric sample.
    Value(f64),
    /// Content that could not be interpreted as a number.
    Invalid(String),
}

impl Reading {
    /// Parses the text content of an hwmon sensor file.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.parse::<i64>() {
            Ok(value) => Reading::Value(value as f64),
            Err(_) => Reading::Invalid(text.to_string()),
        }
    }
}

/// One point of a sensor's time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    /// When the sample was taken.
    pub at: DateTime<Utc>,
    /// Sampled value, `0.0` for failed reads.
    pub value: f64,
}

/// Running extrema of a sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Extrema {
    /// No numeric read yet.
    Unset,
    /// Bounds over every numeric read so far.
    Bounds { min: f64, max: f64 },
    /// A non-numeric read happened; bounds are no longer meaningful.
    Unavailable,
}

/// A single named, typed measurement.
#[derive(Debug, Clone)]
pub struct Sensor {
    label: String,
    kind: SensorKind,
    locator: Locator,
    unit: Option<String>,
    value: Option<f64>,
    extrema: Extrema,
    history: VecDeque<HistoryPoint>,
    history_limit: Option<usize>,
}

impl Sensor {
    /// Creates a sensor, classifying it once from its locator and label.
    ///
    /// `unit` is set by backends that report their own units; it replaces the
    /// divisor/unit table when formatting.
    pub fn new(label: &str, locator: Locator, unit: Option<String>) -> Self {
        let label = label.trim().to_string();
        let kind = SensorKind::classify(&locator, &label);
        debug!("New {} sensor '{}' at {:?}", kind, label, locator);

        Self {
            label,
            kind,
            locator,
            unit,
            value: None,
            extrema: Extrema::Unset,
            history: VecDeque::new(),
            history_limit: None,
        }
    }

    /// Returns the human-readable label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the sensor classification.
    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Returns the locator used to re-read this sensor.
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Returns the backend-supplied unit, if any.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Returns the current value, `None` if the last read was not numeric.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Returns the lowest value seen, `None` when unavailable.
    pub fn min(&self) -> Option<f64> {
        match self.extrema {
            Extrema::Bounds { min, .. } => Some(min),
            _ => None,
        }
    }

    /// Returns the highest value seen, `None` when unavailable.
    pub fn max(&self) -> Option<f64> {
        match self.extrema {
            Extrema::Bounds { max, .. } => Some(max),
            _ => None,
        }
    }

    /// Returns the recorded time series, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &HistoryPoint> {
        self.history.iter()
    }

    /// Caps the history length. `None` keeps every point.
    pub fn set_history_limit(&mut self, limit: Option<usize>) {
        self.history_limit = limit;
        self.trim_history();
    }

    /// Applies a new reading.
    pub fn update(&mut self, reading: Reading) {
        let now = Utc::now();

        match reading {
            Reading::Value(value) => {
                self.value = Some(value);
                self.extrema = match self.extrema {
                    Extrema::Unset => Extrema::Bounds {
                        min: value,
                        max: value,
                    },
                    Extrema::Bounds { min, max } => Extrema::Bounds {
                        min: min.min(value),
                        max: max.max(value),
                    },
                    Extrema::Unavailable => Extrema::Unavailable,
                };
                self.history.push_back(HistoryPoint { at: now, value });
            }
            Reading::Invalid(raw) => {
                debug!("Sensor '{}' returned non-numeric value {:?}", self.label, raw);
                self.value = None;
                self.extrema = Extrema::Unavailable;
                // Keep series aligned with the poll count
                self.history.push_back(HistoryPoint { at: now, value: 0.0 });
            }
        }

        self.trim_history();
    }

    /// Formats a value of this sensor for display.
    pub fn format(&self, value: Option<f64>) -> String {
        let Some(value) = value else {
            return "N/A".to_string();
        };

        match &self.unit {
            Some(unit) if unit.is_empty() => format!("{}", round2(value)),
            Some(unit) => format!("{} {}", round2(value), unit),
            None => self.kind.format(value),
        }
    }

    /// Returns true if this sensor should be listed in display views.
    ///
    /// Readings of exactly zero are hidden.
    pub fn is_displayed(&self) -> bool {
        self.value != Some(0.0)
    }

    fn trim_history(&mut self) {
        if let Some(limit) = self.history_limit {
            while self.history.len() > limit {
                self.history.pop_front();
            }
        }
    }
}

/// Rounds to two decimals, as cooler values are reported.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
