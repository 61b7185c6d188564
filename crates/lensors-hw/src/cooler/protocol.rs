//! Kraken X3 protocol definitions and decoding.
//!
//! Protocol structure:
//! - Report size: 64 bytes, zero padded
//! - Commands: 0x10 (firmware info), 0x70 (configure), 0x74 (status request)
//! - Replies: 0x11 (firmware info), 0x75 (status)
//! - Status report: liquid temperature at bytes 15-16 (integer, tenths),
//!   pump speed at bytes 17-18 (little-endian rpm), pump duty at byte 19

use super::{StatusEntry, StatusValue};
use crate::{Error, Result};

/// NZXT USB vendor ID.
pub const NZXT_VID: u16 = 0x1E71;

/// Kraken X53/X63/X73 product ID.
pub const KRAKEN_X3_PID: u16 = 0x2007;

/// HID report size in both directions.
pub const REPORT_SIZE: usize = 64;

/// Interval at which the device pushes status reports, in seconds.
pub const STATUS_INTERVAL_SECS: f64 = 0.5;

/// Field names of the status report.
pub const LIQUID_TEMPERATURE: &str = "Liquid temperature";
pub const PUMP_SPEED: &str = "Pump speed";
pub const PUMP_DUTY: &str = "Pump duty";

/// Host to device commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Request firmware information.
    FirmwareInfo = 0x10,
    /// Configuration commands.
    Configure = 0x70,
    /// Request a status report.
    Status = 0x74,
}

/// Device to host replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reply {
    /// Firmware information.
    FirmwareInfo = 0x11,
    /// Status report.
    Status = 0x75,
}

/// Builds a zero-padded report from a command prefix.
fn build_report(prefix: &[u8]) -> [u8; REPORT_SIZE] {
    let mut buffer = [0u8; REPORT_SIZE];
    buffer[..prefix.len()].copy_from_slice(prefix);
    buffer
}

/// Builds the firmware information request.
pub fn build_firmware_request() -> [u8; REPORT_SIZE] {
    build_report(&[Command::FirmwareInfo as u8, 0x01])
}

/// Converts a status push interval in seconds to its protocol byte.
pub fn interval_byte(secs: f64) -> u8 {
    let secs = secs.max(STATUS_INTERVAL_SECS);
    (1.0 + ((secs - 0.5) / 0.25).round()).min(u8::MAX as f64) as u8
}

/// Builds the packet setting the status push interval.
pub fn build_interval_packet(secs: f64) -> [u8; REPORT_SIZE] {
    build_report(&[Command::Configure as u8, 0x02, 0x01, 0xB8, interval_byte(secs)])
}

/// Builds the packet applying the configuration.
pub fn build_apply_packet() -> [u8; REPORT_SIZE] {
    build_report(&[Command::Configure as u8, 0x01])
}

/// Builds the status request.
pub fn build_status_request() -> [u8; REPORT_SIZE] {
    build_report(&[Command::Status as u8, 0x01])
}

/// Returns true if `report` is a reply of the given type.
pub fn is_reply(report: &[u8], reply: Reply) -> bool {
    report.len() >= 2 && report[0] == reply as u8 && report[1] == 0x01
}

/// Decodes the firmware version from a firmware information reply.
pub fn parse_firmware(report: &[u8]) -> Option<String> {
    if !is_reply(report, Reply::FirmwareInfo) || report.len() < 0x14 {
        return None;
    }
    Some(format!("{}.{}.{}", report[0x11], report[0x12], report[0x13]))
}

/// Decodes a status report into `(key, value, unit)` entries.
pub fn parse_status(report: &[u8]) -> Result<Vec<StatusEntry>> {
    if !is_reply(report, Reply::Status) {
        return Err(Error::Protocol(format!(
            "unexpected report {:02X?}",
            &report[..report.len().min(2)]
        )));
    }

    if report.len() < 20 {
        return Err(Error::Protocol(format!(
            "status report too short ({} bytes)",
            report.len()
        )));
    }

    // 0xFFFF marks a missing liquid temperature reading
    let temperature = if report[15] == 0xFF && report[16] == 0xFF {
        StatusEntry {
            key: LIQUID_TEMPERATURE.to_string(),
            value: StatusValue::Text("unavailable".to_string()),
            unit: "°C".to_string(),
        }
    } else {
        StatusEntry::number(
            LIQUID_TEMPERATURE,
            report[15] as f64 + report[16] as f64 / 10.0,
            "°C",
        )
    };

    let pump_speed = u16::from_le_bytes([report[17], report[18]]);

    Ok(vec![
        temperature,
        StatusEntry::number(PUMP_SPEED, pump_speed as f64, "rpm"),
        StatusEntry::number(PUMP_DUTY, report[19] as f64, "%"),
    ])
}
