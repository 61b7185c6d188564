//! Cooler communication via USB HID.

use super::protocol::{
    build_apply_packet, build_firmware_request, build_interval_packet, build_status_request,
    is_reply, parse_firmware, parse_status, Reply, KRAKEN_X3_PID, NZXT_VID, REPORT_SIZE,
    STATUS_INTERVAL_SECS,
};
use super::{CoolerBus, CoolerHandle, StatusEntry};
use crate::{Error, Result};
use hidapi::{HidApi, HidDevice};
use std::ffi::CString;
use tracing::{debug, info};

/// Read timeout for a single report, in milliseconds.
const READ_TIMEOUT_MS: i32 = 500;

/// Reports read while waiting for a specific reply before giving up.
const MAX_READS: usize = 8;

/// Enumerates supported coolers through hidapi.
#[derive(Debug, Default)]
pub struct HidCoolerBus;

impl HidCoolerBus {
    /// Creates a bus.
    pub fn new() -> Self {
        Self
    }
}

impl CoolerBus for HidCoolerBus {
    fn list_devices(&mut self) -> Result<Vec<Box<dyn CoolerHandle>>> {
        let api = HidApi::new()?;

        let handles: Vec<Box<dyn CoolerHandle>> = api
            .device_list()
            .filter(|d| d.vendor_id() == NZXT_VID && d.product_id() == KRAKEN_X3_PID)
            .map(|d| {
                debug!(
                    "Found Kraken X3: path={:?}, interface={}",
                    d.path(),
                    d.interface_number()
                );
                Box::new(KrakenX3::new(d.path().to_owned())) as Box<dyn CoolerHandle>
            })
            .collect();

        Ok(handles)
    }
}

/// NZXT Kraken X53/X63/X73 liquid cooler.
pub struct KrakenX3 {
    path: CString,
    device: Option<HidDevice>,
    firmware: Option<String>,
}

impl KrakenX3 {
    /// Creates a handle for the device at a HID path. Nothing is opened yet.
    pub fn new(path: CString) -> Self {
        Self {
            path,
            device: None,
            firmware: None,
        }
    }

    /// Returns the firmware version read during initialization.
    pub fn firmware(&self) -> Option<&str> {
        self.firmware.as_deref()
    }

    fn device(&self) -> Result<&HidDevice> {
        self.device
            .as_ref()
            .ok_or_else(|| Error::Disconnected(self.address()))
    }

    fn write(&self, packet: &[u8; REPORT_SIZE]) -> Result<()> {
        self.device()?.write(packet)?;
        debug!("Kraken X3 write: {:02X?}", &packet[..5]);
        Ok(())
    }

    /// Drops reports the device pushed since the last read.
    fn clear_enqueued_reports(&self) -> Result<()> {
        let device = self.device()?;
        let mut buffer = [0u8; REPORT_SIZE];
        while device.read_timeout(&mut buffer, 0)? > 0 {}
        Ok(())
    }

    /// Reads until a reply of the given type arrives.
    fn read_reply(&self, reply: Reply) -> Result<[u8; REPORT_SIZE]> {
        let device = self.device()?;
        let mut buffer = [0u8; REPORT_SIZE];

        for _ in 0..MAX_READS {
            let read = device.read_timeout(&mut buffer, READ_TIMEOUT_MS)?;
            if read == 0 {
                return Err(Error::Disconnected(format!(
                    "{}: no reply within {} ms",
                    self.address(),
                    READ_TIMEOUT_MS
                )));
            }
            if is_reply(&buffer[..read], reply) {
                return Ok(buffer);
            }
            debug!("Kraken X3 skipping report {:02X?}", &buffer[..2]);
        }

        Err(Error::Protocol(format!("no {:?} reply from {}", reply, self.address())))
    }
}

impl CoolerHandle for KrakenX3 {
    fn address(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn description(&self) -> String {
        "NZXT Kraken X (X53, X63 or X73)".to_string()
    }

    fn connect(&mut self) -> Result<()> {
        let api = HidApi::new()?;
        let device = api
            .open_path(self.path.as_c_str())
            .map_err(|_| Error::DeviceNotFound(self.address()))?;

        info!("Kraken X3 opened at path: {}", self.address());
        self.device = Some(device);
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        self.clear_enqueued_reports()?;
        self.write(&build_firmware_request())?;
        self.write(&build_interval_packet(STATUS_INTERVAL_SECS))?;
        self.write(&build_apply_packet())?;

        let reply = self.read_reply(Reply::FirmwareInfo).map_err(|e| Error::Handshake {
            device: self.address(),
            reason: e.to_string(),
        })?;

        let firmware = parse_firmware(&reply).ok_or_else(|| Error::Handshake {
            device: self.address(),
            reason: "malformed firmware reply".to_string(),
        })?;

        info!("Kraken X3 firmware {}", firmware);
        self.firmware = Some(firmware);
        Ok(())
    }

    fn get_status(&mut self) -> Result<Vec<StatusEntry>> {
        self.clear_enqueued_reports()?;
        self.write(&build_status_request())?;
        let report = self.read_reply(Reply::Status)?;
        parse_status(&report)
    }

    fn disconnect(&mut self) {
        if self.device.take().is_some() {
            info!("Kraken X3 closed at path: {}", self.address());
        }
    }
}
