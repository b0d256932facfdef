//! hidapi-based printer port.
//!
//! The HID library handle is process-wide and created lazily. Enumeration,
//! open and close run under its mutex since the native library is not
//! reentrant for those calls. Report I/O goes straight to the device handle,
//! which the port owns exclusively.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use tracing::{debug, info, instrument, warn};

use super::traits::{PrinterPort, ReportLayout, TransportError};
use crate::config::PrinterConfig;
use crate::protocol::{MAX_PAYLOAD_LEN, Packet};

static HID_API: Mutex<Option<HidApi>> = Mutex::new(None);

fn lock_api() -> MutexGuard<'static, Option<HidApi>> {
    HID_API.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Initialise the HID library once per process.
pub fn ensure_initialized() -> Result<(), TransportError> {
    with_api(|_| Ok(()))
}

fn with_api<R>(
    f: impl FnOnce(&mut HidApi) -> Result<R, TransportError>,
) -> Result<R, TransportError> {
    let mut guard = lock_api();
    let api = match guard.take() {
        Some(api) => api,
        None => {
            let api = HidApi::new().map_err(|e| TransportError::InitFailed(e.to_string()))?;
            debug!("HID library initialised");
            api
        }
    };
    f(guard.insert(api))
}

/// Descriptor of an attached HID interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidDeviceInfo {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: Option<String>,
    pub manufacturer_string: Option<String>,
    pub product_string: Option<String>,
    pub usage_page: u16,
    pub usage: u16,
    pub interface_number: i32,
}

impl From<&hidapi::DeviceInfo> for HidDeviceInfo {
    fn from(info: &hidapi::DeviceInfo) -> Self {
        Self {
            path: info.path().to_string_lossy().into_owned(),
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            serial: info.serial_number().map(str::to_owned),
            manufacturer_string: info.manufacturer_string().map(str::to_owned),
            product_string: info.product_string().map(str::to_owned),
            usage_page: info.usage_page(),
            usage: info.usage(),
            interface_number: info.interface_number(),
        }
    }
}

/// hidapi-backed port.
pub struct HidPort {
    layout: ReportLayout,
    vid: u16,
    pid: u16,
    device: Option<HidDevice>,
}

impl HidPort {
    /// Create a closed port for the configured device.
    pub fn new(config: &PrinterConfig) -> Self {
        Self {
            layout: config.report_layout(),
            vid: config.vendor_id,
            pid: config.product_id,
            device: None,
        }
    }

    /// List attached HID interfaces matching VID/PID.
    #[instrument(level = "debug", skip_all, fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn enumerate(vid: u16, pid: u16) -> Result<Vec<HidDeviceInfo>, TransportError> {
        with_api(|api| {
            api.refresh_devices()
                .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
            Ok(api
                .device_list()
                .filter(|d| d.vendor_id() == vid && d.product_id() == pid)
                .map(HidDeviceInfo::from)
                .collect())
        })
    }

    /// Open the first matching device, reporting why it failed.
    #[instrument(level = "info", skip(self), fields(vid = format!("{:04X}", self.vid), pid = format!("{:04X}", self.pid)))]
    pub fn try_open(&mut self) -> Result<(), TransportError> {
        self.close();

        let (vid, pid) = (self.vid, self.pid);
        let device = with_api(|api| {
            api.refresh_devices()
                .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
            let info = api
                .device_list()
                .find(|d| d.vendor_id() == vid && d.product_id() == pid)
                .ok_or(TransportError::DeviceNotFound { vid, pid })?;
            info!(
                path = %info.path().to_string_lossy(),
                interface = info.interface_number(),
                "Found device"
            );
            api.open_path(info.path())
                .map_err(|e| TransportError::OpenFailed(e.to_string()))
        })?;

        self.device = Some(device);
        info!("Device opened successfully");
        Ok(())
    }

    fn send(&self, packet: &Packet) -> Result<(), TransportError> {
        let device = self.device.as_ref().ok_or(TransportError::NotOpen)?;
        let framed = packet.clone().packaged();
        if !framed.is_packaged() {
            return Err(TransportError::PacketTooLarge {
                len: framed.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        let report = self.layout.frame_out(framed.as_bytes())?;
        let written = device
            .write(&report)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        if written < report.len() {
            return Err(TransportError::WriteFailed(format!(
                "short write: {} of {} bytes",
                written,
                report.len()
            )));
        }
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Packet, TransportError> {
        let device = self.device.as_ref().ok_or(TransportError::NotOpen)?;
        let mut buf = vec![0u8; self.layout.in_report_length];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let n = device
            .read_timeout(&mut buf, timeout_ms)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        Ok(Packet::from_bytes(self.layout.unframe_in(&buf[..n])))
    }
}

impl PrinterPort for HidPort {
    fn open(&mut self) -> bool {
        match self.try_open() {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Open failed");
                false
            }
        }
    }

    fn close(&mut self) {
        if self.device.is_some() {
            let _guard = lock_api();
            self.device = None;
            debug!("Device closed");
        }
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    #[instrument(level = "trace", skip(self, packet), fields(len = packet.len()))]
    fn write(&mut self, packet: &Packet) -> bool {
        match self.send(packet) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Write failed");
                false
            }
        }
    }

    #[instrument(level = "trace", skip(self))]
    fn read(&mut self, timeout: Duration) -> Packet {
        match self.receive(timeout) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Read failed");
                Packet::new()
            }
        }
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

impl Drop for HidPort {
    fn drop(&mut self) {
        self.close();
    }
}
