//! Printer transport abstraction.
//!
//! Defines the `PrinterPort` trait for report-oriented request/response I/O,
//! allowing different implementations (hidapi, mock, etc.).
//!
//! Ports never surface I/O failures as errors once opened: a failed write
//! returns `false` and a failed or timed-out read returns an empty packet,
//! which classifies as [`PacketType::Timeout`](crate::protocol::PacketType).

use std::time::Duration;

use thiserror::Error;

use crate::protocol::Packet;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("HID library initialisation failed: {0}")]
    InitFailed(String),

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Packet of {len} bytes does not fit a {max}-byte report")]
    PacketTooLarge { len: usize, max: usize },

    #[error("Device not open")]
    NotOpen,
}

/// Fixed report geometry of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLayout {
    pub in_report_id: u8,
    pub out_report_id: u8,
    pub in_report_length: usize,
    pub out_report_length: usize,
}

impl ReportLayout {
    /// Build the full output report for a framed packet: report id, then the
    /// packet, zero-padded to the report length.
    pub fn frame_out(&self, framed: &[u8]) -> Result<Vec<u8>, TransportError> {
        let max = self.out_report_length.saturating_sub(1);
        if framed.len() > max {
            return Err(TransportError::PacketTooLarge {
                len: framed.len(),
                max,
            });
        }
        let mut report = vec![0u8; self.out_report_length];
        report[0] = self.out_report_id;
        report[1..1 + framed.len()].copy_from_slice(framed);
        Ok(report)
    }

    /// Strip the report id from an input report.
    pub fn unframe_in<'a>(&self, report: &'a [u8]) -> &'a [u8] {
        report.get(1..).unwrap_or(&[])
    }
}

/// Abstract printer transport.
///
/// One port owns one device handle. The protocol is half-duplex; callers
/// sharing a port across threads must serialise access themselves.
pub trait PrinterPort {
    /// Open the device, closing any previous handle first.
    fn open(&mut self) -> bool;

    /// Release the device handle. Safe to call repeatedly.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Write one packet, packaging a copy first if needed.
    fn write(&mut self, packet: &Packet) -> bool;

    /// Read one response. Empty packet on timeout or failure.
    fn read(&mut self, timeout: Duration) -> Packet;

    /// Build a framed packet in this port's representation.
    fn package(&self, bytes: &[u8]) -> Packet {
        Packet::from_bytes(bytes).packaged()
    }

    /// Build an empty packet in this port's representation.
    fn empty(&self) -> Packet {
        Packet::new()
    }

    fn vendor_id(&self) -> u16;

    fn product_id(&self) -> u16;
}
