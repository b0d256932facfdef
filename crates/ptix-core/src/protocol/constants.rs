//! Protocol constants for the PTIX thermal printer family.

use std::fmt;

// ============================================================================
// Device Identification
// ============================================================================

/// Default USB vendor ID of the printer family.
pub const PTIX_VENDOR_ID: u16 = 0x0425;
/// Default USB product ID (application firmware).
pub const PTIX_PRODUCT_ID: u16 = 0x8147;

// ============================================================================
// HID Reports
// ============================================================================

/// Report id used for host -> device reports.
pub const OUT_REPORT_ID: u8 = 1;
/// Report id used for device -> host reports.
pub const IN_REPORT_ID: u8 = 2;
/// Total HID report length, report id included.
pub const REPORT_LENGTH: usize = 34;
/// Largest framed packet the device accepts in one report.
pub const HID_MAX_PACKET: usize = 0x20;

// ============================================================================
// Timeouts (milliseconds)
// ============================================================================

pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;
pub const FLASH_TIMEOUT_MS: u64 = 200;
pub const STRUCTURED_READ_TIMEOUT_MS: u64 = 50;

/// Retries allowed across one flash operation before giving up.
pub const DEFAULT_RETRY_LIMIT: u32 = 5;

// ============================================================================
// Flash Geometry
// ============================================================================

/// Firmware flash block size.
pub const FIRMWARE_BLOCK_SIZE: usize = 0x800;
/// Firmware data bytes per FlashDo segment.
pub const FIRMWARE_SEGMENT_SIZE: usize = 28;

/// Logo/data flash block alignment.
pub const LOGO_BLOCK_SIZE: usize = 0x1000;
/// Logo data bytes per FlashDo segment: one report minus command, sequence and framing.
pub const LOGO_SEGMENT_SIZE: usize = HID_MAX_PACKET - 4;

/// Sub-command selecting the whole-image checksum.
pub const CHECKSUM_SUBCOMMAND: u8 = 0x11;

/// Structured-read selectors for telemetry.
pub const TELEMETRY_POWERUP: u8 = 0x01;
pub const TELEMETRY_LIFETIME: u8 = 0x02;

// ============================================================================
// Control Bytes (Device -> Host)
// ============================================================================

pub const CONTROL_ACK: u8 = 0xAA;
pub const CONTROL_SEQUENCE_ERROR: u8 = 0xAB;
pub const CONTROL_NAK: u8 = 0xAC;
pub const CONTROL_TIMEOUT: u8 = 0xFF;

/// Command codes (Host -> Device).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    GetRevlev = 0x15,
    Reboot = 0x25,
    FlashRequest = 0x35,
    InjectIdMatrix = 0x45,
    FlashDo = 0x55,
    GetTelemetry = 0x65,
    GetSerialConfig = 0x6C,
    SetSerialConfig = 0x6D,
    Ping = 0x75,
    DataWriteRequest = 0x79,
    GetExpectedCsum = 0x85,
    GetActualCsum = 0x95,
}

impl Command {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Commands that open a new flash block.
    pub fn is_block_request(code: u8) -> bool {
        code == Command::FlashRequest.code() || code == Command::DataWriteRequest.code()
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> Self {
        cmd.code()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_fit_sequence_byte() {
        assert!(FIRMWARE_BLOCK_SIZE.div_ceil(FIRMWARE_SEGMENT_SIZE) < 256);
        assert!(LOGO_BLOCK_SIZE.div_ceil(LOGO_SEGMENT_SIZE) < 256);
    }

    #[test]
    fn test_block_request_codes() {
        assert!(Command::is_block_request(0x35));
        assert!(Command::is_block_request(0x79));
        assert!(!Command::is_block_request(Command::FlashDo.code()));
    }
}
