//! Firmware revision level.

use byteorder::{BigEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

use super::PacketParser;
use crate::protocol::Packet;

/// Firmware revision `major.minor.build`.
///
/// The zero revision stands for "not connected".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revlev {
    pub major: u16,
    pub minor: u16,
    pub build: u32,
}

impl Revlev {
    /// Payload size of a revision reply.
    pub const SIZE: usize = 8;

    pub fn new(major: u16, minor: u16, build: u32) -> Self {
        Self {
            major,
            minor,
            build,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for Revlev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Parses `[major u16][minor u16][build u32]`, big-endian.
#[derive(Debug, Default, Clone, Copy)]
pub struct RevlevParser;

impl PacketParser for RevlevParser {
    type Output = Revlev;

    fn parse(&self, packet: &Packet) -> Option<Revlev> {
        if packet.len() < Revlev::SIZE {
            return Some(Revlev::default());
        }
        let mut cursor = Cursor::new(packet.as_bytes());
        let major = cursor.read_u16::<BigEndian>().ok()?;
        let minor = cursor.read_u16::<BigEndian>().ok()?;
        let build = cursor.read_u32::<BigEndian>().ok()?;
        Some(Revlev::new(major, minor, build))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_revlev() {
        let packet = Packet::from_bytes(&[0, 1, 0, 12, 0, 0, 0x01, 0x2C]);
        let rev = RevlevParser.parse(&packet).unwrap();
        assert_eq!(rev, Revlev::new(1, 12, 300));
        assert_eq!(rev.to_string(), "1.12.300");
    }

    #[test]
    fn test_short_packet_is_zero_revision() {
        for len in 0..Revlev::SIZE {
            let packet = Packet::from(vec![0x11; len]);
            let rev = RevlevParser.parse(&packet).unwrap();
            assert!(rev.is_zero());
            assert_eq!(rev.to_string(), "0.0.0");
        }
    }

    #[test]
    fn test_ordering() {
        assert!(Revlev::new(1, 2, 0) > Revlev::new(1, 1, 999));
    }
}
