//! Serial port configuration of the printer.

use byteorder::{BigEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

use super::PacketParser;
use crate::protocol::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl Parity {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Parity::None),
            1 => Some(Parity::Odd),
            2 => Some(Parity::Even),
            _ => None,
        }
    }

    fn code(self) -> u8 {
        match self {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    None,
    XonXoff,
    RtsCts,
}

impl Handshake {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Handshake::None),
            1 => Some(Handshake::XonXoff),
            2 => Some(Handshake::RtsCts),
            _ => None,
        }
    }

    fn code(self) -> u8 {
        match self {
            Handshake::None => 0,
            Handshake::XonXoff => 1,
            Handshake::RtsCts => 2,
        }
    }
}

/// Serial line settings.
///
/// Wire layout (8 bytes): `[baud u32 BE][data bits][parity][stop bits][handshake]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub handshake: Handshake,
}

impl SerialConfig {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..4].copy_from_slice(&self.baud_rate.to_be_bytes());
        bytes[4] = self.data_bits;
        bytes[5] = self.parity.code();
        bytes[6] = self.stop_bits;
        bytes[7] = self.handshake.code();
        bytes
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 19200,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            handshake: Handshake::None,
        }
    }
}

impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        write!(
            f,
            "{} {}{}{} ({:?})",
            self.baud_rate, self.data_bits, parity, self.stop_bits, self.handshake
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConfigParser;

impl PacketParser for SerialConfigParser {
    type Output = SerialConfig;

    fn parse(&self, packet: &Packet) -> Option<SerialConfig> {
        let bytes = packet.as_bytes();
        if bytes.len() < SerialConfig::SIZE {
            return None;
        }
        let baud_rate = Cursor::new(bytes).read_u32::<BigEndian>().ok()?;
        Some(SerialConfig {
            baud_rate,
            data_bits: bytes[4],
            parity: Parity::from_code(bytes[5])?,
            stop_bits: bytes[6],
            handshake: Handshake::from_code(bytes[7])?,
        })
    }
}
