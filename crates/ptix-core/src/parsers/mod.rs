//! Binary parsers for device responses.
//!
//! Parsers run on extracted payloads (see [`Packet::extract_payload`]).
//! Short or malformed input is routine on this bus, so a parser answers
//! `None` (or a documented sentinel) instead of failing.

pub mod registry;
pub mod revlev;
pub mod serial;
pub mod telemetry;

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::protocol::Packet;

pub use registry::{ParserRegistry, RegistryError};
pub use revlev::{Revlev, RevlevParser};
pub use serial::{Handshake, Parity, SerialConfig, SerialConfigParser};
pub use telemetry::{
    LifetimeTelemetry, LifetimeTelemetryParser, PowerupTelemetry, PowerupTelemetryParser,
    TelemetryCore,
};

/// Parser from a response payload to a typed value.
pub trait PacketParser {
    type Output;

    fn parse(&self, packet: &Packet) -> Option<Self::Output>;
}

/// Device checksum reply: one big-endian u32.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumParser;

impl PacketParser for ChecksumParser {
    type Output = u32;

    fn parse(&self, packet: &Packet) -> Option<u32> {
        if packet.len() < 4 {
            return None;
        }
        Cursor::new(packet.as_bytes()).read_u32::<BigEndian>().ok()
    }
}
