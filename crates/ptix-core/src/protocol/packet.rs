//! Packet framing, validation and classification.
//!
//! Wire format of a framed packet:
//!
//! ```text
//! [L][P0 .. Pn-1][XOR]     L = n + 1, XOR over the first L bytes
//! ```
//!
//! Device responses carry a control byte (ACK/NAK/...) as `P0`. Reads come
//! back zero-padded to the report length; validation discards that tail.

use std::cell::OnceCell;
use std::fmt;

use tracing::warn;

use super::constants::{
    CONTROL_ACK, CONTROL_NAK, CONTROL_SEQUENCE_ERROR, CONTROL_TIMEOUT, Command,
};

/// Shortest frame that can validate: a length byte and a checksum.
const MIN_FRAME_LEN: usize = 2;

/// Largest payload whose framed length still fits the length byte.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - 1;

/// Wire-level classification of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    PositiveAck,
    NegativeAck,
    SequenceError,
    Timeout,
    /// Device is busy. No control byte maps here; kept for the retry table.
    Busy,
    Malformed,
}

impl PacketType {
    fn from_control(byte: u8) -> Self {
        match byte {
            CONTROL_ACK => PacketType::PositiveAck,
            CONTROL_NAK => PacketType::NegativeAck,
            CONTROL_SEQUENCE_ERROR => PacketType::SequenceError,
            CONTROL_TIMEOUT => PacketType::Timeout,
            _ => PacketType::Malformed,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::PositiveAck => write!(f, "ACK"),
            PacketType::NegativeAck => write!(f, "NAK"),
            PacketType::SequenceError => write!(f, "Sequence Error"),
            PacketType::Timeout => write!(f, "Timeout"),
            PacketType::Busy => write!(f, "Busy"),
            PacketType::Malformed => write!(f, "Malformed"),
        }
    }
}

/// XOR checksum over a byte slice.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Mutable protocol packet.
#[derive(Clone, Default)]
pub struct Packet {
    bytes: Vec<u8>,
    packaged: bool,
    valid: bool,
    kind: OnceCell<PacketType>,
}

impl Packet {
    /// Empty packet. Classifies as [`PacketType::Timeout`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Unframed packet from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }

    /// Unframed packet from a list of command codes.
    pub fn from_commands(commands: &[Command]) -> Self {
        commands.iter().map(|c| c.code()).collect::<Vec<u8>>().into()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_packaged(&self) -> bool {
        self.packaged
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
        self.touch();
    }

    pub fn prepend(&mut self, bytes: &[u8]) {
        self.bytes.splice(0..0, bytes.iter().copied());
        self.touch();
    }

    /// Insert a byte at `index`. An index past the end appends.
    pub fn insert(&mut self, index: usize, byte: u8) {
        let index = index.min(self.bytes.len());
        self.bytes.insert(index, byte);
        self.touch();
    }

    /// Frame the packet in place: prepend the length byte, append the XOR checksum.
    ///
    /// Already-packaged packets are left untouched. A payload longer than
    /// [`MAX_PAYLOAD_LEN`] cannot be framed and stays unpackaged and invalid.
    pub fn package(&mut self) -> &mut Self {
        if self.packaged {
            return self;
        }
        let Ok(framed_len) = u8::try_from(self.bytes.len() + 1) else {
            warn!(len = self.bytes.len(), max = MAX_PAYLOAD_LEN, "Payload too long to frame");
            self.valid = false;
            return self;
        };
        self.bytes.insert(0, framed_len);
        let checksum = xor_checksum(&self.bytes);
        self.bytes.push(checksum);
        self.kind = OnceCell::new();
        self.packaged = true;
        self.valid = true;
        self
    }

    /// Owned variant of [`Packet::package`].
    pub fn packaged(mut self) -> Self {
        self.package();
        self
    }

    /// Check framing and strip HID zero padding.
    ///
    /// On success the buffer holds exactly `[L][..][XOR]` and the packet is
    /// marked packaged and valid. On failure the buffer is left unchanged and
    /// the packet is marked invalid.
    pub fn validate(&mut self) -> bool {
        self.valid = self.check_frame();
        if self.valid {
            let frame_len = self.bytes[0] as usize + 1;
            if self.bytes.len() != frame_len {
                self.bytes.truncate(frame_len);
                self.kind = OnceCell::new();
            }
            self.packaged = true;
        }
        self.valid
    }

    fn check_frame(&self) -> bool {
        if self.bytes.len() < MIN_FRAME_LEN {
            return false;
        }
        let framed = self.bytes[0] as usize;
        if framed == 0 || framed + 1 > self.bytes.len() {
            return false;
        }
        // Anything past the checksum must be report padding.
        if self.bytes[framed + 1..].iter().any(|&b| b != 0) {
            return false;
        }
        xor_checksum(&self.bytes[..framed]) == self.bytes[framed]
    }

    /// Classify the packet by its control byte. Cached per instance.
    pub fn packet_type(&self) -> PacketType {
        *self.kind.get_or_init(|| match self.bytes.len() {
            0 => PacketType::Timeout,
            1 => PacketType::from_control(self.bytes[0]),
            2 => PacketType::Malformed,
            _ => PacketType::from_control(self.bytes[1]),
        })
    }

    /// Classification a caller can act on.
    ///
    /// An empty response is a timeout. Anything that fails frame validation
    /// is malformed, whatever its control byte says.
    pub fn validated_type(&self) -> PacketType {
        if self.bytes.is_empty() {
            return PacketType::Timeout;
        }
        let mut framed = self.clone();
        if framed.validate() {
            framed.packet_type()
        } else {
            PacketType::Malformed
        }
    }

    /// Positive acknowledgement with an intact frame.
    pub fn is_valid_ack(&self) -> bool {
        self.validated_type() == PacketType::PositiveAck
    }

    /// Response payload without framing or the control byte.
    ///
    /// Only a validated positive acknowledgement is stripped; anything else is
    /// returned as an unchanged copy and must be treated as opaque.
    pub fn extract_payload(&self) -> Packet {
        if self.packet_type() != PacketType::PositiveAck {
            return self.clone();
        }
        let mut framed = self.clone();
        if !framed.validate() {
            return self.clone();
        }
        let payload_len = (framed.bytes[0] as usize).saturating_sub(2);
        Packet::from_bytes(&framed.bytes[2..2 + payload_len])
    }

    fn touch(&mut self) {
        self.kind = OnceCell::new();
        self.packaged = false;
        self.valid = false;
    }
}

impl From<Vec<u8>> for Packet {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Self::default()
        }
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Packet {}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet([")?;
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        write!(f, "], packaged={}, valid={})", self.packaged, self.valid)
    }
}
