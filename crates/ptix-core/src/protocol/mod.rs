//! Protocol module - PTIX wire protocol definitions.

pub mod constants;
pub mod packet;

pub use constants::*;
pub use packet::{MAX_PAYLOAD_LEN, Packet, PacketType, xor_checksum};
