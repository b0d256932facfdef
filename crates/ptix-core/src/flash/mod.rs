//! Flash update: packetizing and the retrying stream state machine.

pub mod packetizer;
pub mod streamer;
pub mod tracker;

use std::fmt;

pub use packetizer::{PacketizeError, firmware_packets, logo_packets, skip_to_next_block};
pub use streamer::FlashStreamer;
pub use tracker::FlashTracker;

/// Flash streamer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashState {
    /// Send the next queued packet.
    #[default]
    Next,
    /// Resend the current packet.
    Retry,
    /// Drop packets up to the next block request.
    SkipThisBlock,
    /// Queue exhausted.
    Success,
    /// Retry budget exceeded.
    Giveup,
}

impl FlashState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FlashState::Success | FlashState::Giveup)
    }
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashState::Next => write!(f, "NEXT"),
            FlashState::Retry => write!(f, "RETRY"),
            FlashState::SkipThisBlock => write!(f, "SKIP_THIS_BLOCK"),
            FlashState::Success => write!(f, "SUCCESS"),
            FlashState::Giveup => write!(f, "GIVEUP"),
        }
    }
}
