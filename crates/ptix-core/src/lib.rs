//! PTIX-Core: host-side driver for the PTIX USB-HID thermal printer family.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Command codes, control bytes, packet framing and classification
//! - **Transport**: HID port abstraction (hidapi, mock)
//! - **Parsers**: Typed decoders for device replies and a type-indexed registry
//! - **Reader**: Paginated structured reads
//! - **Firmware**: `.ptix` header parsing and checksum verification
//! - **Flash**: Packetizer and the retrying flash stream state machine
//! - **Events**: Observer pattern for UI decoupling
//! - **Printer**: High-level facade
//!
//! # Example
//!
//! ```no_run
//! use ptix_core::{Printer, PrinterConfig, ReturnCode};
//!
//! let mut printer = Printer::hid(PrinterConfig::default());
//! if printer.connect() {
//!     let code = printer.flash_update("update.ptix").expect("read firmware");
//!     assert_eq!(code, ReturnCode::Okay);
//! }
//! ```

pub mod config;
pub mod events;
pub mod firmware;
pub mod flash;
pub mod parsers;
pub mod printer;
pub mod protocol;
pub mod reader;
pub mod status;
pub mod transport;

// Re-exports for convenience
pub use config::PrinterConfig;
pub use events::{LogLevel, NullObserver, Phase, PtixEvent, PtixObserver, TracingObserver};
pub use firmware::{FirmwareError, FirmwareImage, PtixHeader};
pub use flash::{FlashState, FlashStreamer, FlashTracker, PacketizeError};
pub use parsers::{
    LifetimeTelemetry, PacketParser, ParserRegistry, PowerupTelemetry, RegistryError, Revlev,
    SerialConfig,
};
pub use printer::Printer;
pub use protocol::{Command, Packet, PacketType};
pub use reader::StructuredReader;
pub use status::ReturnCode;
#[cfg(feature = "hid")]
pub use transport::{HidDeviceInfo, HidPort};
pub use transport::{MockPort, PrinterPort, TransportError};
