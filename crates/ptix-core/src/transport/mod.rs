//! Transport layer module.

#[cfg(feature = "hid")]
pub mod hid;
pub mod mock;
pub mod traits;

#[cfg(feature = "hid")]
pub use hid::{HidDeviceInfo, HidPort, ensure_initialized};
pub use mock::MockPort;
pub use traits::{PrinterPort, ReportLayout, TransportError};
