//! Operation result codes.

use std::fmt;

/// Outcome of a printer operation.
///
/// Device-level failures are reported in-band through these codes; only file
/// I/O surfaces as an `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// Completed end to end, checksum verification included.
    Okay,
    /// Empty packet queue handed to the flash streamer.
    InvalidRequestPayload,
    /// File failed header validation or its checksum.
    FlashFileInvalid,
    /// File is well formed but built for a different model.
    FlashPermissionDenied,
    /// Device checksums disagree after a complete transfer.
    FlashChecksumMismatch,
    /// Retry budget exhausted, cancelled, or the packet queue was inconsistent.
    OperationAborted,
    /// A required read came back empty or unparsable.
    TargetStoppedResponding,
    /// A one-shot command was not acknowledged.
    ExecutionFailure,
}

impl ReturnCode {
    pub fn is_okay(self) -> bool {
        self == ReturnCode::Okay
    }

    /// Map an acknowledgement flag to `Okay` / `ExecutionFailure`.
    pub fn from_ack(acked: bool) -> Self {
        if acked {
            ReturnCode::Okay
        } else {
            ReturnCode::ExecutionFailure
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReturnCode::Okay => "okay",
            ReturnCode::InvalidRequestPayload => "invalid request payload",
            ReturnCode::FlashFileInvalid => "flash file invalid",
            ReturnCode::FlashPermissionDenied => "flash permission denied",
            ReturnCode::FlashChecksumMismatch => "flash checksum mismatch",
            ReturnCode::OperationAborted => "operation aborted",
            ReturnCode::TargetStoppedResponding => "target stopped responding",
            ReturnCode::ExecutionFailure => "execution failure",
        };
        f.write_str(text)
    }
}
