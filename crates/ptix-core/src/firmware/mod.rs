//! Firmware image loading and verification.

pub mod header;

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

pub use header::{PTIX_CRC_SKIP, PTIX_CRC_TRAILER, PTIX_HEADER_LEN, PTIX_MAGIC, PtixHeader};

#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid PTIX header (magic or size mismatch)")]
    HeaderInvalid,
    #[error("Checksum mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// A PTIX firmware file held in memory.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
    header: PtixHeader,
}

impl FirmwareImage {
    /// Wrap raw file contents. Validity is reported by [`FirmwareImage::is_valid`].
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let header = PtixHeader::parse(&data);
        Self { data, header }
    }

    /// Read a firmware file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FirmwareError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| FirmwareError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), size = data.len(), "Loaded firmware file");
        Ok(Self::from_bytes(data))
    }

    pub fn header(&self) -> &PtixHeader {
        &self.header
    }

    pub fn is_valid(&self) -> bool {
        self.header.is_valid()
    }

    /// CRC32 over everything after the magic and CRC field, minus the
    /// trailing [`PTIX_CRC_TRAILER`] bytes.
    pub fn compute_crc(&self) -> u32 {
        self.data
            .len()
            .checked_sub(PTIX_CRC_TRAILER)
            .and_then(|end| self.data.get(PTIX_CRC_SKIP..end))
            .map(crc32fast::hash)
            .unwrap_or(0)
    }

    /// Payload after header and checksum verification.
    pub fn verified_payload(&self) -> Result<&[u8], FirmwareError> {
        if !self.header.is_valid() {
            return Err(FirmwareError::HeaderInvalid);
        }
        let actual = self.compute_crc();
        if actual != self.header.expected_crc {
            return Err(FirmwareError::ChecksumMismatch {
                expected: self.header.expected_crc,
                actual,
            });
        }
        Ok(&self.data[PTIX_HEADER_LEN..])
    }

    /// Payload bytes ready for packetizing, or an empty buffer when the file
    /// fails header or checksum verification.
    pub fn deobfuscate(&self) -> Vec<u8> {
        match self.verified_payload() {
            Ok(payload) => {
                debug!(len = payload.len(), "Firmware payload verified");
                payload.to_vec()
            }
            Err(e) => {
                warn!(error = %e, "Firmware verification failed");
                Vec::new()
            }
        }
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Builders for well-formed images in tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub const TEST_MODEL: u32 = 0x0000_0502;
    pub const TEST_ID_MATRIX: [u8; 16] = [
        0x10, 0x21, 0x32, 0x43, 0x54, 0x65, 0x76, 0x87, 0x98, 0xA9, 0xBA, 0xCB, 0xDC, 0xED, 0xFE,
        0x0F,
    ];

    pub fn build_image(payload: &[u8], start_address: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(PTIX_HEADER_LEN + payload.len());
        data.extend_from_slice(PTIX_MAGIC);
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&TEST_MODEL.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&TEST_ID_MATRIX);
        data.extend_from_slice(&start_address.to_be_bytes());
        data.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        data.extend_from_slice(payload);
        let crc = crc32fast::hash(&data[PTIX_CRC_SKIP..data.len() - PTIX_CRC_TRAILER]);
        data[8..12].copy_from_slice(&crc.to_be_bytes());
        data
    }
}
