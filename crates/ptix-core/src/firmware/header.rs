//! PTIX firmware file header.
//!
//! Layout (48 bytes, big-endian):
//!
//! | Offset | Size | Field              |
//! |--------|------|--------------------|
//! | 0x00   | 8    | magic `PTIXPTIX`   |
//! | 0x08   | 4    | expected CRC32     |
//! | 0x0C   | 4    | model code         |
//! | 0x10   | 4    | algorithm version  |
//! | 0x14   | 16   | ID matrix          |
//! | 0x24   | 4    | start address      |
//! | 0x28   | 8    | original size      |

use byteorder::{BigEndian, ReadBytesExt};
use std::fmt;
use std::io::{Cursor, Read};

/// Header magic.
pub const PTIX_MAGIC: &[u8; 8] = b"PTIXPTIX";

/// Header size in bytes.
pub const PTIX_HEADER_LEN: usize = 48;

/// Bytes excluded from the file CRC: magic and the CRC field itself.
pub const PTIX_CRC_SKIP: usize = 12;

/// Trailing bytes excluded from the file CRC.
pub const PTIX_CRC_TRAILER: usize = 8;

/// Parsed firmware header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PtixHeader {
    pub magic: [u8; 8],
    pub expected_crc: u32,
    pub model: u32,
    pub algorithm: u32,
    pub id_matrix: [u8; 16],
    pub start_address: u32,
    pub original_size: u64,
    /// Size of the whole file the header was read from.
    pub file_size: usize,
    is_valid: bool,
}

impl PtixHeader {
    /// Parse the header at the start of `data`.
    ///
    /// Never fails: a short or inconsistent file yields a header with
    /// `is_valid() == false`.
    pub fn parse(data: &[u8]) -> Self {
        let mut header = Self {
            file_size: data.len(),
            ..Self::default()
        };
        if data.len() < PTIX_HEADER_LEN {
            return header;
        }
        if header.read_fields(&data[..PTIX_HEADER_LEN]).is_err() {
            return header;
        }
        let payload_len = (data.len() - PTIX_HEADER_LEN) as u64;
        header.is_valid = &header.magic == PTIX_MAGIC && payload_len == header.original_size;
        header
    }

    fn read_fields(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let mut cursor = Cursor::new(bytes);
        cursor.read_exact(&mut self.magic)?;
        self.expected_crc = cursor.read_u32::<BigEndian>()?;
        self.model = cursor.read_u32::<BigEndian>()?;
        self.algorithm = cursor.read_u32::<BigEndian>()?;
        cursor.read_exact(&mut self.id_matrix)?;
        self.start_address = cursor.read_u32::<BigEndian>()?;
        self.original_size = cursor.read_u64::<BigEndian>()?;
        Ok(())
    }

    /// Magic matches and the payload is exactly `original_size` bytes.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }
}

impl fmt::Display for PtixHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PTIX Header ({}):", if self.is_valid { "valid" } else { "INVALID" })?;
        writeln!(f, "  Magic:      {}", String::from_utf8_lossy(&self.magic))?;
        writeln!(f, "  CRC32:      0x{:08X}", self.expected_crc)?;
        writeln!(f, "  Model:      0x{:08X}", self.model)?;
        writeln!(f, "  Algorithm:  {}", self.algorithm)?;
        write!(f, "  ID Matrix: ")?;
        for b in &self.id_matrix {
            write!(f, " {:02X}", b)?;
        }
        writeln!(f)?;
        writeln!(f, "  Start:      0x{:08X}", self.start_address)?;
        writeln!(
            f,
            "  Payload:    {:>8} bytes ({:.2} KB)",
            self.original_size,
            self.original_size as f64 / 1024.0
        )?;
        write!(f, "  File:       {:>8} bytes", self.file_size)
    }
}
