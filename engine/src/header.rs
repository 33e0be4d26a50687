//! On-disk table header.
//!
//! Every table file starts with a fixed 144-byte little-endian header:
//!
//! ```text
//! [magic: u32 = 0x7274_2d20][type:2|algorithm:6][min: u8][max: u8]
//! [charsetlen: u8][length: u64][charset: [u8; 128]]
//! ```
//!
//! The payload that follows is `count` rows of `chain_width` bytes each.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use rtcrack_commons::{HashAlgorithm, MAX_CHARSET_LENGTH_ALLOWED};

use crate::error::{EngineError, EngineResult};

/// Table magic, the bytes `"rt- "` reversed on disk: `20 2d 74 72`.
pub const TABLE_MAGIC: u32 = 0x7274_2d20;

/// Size of the packed header in bytes.
pub const HEADER_SIZE: usize = 144;

/// Width of the startpoint index prefixing uncompressed rows, a
/// little-endian `u64`.
pub const ROW_INDEX_SIZE: usize = 8;

/// The on-disk layout of a table.
///
/// The discriminants are the values stored in the type bits of a table
/// header and must never change.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableType {
    /// Rows hold a startpoint index and an endpoint, sorted by endpoint so
    /// lookups can binary search.
    Uncompressed = 0,
    /// Rows hold endpoints alone; startpoints are regenerated from the row
    /// position.
    Compressed = 1,
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TableType::Uncompressed => "Uncompressed",
            TableType::Compressed => "Compressed",
        })
    }
}

/// Row width for a table type.
pub const fn chain_width(table_type: TableType, max: usize) -> usize {
    match table_type {
        TableType::Uncompressed => ROW_INDEX_SIZE + max,
        TableType::Compressed => max,
    }
}

/// The parsed header of a table file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableHeader {
    pub table_type: TableType,
    pub algorithm: HashAlgorithm,
    pub min: u8,
    pub max: u8,
    pub chain_length: u64,
    pub charset: Vec<u8>,
}

impl TableHeader {
    /// Serializes the header into its packed on-disk form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&TABLE_MAGIC.to_le_bytes());
        bytes[4] = self.table_type as u8 | (self.algorithm as u8) << 2;
        bytes[5] = self.min;
        bytes[6] = self.max;
        bytes[7] = self.charset.len() as u8;
        bytes[8..16].copy_from_slice(&self.chain_length.to_le_bytes());
        bytes[16..16 + self.charset.len()].copy_from_slice(&self.charset);
        bytes
    }

    /// Parses a packed header, validating magic and enumerations.
    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(EngineError::Corrupt("truncated header"));
        }
        if u32::from_le_bytes(bytes[0..4].try_into().unwrap()) != TABLE_MAGIC {
            return Err(EngineError::Corrupt("header magic mismatch"));
        }

        let table_type = match bytes[4] & 0b11 {
            0 => TableType::Uncompressed,
            1 => TableType::Compressed,
            _ => return Err(EngineError::Corrupt("unknown table type")),
        };
        let algorithm = HashAlgorithm::try_from(bytes[4] >> 2)
            .map_err(|_| EngineError::Corrupt("unknown hash algorithm"))?;

        let charsetlen = bytes[7] as usize;
        if charsetlen == 0 || charsetlen > MAX_CHARSET_LENGTH_ALLOWED {
            return Err(EngineError::Corrupt("invalid charset length"));
        }

        Ok(Self {
            table_type,
            algorithm,
            min: bytes[5],
            max: bytes[6],
            chain_length: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            charset: bytes[16..16 + charsetlen].to_vec(),
        })
    }

    /// Reads the header of the table file at `path`.
    pub fn load(path: &Path) -> EngineResult<Self> {
        if fs::metadata(path)?.len() < HEADER_SIZE as u64 {
            return Err(EngineError::Corrupt("truncated header"));
        }
        let mut bytes = [0u8; HEADER_SIZE];
        File::open(path)?.read_exact(&mut bytes)?;
        Self::decode(&bytes)
    }

    /// Creates the table file at `path`, holding this header and nothing
    /// else. An existing file is truncated.
    pub fn store(&self, path: &Path) -> EngineResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&self.encode())?;
        Ok(())
    }

    pub fn chain_width(&self) -> usize {
        chain_width(self.table_type, self.max as usize)
    }
}

/// Returns true if the file at `path` starts with a valid table header.
pub fn is_table(path: &Path) -> bool {
    TableHeader::load(path).is_ok()
}
