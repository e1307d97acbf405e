//! Data-file layout constants and per-file geometry.
//!
//! A data file is a fixed header followed by `num_records` records of
//! `record_size` bytes each:
//!
//! ```text
//! [year u16][month u16][num_records u16]                           v1, 6 bytes
//! [year u16][month u16][num_records u16][record_size u16][type u16] v2, 10 bytes
//! [sequence u16][payload; record_size - 2] x num_records
//! ```
//!
//! Every integer is little-endian, the byte order of the logger's MCU.

use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// Width of every header field and of the record sequence number.
pub const FIELD_BYTES: usize = 2;

/// Bytes at the front of each record taken by the sequence number.
pub const SEQUENCE_BYTES: usize = FIELD_BYTES;

/// Record size used by the reference logger: sequence plus nine payload bytes.
pub const DEFAULT_RECORD_SIZE: u16 = 11;

/// Record type tag for the first sensor record layout.
pub const RECORD_TYPE_01: u16 = 0x01;

/// Payload byte written by the self-test so corruption is detectable.
pub const FILLER_BYTE: u8 = 0xAA;

/// Header revision. Nothing on flash says which one a file uses; the reader
/// must be configured the same way the writer was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HeaderVersion {
    /// year, month, num_records.
    V1,
    /// V1 plus record_size and record_type.
    #[default]
    V2,
}

impl HeaderVersion {
    pub const fn field_count(self) -> usize {
        match self {
            HeaderVersion::V1 => 3,
            HeaderVersion::V2 => 5,
        }
    }

    /// Header size in bytes.
    pub const fn size(self) -> usize {
        self.field_count() * FIELD_BYTES
    }
}

/// How the records of a file are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLayout {
    pub version: HeaderVersion,
    pub record_size: u16,
    pub record_type: u16,
}

impl Default for FileLayout {
    fn default() -> Self {
        Self {
            version: HeaderVersion::V2,
            record_size: DEFAULT_RECORD_SIZE,
            record_type: RECORD_TYPE_01,
        }
    }
}

impl FileLayout {
    pub fn new(version: HeaderVersion, record_size: usize, record_type: u16) -> Result<Self, EncodingError> {
        if record_size < SEQUENCE_BYTES {
            return Err(EncodingError::RecordTooSmall(record_size));
        }
        let record_size = u16::try_from(record_size).map_err(|_| EncodingError::RecordTooLarge(record_size))?;
        Ok(Self {
            version,
            record_size,
            record_type,
        })
    }

    pub fn header_size(&self) -> usize {
        self.version.size()
    }

    pub fn payload_size(&self) -> usize {
        usize::from(self.record_size).saturating_sub(SEQUENCE_BYTES)
    }

    /// Bytes to allocate for a file of `num_records` records.
    pub fn file_size(&self, num_records: u16) -> Result<u32, EncodingError> {
        let total = self.header_size() as u64 + u64::from(num_records) * u64::from(self.record_size);
        u32::try_from(total).map_err(|_| EncodingError::FileTooLarge(total))
    }
}
