//! # Data files
//!
//! Monthly sensor data files on serial flash for the field logger.
//!
//! Each file holds one calendar month of hourly readings. It is created once
//! at its final size, written front to back (header, then records), and
//! later reopened and read front to back. Files are never updated in place,
//! appended to, or deleted individually.
//!
//! ## File layout (v2 header)
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ HEADER (10 bytes)                                    │
//! │ year (u16) | month (u16) | num_records (u16)         │
//! │ record_size (u16) | record_type (u16)                │
//! ├──────────────────────────────────────────────────────┤
//! │ RECORDS (num_records x record_size bytes)            │
//! │                                                      │
//! │ sequence (u16, 1-based) | payload                    │
//! │                                                      │
//! │ ... repeated days_in_month x 24 times ...            │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The v1 header stops after `num_records` (6 bytes). Nothing on flash marks
//! the revision, so readers are configured with a [`FileLayout`]. All
//! integers are little-endian. Files are named `data-MM-YY.bin`.

mod error;
pub mod filename;
mod format;
mod header;
mod policy;
mod reader;
mod record;
pub mod validate;
mod writer;

use flash::{BlockDevice, ChipInfo};

pub use error::{DataFileError, EncodingError, Result, Transfer};
pub use format::{
    FileLayout, HeaderVersion, DEFAULT_RECORD_SIZE, FIELD_BYTES, FILLER_BYTE, RECORD_TYPE_01, SEQUENCE_BYTES,
};
pub use header::{read_header, write_header, Header, HeaderV1, HeaderV2};
pub use policy::ErrorPolicy;
pub use reader::{read_and_validate, ReadSession};
pub use record::{read_record, write_record, Record};
pub use validate::{Mismatch, ValidationReport};
pub use writer::{write_month, WriteSession, WriteSummary};

/// Probes the chip before any file work.
///
/// A chip that does not identify itself is [`DataFileError::DeviceInit`];
/// the logger cannot do anything useful without one.
pub fn bring_up<D: BlockDevice + ?Sized>(device: &D) -> Result<ChipInfo> {
    ChipInfo::probe(device).map_err(DataFileError::DeviceInit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flash::MemFlash;

    #[test]
    fn bring_up_reports_missing_chip() {
        assert!(bring_up(&MemFlash::w25q16()).is_ok());
        assert!(matches!(
            bring_up(&MemFlash::new(0, 0)),
            Err(DataFileError::DeviceInit(_))
        ));
    }
}
