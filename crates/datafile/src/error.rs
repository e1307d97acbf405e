use std::fmt;

use flash::FlashError;
use thiserror::Error;

/// Direction of a device transfer, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Read,
    Write,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::Read => f.write_str("read"),
            Transfer::Write => f.write_str("write"),
        }
    }
}

/// A value that cannot be represented in the on-flash layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("file name {name:?} is longer than {max} bytes")]
    NameTooLong { name: String, max: usize },
    #[error("month out of range: {0}")]
    MonthOutOfRange(u8),
    #[error("year is not two digits: {0}")]
    YearOutOfRange(u16),
    #[error("record size {0} cannot hold a sequence number")]
    RecordTooSmall(usize),
    #[error("record size {0} does not fit the header field")]
    RecordTooLarge(usize),
    #[error("file of {0} bytes does not fit the device address space")]
    FileTooLarge(u64),
    #[error("record is {actual} bytes, file layout expects {expected}")]
    RecordSizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum DataFileError {
    #[error("flash device failed to initialize: {0}")]
    DeviceInit(#[source] FlashError),
    #[error("could not create data file {name}: {reason}")]
    FileCreate { name: String, reason: &'static str },
    #[error("data file does not exist: {name}")]
    NotFound { name: String },
    #[error("could not open data file {name}")]
    Open { name: String },
    #[error("short {op} of {what}: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        op: Transfer,
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("{op} is not allowed while the session is {state}")]
    OutOfOrder { op: &'static str, state: &'static str },
    #[error("flash device error: {0}")]
    Device(#[from] FlashError),
}

impl DataFileError {
    /// `true` for failures confined to a single header or record transfer.
    ///
    /// These are the failures a continue-on-error loop may step over.
    pub fn is_transfer(&self) -> bool {
        matches!(self, DataFileError::ShortTransfer { .. })
    }
}

pub type Result<T> = std::result::Result<T, DataFileError>;
