//! Integrity checks on data read back from flash.
//!
//! Nothing here is fatal. Every mismatch is logged as it is found and kept in
//! a [`ValidationReport`] so the caller can decide what a dirty file means.

use std::fmt;

use tracing::warn;

use crate::header::Header;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// Header record count disagrees with the calendar.
    RecordCount { expected: u16, actual: u16 },
    /// Record `index` (1-based) carries the wrong sequence number.
    Sequence { index: u32, actual: u16 },
    /// Record `index` has `bad_bytes` payload bytes that are not the filler;
    /// the first is at `offset` within the payload.
    Filler {
        index: u32,
        offset: usize,
        expected: u8,
        actual: u8,
        bad_bytes: usize,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::RecordCount { expected, actual } => write!(
                f,
                "expected records ({expected}) and number in header ({actual}) do not match"
            ),
            Mismatch::Sequence { index, actual } => {
                write!(f, "invalid record number: {actual}, expected: {index}")
            }
            Mismatch::Filler {
                index,
                offset,
                expected,
                actual,
                bad_bytes,
            } => write!(
                f,
                "invalid record filler in record {index}: {bad_bytes} bad bytes, first at {offset} \
                 ({actual:02x} != {expected:02x})"
            ),
        }
    }
}

/// Compares a header's record count with what the calendar says it should be.
pub fn check_record_count(actual: u16, expected: u16) -> Option<Mismatch> {
    (actual != expected).then_some(Mismatch::RecordCount { expected, actual })
}

/// The `index`-th record (1-based) must carry sequence number `index`.
pub fn check_sequence(index: u32, sequence: u16) -> Option<Mismatch> {
    (u32::from(sequence) != index).then_some(Mismatch::Sequence {
        index,
        actual: sequence,
    })
}

/// Every payload byte must equal `expected`. Only meaningful for self-test data.
pub fn check_filler(index: u32, payload: &[u8], expected: u8) -> Option<Mismatch> {
    let first = payload.iter().position(|b| *b != expected)?;
    Some(Mismatch::Filler {
        index,
        offset: first,
        expected,
        actual: payload[first],
        bad_bytes: payload.iter().filter(|b| **b != expected).count(),
    })
}

/// Collected outcome of validating one data file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub name: String,
    pub header: Option<Header>,
    pub records_checked: u32,
    /// 1-based indices of records that could not be read at all.
    pub failed_records: Vec<u32>,
    /// Records the header announces beyond the end of the file.
    pub missing_records: u32,
    pub mismatches: Vec<Mismatch>,
}

impl ValidationReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Checks the header against the calendar and remembers it.
    pub fn check_header(&mut self, header: &Header) -> bool {
        self.header = Some(*header);
        // A month outside 1..=12 cannot be sized by the calendar at all.
        let expected = match u8::try_from(header.month()) {
            Ok(month @ 1..=12) => calendar::expected_record_count(month, header.year()),
            _ => 0,
        };
        self.note(check_record_count(header.num_records(), expected))
    }

    pub fn check_sequence(&mut self, index: u32, sequence: u16) -> bool {
        self.note(check_sequence(index, sequence))
    }

    pub fn check_filler(&mut self, index: u32, payload: &[u8], expected: u8) -> bool {
        self.note(check_filler(index, payload, expected))
    }

    pub fn record_failed(&mut self, index: u32) {
        self.failed_records.push(index);
    }

    fn note(&mut self, mismatch: Option<Mismatch>) -> bool {
        match mismatch {
            Some(m) => {
                warn!(file = %self.name, "{m}");
                self.mismatches.push(m);
                false
            }
            None => true,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.failed_records.is_empty() && self.missing_records == 0
    }

    pub fn sequence_mismatches(&self) -> usize {
        self.count(|m| matches!(m, Mismatch::Sequence { .. }))
    }

    pub fn filler_mismatches(&self) -> usize {
        self.count(|m| matches!(m, Mismatch::Filler { .. }))
    }

    pub fn record_count_mismatches(&self) -> usize {
        self.count(|m| matches!(m, Mismatch::RecordCount { .. }))
    }

    fn count(&self, pred: impl Fn(&Mismatch) -> bool) -> usize {
        self.mismatches.iter().filter(|m| pred(m)).count()
    }
}
