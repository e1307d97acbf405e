//! Record codec: a 2-byte sequence number followed by the payload.

use byteorder::{ByteOrder, LittleEndian};
use flash::{BlockDevice, FileHandle};

use crate::error::{DataFileError, EncodingError, Result, Transfer};
use crate::format::SEQUENCE_BYTES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based position of the record in its file.
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(sequence: u16, payload: Vec<u8>) -> Self {
        Self { sequence, payload }
    }

    /// A self-test record: `sequence` followed by `fill` up to `record_size` bytes.
    pub fn filled(sequence: u16, record_size: usize, fill: u8) -> Self {
        Self {
            sequence,
            payload: vec![fill; record_size.saturating_sub(SEQUENCE_BYTES)],
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        SEQUENCE_BYTES + self.payload.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.size()];
        LittleEndian::write_u16(&mut buf[..SEQUENCE_BYTES], self.sequence);
        buf[SEQUENCE_BYTES..].copy_from_slice(&self.payload);
        buf
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, EncodingError> {
        if bytes.len() < SEQUENCE_BYTES {
            return Err(EncodingError::RecordTooSmall(bytes.len()));
        }
        Ok(Self {
            sequence: LittleEndian::read_u16(&bytes[..SEQUENCE_BYTES]),
            payload: bytes[SEQUENCE_BYTES..].to_vec(),
        })
    }
}

/// Writes one encoded record in a single transfer.
///
/// After a short write the cursor still moves past the whole record slot,
/// leaving its tail erased, so the next record starts on its boundary.
pub fn write_record<D>(device: &mut D, file: &mut FileHandle, bytes: &[u8]) -> Result<()>
where
    D: BlockDevice + ?Sized,
{
    let written = device.write(file, bytes)?;
    if written != bytes.len() {
        file.advance(bytes.len() - written);
        return Err(DataFileError::ShortTransfer {
            op: Transfer::Write,
            what: "record",
            expected: bytes.len(),
            actual: written,
        });
    }
    Ok(())
}

/// Reads one record of `size` bytes in a single transfer.
///
/// A short read is an error; the partially filled buffer is dropped and the
/// cursor skips the rest of the record slot.
pub fn read_record<D>(device: &mut D, file: &mut FileHandle, size: usize) -> Result<Record>
where
    D: BlockDevice + ?Sized,
{
    if size < SEQUENCE_BYTES {
        return Err(EncodingError::RecordTooSmall(size).into());
    }
    let mut buf = vec![0u8; size];
    let read = device.read(file, &mut buf)?;
    if read != size {
        file.advance(size - read);
        return Err(DataFileError::ShortTransfer {
            op: Transfer::Read,
            what: "record",
            expected: size,
            actual: read,
        });
    }
    Ok(Record::decode(&buf)?)
}
