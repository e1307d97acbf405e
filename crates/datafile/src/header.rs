//! Header codec.
//!
//! Fields go to the device one at a time, each as its own 2-byte transfer.
//! A later revision only appends fields, so a reader configured for an older
//! revision reads a prefix of what a newer writer produced.

use byteorder::{ByteOrder, LittleEndian};
use flash::{BlockDevice, FileHandle};

use crate::error::{DataFileError, EncodingError, Result, Transfer};
use crate::format::{FileLayout, HeaderVersion, FIELD_BYTES};

/// Header revision 1: three fields, 6 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderV1 {
    pub year: u16,
    pub month: u16,
    pub num_records: u16,
}

/// Header revision 2: adds record size and type, 10 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderV2 {
    pub year: u16,
    pub month: u16,
    pub num_records: u16,
    pub record_size: u16,
    pub record_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    V1(HeaderV1),
    V2(HeaderV2),
}

impl Header {
    /// The header a file for `(month, year)` should carry under `layout`.
    pub fn for_month(layout: &FileLayout, month: u8, year: u16) -> std::result::Result<Self, EncodingError> {
        if !(1..=12).contains(&month) {
            return Err(EncodingError::MonthOutOfRange(month));
        }
        if year > 99 {
            return Err(EncodingError::YearOutOfRange(year));
        }
        let num_records = calendar::expected_record_count(month, year);
        let month = u16::from(month);
        Ok(match layout.version {
            HeaderVersion::V1 => Header::V1(HeaderV1 {
                year,
                month,
                num_records,
            }),
            HeaderVersion::V2 => Header::V2(HeaderV2 {
                year,
                month,
                num_records,
                record_size: layout.record_size,
                record_type: layout.record_type,
            }),
        })
    }

    pub fn version(&self) -> HeaderVersion {
        match self {
            Header::V1(_) => HeaderVersion::V1,
            Header::V2(_) => HeaderVersion::V2,
        }
    }

    pub fn size(&self) -> usize {
        self.version().size()
    }

    pub fn year(&self) -> u16 {
        match self {
            Header::V1(h) => h.year,
            Header::V2(h) => h.year,
        }
    }

    pub fn month(&self) -> u16 {
        match self {
            Header::V1(h) => h.month,
            Header::V2(h) => h.month,
        }
    }

    pub fn num_records(&self) -> u16 {
        match self {
            Header::V1(h) => h.num_records,
            Header::V2(h) => h.num_records,
        }
    }

    /// `None` for v1 headers, which leave the record size implicit.
    pub fn record_size(&self) -> Option<u16> {
        match self {
            Header::V1(_) => None,
            Header::V2(h) => Some(h.record_size),
        }
    }

    pub fn record_type(&self) -> Option<u16> {
        match self {
            Header::V1(_) => None,
            Header::V2(h) => Some(h.record_type),
        }
    }

    /// Field names and values in on-flash order.
    fn fields(&self) -> Vec<(&'static str, u16)> {
        let mut fields = vec![
            ("year", self.year()),
            ("month", self.month()),
            ("num_records", self.num_records()),
        ];
        if let Header::V2(h) = self {
            fields.push(("record_size", h.record_size));
            fields.push(("record_type", h.record_type));
        }
        fields
    }

    fn from_fields(version: HeaderVersion, f: &[u16]) -> Self {
        match version {
            HeaderVersion::V1 => Header::V1(HeaderV1 {
                year: f[0],
                month: f[1],
                num_records: f[2],
            }),
            HeaderVersion::V2 => Header::V2(HeaderV2 {
                year: f[0],
                month: f[1],
                num_records: f[2],
                record_size: f[3],
                record_type: f[4],
            }),
        }
    }

    /// Encodes the header into its on-flash bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let fields = self.fields();
        let mut buf = vec![0u8; fields.len() * FIELD_BYTES];
        for (chunk, (_, value)) in buf.chunks_exact_mut(FIELD_BYTES).zip(&fields) {
            LittleEndian::write_u16(chunk, *value);
        }
        buf
    }

    /// Decodes a header of the given revision from the front of `bytes`.
    pub fn from_bytes(version: HeaderVersion, bytes: &[u8]) -> Option<Self> {
        if bytes.len() < version.size() {
            return None;
        }
        let fields: Vec<u16> = bytes[..version.size()]
            .chunks_exact(FIELD_BYTES)
            .map(LittleEndian::read_u16)
            .collect();
        Some(Self::from_fields(version, &fields))
    }
}

/// Writes every header field at the file's cursor.
///
/// Fails on the first field the device does not fully accept. Fields already
/// written stay on flash; the file should not be used further.
pub fn write_header<D>(device: &mut D, file: &mut FileHandle, header: &Header) -> Result<()>
where
    D: BlockDevice + ?Sized,
{
    for (name, value) in header.fields() {
        let mut buf = [0u8; FIELD_BYTES];
        LittleEndian::write_u16(&mut buf, value);
        let written = device.write(file, &buf)?;
        if written != FIELD_BYTES {
            return Err(DataFileError::ShortTransfer {
                op: Transfer::Write,
                what: name,
                expected: FIELD_BYTES,
                actual: written,
            });
        }
    }
    Ok(())
}

/// Reads a header of the given revision at the file's cursor.
pub fn read_header<D>(device: &mut D, file: &mut FileHandle, version: HeaderVersion) -> Result<Header>
where
    D: BlockDevice + ?Sized,
{
    const NAMES: [&str; 5] = ["year", "month", "num_records", "record_size", "record_type"];

    let mut fields = [0u16; 5];
    for (slot, name) in fields.iter_mut().zip(NAMES).take(version.field_count()) {
        let mut buf = [0u8; FIELD_BYTES];
        let read = device.read(file, &mut buf)?;
        if read != FIELD_BYTES {
            return Err(DataFileError::ShortTransfer {
                op: Transfer::Read,
                what: name,
                expected: FIELD_BYTES,
                actual: read,
            });
        }
        *slot = LittleEndian::read_u16(&buf);
    }
    Ok(Header::from_fields(version, &fields))
}
