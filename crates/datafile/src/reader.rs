use flash::{BlockDevice, FileHandle};
use tracing::{debug, error, info, warn};

use crate::error::{DataFileError, Result};
use crate::format::{FileLayout, HeaderVersion};
use crate::header::{self, Header};
use crate::policy::ErrorPolicy;
use crate::record::{self, Record};
use crate::validate::ValidationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Opened,
    HeaderRead,
    Failed,
}

impl ReadState {
    fn name(self) -> &'static str {
        match self {
            ReadState::Opened => "opened",
            ReadState::HeaderRead => "header-read",
            ReadState::Failed => "failed",
        }
    }
}

/// One open/read pass over an existing data file, from offset 0.
///
/// The header must be read exactly once before any record. Reading more
/// records than the header announces is not prevented; the chip simply
/// returns short reads once the file is exhausted. A short read still moves
/// the cursor past the whole record, so the next read stays aligned.
pub struct ReadSession<'d, D: BlockDevice + ?Sized> {
    device: &'d mut D,
    file: FileHandle,
    version: HeaderVersion,
    state: ReadState,
    header: Option<Header>,
    records_read: u32,
}

impl<'d, D: BlockDevice + ?Sized> ReadSession<'d, D> {
    /// Opens `name`, expecting a header of the given revision.
    ///
    /// # Errors
    ///
    /// [`DataFileError::NotFound`] if there is no such file,
    /// [`DataFileError::Open`] if the chip cannot produce a handle for it.
    pub fn open(device: &'d mut D, name: &str, version: HeaderVersion) -> Result<Self> {
        if !device.exists(name) {
            return Err(DataFileError::NotFound {
                name: name.to_string(),
            });
        }
        let file = device.open(name)?.ok_or_else(|| DataFileError::Open {
            name: name.to_string(),
        })?;
        info!(name, address = file.address(), size = file.size(), "file open");

        Ok(Self {
            device,
            file,
            version,
            state: ReadState::Opened,
            header: None,
            records_read: 0,
        })
    }

    fn expect_state(&self, op: &'static str, want: ReadState) -> Result<()> {
        if self.state != want {
            return Err(DataFileError::OutOfOrder {
                op,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    pub fn read_header(&mut self) -> Result<Header> {
        self.expect_state("read_header", ReadState::Opened)?;
        let header = match header::read_header(&mut *self.device, &mut self.file, self.version) {
            Ok(h) => h,
            Err(e) => {
                self.state = ReadState::Failed;
                return Err(e);
            }
        };
        info!(
            year = header.year(),
            month = header.month(),
            num_records = header.num_records(),
            record_size = ?header.record_size(),
            record_type = ?header.record_type(),
            "header"
        );
        self.header = Some(header);
        self.state = ReadState::HeaderRead;
        Ok(header)
    }

    pub fn read_record(&mut self, size: usize) -> Result<Record> {
        self.expect_state("read_record", ReadState::HeaderRead)?;
        let record = record::read_record(&mut *self.device, &mut self.file, size)?;
        self.records_read += 1;
        Ok(record)
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn address(&self) -> u32 {
        self.file.address()
    }

    pub fn records_read(&self) -> u32 {
        self.records_read
    }

    /// Bytes left between the cursor and the end of the file.
    pub fn remaining(&self) -> u32 {
        self.file.remaining()
    }

    /// Ends the session and returns how many records were read.
    pub fn finish(self) -> u32 {
        debug!(name = self.file.name(), records = self.records_read, "finished data file");
        self.records_read
    }
}

/// Reads `name` back and checks it.
///
/// The header's record count is checked against the calendar, every record's
/// sequence number against its position, and, when `filler` is given, every
/// payload byte against the filler. Mismatches are logged and collected; the
/// file is read to the record count the header announces, or, under
/// [`ErrorPolicy::ContinueOnError`], until the file runs out. Records the
/// header announces past the end of the file are counted as missing.
///
/// v1 headers carry no record size, so `layout.record_size` is used for them.
/// A v2 header's own record size wins over the layout's.
pub fn read_and_validate<D>(
    device: &mut D,
    name: &str,
    layout: &FileLayout,
    policy: ErrorPolicy,
    filler: Option<u8>,
) -> Result<ValidationReport>
where
    D: BlockDevice + ?Sized,
{
    let mut session = ReadSession::open(device, name, layout.version)?;
    let header = session.read_header()?;

    let mut report = ValidationReport::new(name);
    report.check_header(&header);

    let record_size = match header.record_size() {
        Some(size) if size != layout.record_size => {
            warn!(file = name, header = size, configured = layout.record_size, "record size differs from layout");
            usize::from(size)
        }
        Some(size) => usize::from(size),
        None => usize::from(layout.record_size),
    };

    let announced = u32::from(header.num_records());
    for index in 1..=announced {
        if session.remaining() == 0 && !policy.aborts() {
            report.missing_records = announced - index + 1;
            error!(
                file = name,
                announced,
                missing = report.missing_records,
                "file ends before the announced record count"
            );
            break;
        }
        let record = match session.read_record(record_size) {
            Ok(r) => r,
            Err(e) if e.is_transfer() && !policy.aborts() => {
                error!(file = name, record = index, error = %e, "failed to read record");
                report.record_failed(index);
                continue;
            }
            Err(e) => {
                error!(file = name, record = index, error = %e, "failed to read record, abandoning file");
                return Err(e);
            }
        };
        report.records_checked += 1;

        report.check_sequence(index, record.sequence);
        if let Some(fill) = filler {
            report.check_filler(index, &record.payload, fill);
        }
        debug!(record = record.sequence, data = %hex(&record.payload), "record");
    }

    session.finish();
    Ok(report)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}
