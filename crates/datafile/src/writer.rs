use flash::{BlockDevice, FileHandle};
use tracing::{debug, error, info};

use crate::error::{DataFileError, EncodingError, Result};
use crate::filename;
use crate::format::FileLayout;
use crate::header::{self, Header};
use crate::policy::ErrorPolicy;
use crate::record::{self, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Created,
    HeaderWritten,
    Failed,
}

impl WriteState {
    fn name(self) -> &'static str {
        match self {
            WriteState::Created => "created",
            WriteState::HeaderWritten => "header-written",
            WriteState::Failed => "failed",
        }
    }
}

/// One create/write pass over a new data file.
///
/// The session holds the device mutably for its whole life, so no other
/// session can touch the chip until it is closed. Writes are strictly
/// sequential: exactly one header, then records. Closing consumes the
/// session, which rules out appending afterwards.
pub struct WriteSession<'d, D: BlockDevice + ?Sized> {
    device: &'d mut D,
    file: FileHandle,
    state: WriteState,
    records_written: u32,
}

impl<'d, D: BlockDevice + ?Sized> WriteSession<'d, D> {
    /// Allocates a file of `size` bytes named `name` and opens it for writing.
    ///
    /// # Errors
    ///
    /// [`DataFileError::FileCreate`] if the name is taken, the chip refuses the
    /// allocation, or the new file cannot be opened.
    pub fn create(device: &'d mut D, name: &str, size: u32) -> Result<Self> {
        if device.exists(name) {
            return Err(DataFileError::FileCreate {
                name: name.to_string(),
                reason: "name already exists",
            });
        }
        if !device.create(name, size)? {
            return Err(DataFileError::FileCreate {
                name: name.to_string(),
                reason: "device refused the allocation",
            });
        }
        let file = device.open(name)?.ok_or_else(|| DataFileError::FileCreate {
            name: name.to_string(),
            reason: "new file could not be opened",
        })?;
        info!(name, size, address = file.address(), "created data file");

        Ok(Self {
            device,
            file,
            state: WriteState::Created,
            records_written: 0,
        })
    }

    fn expect_state(&self, op: &'static str, want: WriteState) -> Result<()> {
        if self.state != want {
            return Err(DataFileError::OutOfOrder {
                op,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    /// Writes the header. Must be called exactly once, before any record.
    ///
    /// A failed header write poisons the session.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        self.expect_state("write_header", WriteState::Created)?;
        match header::write_header(&mut *self.device, &mut self.file, header) {
            Ok(()) => {
                self.state = WriteState::HeaderWritten;
                Ok(())
            }
            Err(e) => {
                self.state = WriteState::Failed;
                Err(e)
            }
        }
    }

    /// Writes one already-encoded record.
    ///
    /// The session counts records but does not check the count against the
    /// header; the reader's validation does that.
    pub fn write_record(&mut self, bytes: &[u8]) -> Result<()> {
        self.expect_state("write_record", WriteState::HeaderWritten)?;
        record::write_record(&mut *self.device, &mut self.file, bytes)?;
        self.records_written += 1;
        Ok(())
    }

    pub fn write(&mut self, record: &Record) -> Result<()> {
        self.write_record(&record.encode())
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn address(&self) -> u32 {
        self.file.address()
    }

    pub fn records_written(&self) -> u32 {
        self.records_written
    }

    /// Ends the session. The chip does not buffer, so there is nothing to flush.
    pub fn close(self) -> u32 {
        debug!(name = self.file.name(), records = self.records_written, "closed data file");
        self.records_written
    }
}

/// Outcome of writing one month file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub name: String,
    pub address: u32,
    pub records_written: u32,
    /// 1-based indices of records whose write failed (continue-on-error only).
    pub failed_records: Vec<u32>,
}

/// Creates the file for `(month, year)` and fills it.
///
/// The file is sized from the calendar. `make_record` is called with each
/// 1-based record index and must return a record of `layout.record_size`
/// bytes. Under [`ErrorPolicy::ContinueOnError`] a failed record is logged and
/// skipped, its slot left partly erased; under [`ErrorPolicy::AbortOnError`]
/// it ends the file.
pub fn write_month<D, F>(
    device: &mut D,
    month: u8,
    year: u16,
    layout: &FileLayout,
    policy: ErrorPolicy,
    mut make_record: F,
) -> Result<WriteSummary>
where
    D: BlockDevice + ?Sized,
    F: FnMut(u16) -> Record,
{
    let name = filename::encode(month, year)?;
    let header = Header::for_month(layout, month, year)?;
    let num_records = header.num_records();
    let size = layout.file_size(num_records)?;
    let record_size = usize::from(layout.record_size);

    let mut session = WriteSession::create(device, &name, size)?;
    session.write_header(&header)?;

    let mut failed_records = Vec::new();
    for index in 1..=num_records {
        let bytes = make_record(index).encode();
        if bytes.len() != record_size {
            return Err(EncodingError::RecordSizeMismatch {
                expected: record_size,
                actual: bytes.len(),
            }
            .into());
        }
        match session.write_record(&bytes) {
            Ok(()) => {}
            Err(e) if e.is_transfer() && !policy.aborts() => {
                error!(file = %name, record = index, error = %e, "failed to write record");
                failed_records.push(u32::from(index));
            }
            Err(e) => {
                error!(file = %name, record = index, error = %e, "failed to write record, abandoning file");
                return Err(e);
            }
        }
    }

    let address = session.address();
    let records_written = session.close();
    Ok(WriteSummary {
        name,
        address,
        records_written,
        failed_records,
    })
}
