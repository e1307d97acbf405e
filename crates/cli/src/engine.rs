//! Self-test and inspection workload that ties the flash chip, the calendar,
//! and the data-file codecs together.

use std::ops::Range;

use anyhow::Result;
use datafile::{
    read_and_validate, write_month, DataFileError, ErrorPolicy, FileLayout, Record, ValidationReport, WriteSummary,
};
use flash::{erase_and_wait, BlockDevice, ChipInfo, Clock, DirEntry, EraseStats, EraseTiming, StatusIndicator};
use tracing::{error, info};

/// One file as seen by a listing: where it lives and whether it checks out.
#[derive(Debug)]
pub struct FileCheck {
    pub entry: DirEntry,
    /// `Err` holds the message of a file that could not be read at all.
    pub report: std::result::Result<ValidationReport, String>,
}

impl FileCheck {
    pub fn is_clean(&self) -> bool {
        matches!(&self.report, Ok(r) if r.is_clean())
    }
}

/// Outcome of a full self-test run.
#[derive(Debug, Default)]
pub struct SelfTestReport {
    pub written: Vec<WriteSummary>,
    pub write_failures: Vec<String>,
    pub reports: Vec<ValidationReport>,
    pub read_failures: Vec<String>,
}

impl SelfTestReport {
    pub fn is_clean(&self) -> bool {
        self.write_failures.is_empty()
            && self.read_failures.is_empty()
            && self.written.iter().all(|w| w.failed_records.is_empty())
            && self.reports.iter().all(ValidationReport::is_clean)
    }

    pub fn mismatch_count(&self) -> usize {
        self.reports.iter().map(|r| r.mismatches.len() + r.failed_records.len()).sum()
    }
}

/// The logger's file workload over one flash chip.
///
/// # Write Path
///
/// 1. Derive the file name and record count from `(month, year)`.
/// 2. Create the file at its final size and write the header.
/// 3. Write one filler record per hour of the month.
///
/// # Read Path
///
/// 1. Open the file and read the header.
/// 2. Check the header's record count against the calendar.
/// 3. Read every record, checking sequence numbers and (for self-test data)
///    the filler bytes.
///
/// How a failed record is handled on either path is the configured
/// [`ErrorPolicy`].
pub struct Logger<'d, D: BlockDevice + ?Sized> {
    device: &'d mut D,
    layout: FileLayout,
    policy: ErrorPolicy,
    filler: Option<u8>,
}

impl<'d, D: BlockDevice + ?Sized> Logger<'d, D> {
    pub fn new(device: &'d mut D, layout: FileLayout, policy: ErrorPolicy, filler: Option<u8>) -> Self {
        Self {
            device,
            layout,
            policy,
            filler,
        }
    }

    /// Identifies the chip. Fails with `DeviceInit` if nothing answers.
    pub fn bring_up(&self) -> Result<ChipInfo> {
        Ok(datafile::bring_up(&*self.device)?)
    }

    /// Erases the whole chip, blinking `indicator` while it works.
    pub fn erase<I, C>(&mut self, indicator: &mut I, clock: &mut C, timing: EraseTiming) -> Result<EraseStats>
    where
        I: StatusIndicator + ?Sized,
        C: Clock + ?Sized,
    {
        Ok(erase_and_wait(&mut *self.device, indicator, clock, timing)?)
    }

    /// Writes one month of self-test records: sequence numbers plus filler.
    pub fn write_test_month(&mut self, month: u8, year: u16) -> Result<WriteSummary> {
        let record_size = usize::from(self.layout.record_size);
        let fill = self.filler.unwrap_or(datafile::FILLER_BYTE);
        let summary = write_month(&mut *self.device, month, year, &self.layout, self.policy, |i| {
            Record::filled(i, record_size, fill)
        })?;
        info!(
            file = %summary.name,
            records = summary.records_written,
            address = %format!("0x{:08x}", summary.address),
            "wrote data file"
        );
        Ok(summary)
    }

    /// Reads a file back and validates it.
    pub fn check_file(&mut self, name: &str) -> Result<ValidationReport, DataFileError> {
        read_and_validate(&mut *self.device, name, &self.layout, self.policy, self.filler)
    }

    pub fn files(&self) -> Result<Vec<DirEntry>> {
        Ok(self.device.list()?)
    }

    /// Lists every file on the chip and validates each one.
    ///
    /// A file that cannot be read is reported and the listing moves on.
    pub fn check_all(&mut self) -> Result<Vec<FileCheck>> {
        let mut checks = Vec::new();
        for entry in self.files()? {
            info!("{:>20}: {} bytes", entry.name, entry.size);
            let report = self.check_file(&entry.name).map_err(|e| {
                error!(file = %entry.name, error = %e, "could not read data file");
                e.to_string()
            });
            checks.push(FileCheck { entry, report });
        }
        info!("no more files");
        Ok(checks)
    }

    /// Writes every month of every year in `years`, reads each back, then
    /// reports where each file starts on the chip.
    ///
    /// A month that fails to write ends that year's writes; its read-back is
    /// skipped and the run moves on to the next year.
    pub fn self_test(&mut self, years: Range<u16>) -> Result<SelfTestReport> {
        let mut out = SelfTestReport::default();
        for year in years {
            for month in 1..=12u8 {
                match self.write_test_month(month, year) {
                    Ok(summary) => {
                        match self.check_file(&summary.name) {
                            Ok(report) => out.reports.push(report),
                            Err(e) => {
                                error!(file = %summary.name, error = %e, "could not read back data file");
                                out.read_failures.push(summary.name.clone());
                            }
                        }
                        out.written.push(summary);
                    }
                    Err(e) => {
                        error!(month, year, error = %e, "could not make the new data file");
                        out.write_failures.push(format!("{month:02}-{year:02}: {e}"));
                        break;
                    }
                }
            }

            for month in 1..=12u8 {
                let name = datafile::filename::encode(month, year)?;
                match self.device.open(&name)? {
                    Some(file) => info!("file {} starts at 0x{:08x}", name, file.address()),
                    None => {
                        error!(file = %name, "could not open");
                        break;
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafile::{HeaderVersion, Mismatch, FILLER_BYTE};
    use flash::{DirFlash, LogIndicator, MemFlash};
    use tempfile::tempdir;

    fn logger(chip: &mut MemFlash) -> Logger<'_, MemFlash> {
        Logger::new(chip, FileLayout::default(), ErrorPolicy::ContinueOnError, Some(FILLER_BYTE))
    }

    struct FastClock(u64);

    impl Clock for FastClock {
        fn millis(&mut self) -> u64 {
            self.0
        }

        fn yield_now(&mut self) {
            self.0 += 50;
        }
    }

    // ---------------------- Self test ----------------------

    #[test]
    fn self_test_two_years_is_clean() -> Result<()> {
        let mut chip = MemFlash::w25q16();
        let report = logger(&mut chip).self_test(22..24)?;
        assert!(report.is_clean());
        assert_eq!(report.written.len(), 24);
        assert_eq!(report.reports.len(), 24);
        assert_eq!(report.mismatch_count(), 0);

        let leap = report.reports.iter().find(|r| r.name == "data-02-24.bin");
        assert!(leap.is_none(), "24 is outside 22..24");
        let feb = report.reports.iter().find(|r| r.name == "data-02-22.bin").unwrap();
        assert_eq!(feb.records_checked, 28 * 24);
        Ok(())
    }

    #[test]
    fn self_test_stops_year_when_chip_fills() -> Result<()> {
        // room for roughly two month files
        let mut chip = MemFlash::new(20 * 1024, 4096);
        let report = logger(&mut chip).self_test(22..23)?;
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.write_failures.len(), 1);
        assert!(!report.is_clean());
        Ok(())
    }

    #[test]
    fn second_run_collides_with_existing_files() -> Result<()> {
        let mut chip = MemFlash::w25q16();
        logger(&mut chip).self_test(23..24)?;
        let report = logger(&mut chip).self_test(23..24)?;
        assert!(report.written.is_empty());
        assert_eq!(report.write_failures.len(), 1);
        Ok(())
    }

    // ---------------------- Erase ----------------------

    #[test]
    fn erase_then_rewrite() -> Result<()> {
        let mut chip = MemFlash::w25q16().with_erase_polls(20);
        let mut log = logger(&mut chip);
        log.write_test_month(6, 23)?;

        let mut led = LogIndicator::new(true);
        let stats = log.erase(&mut led, &mut FastClock(0), EraseTiming::default())?;
        assert_eq!(stats.polls, 20);
        assert!(led.is_on());
        assert!(log.files()?.is_empty());

        log.write_test_month(6, 23)?;
        assert_eq!(log.files()?.len(), 1);
        Ok(())
    }

    // ---------------------- Listing ----------------------

    #[test]
    fn check_all_reports_each_file() -> Result<()> {
        let mut chip = MemFlash::w25q16();
        {
            let mut log = logger(&mut chip);
            log.write_test_month(1, 24)?;
            log.write_test_month(2, 24)?;
        }
        // corrupt the sequence number of record 1 in the second file
        let second = chip.list()?[1].address as usize;
        chip.raw_mut()[second + HeaderVersion::V2.size()] = 0x00;

        let checks = logger(&mut chip).check_all()?;
        assert_eq!(checks.len(), 2);
        assert!(checks[0].is_clean());
        assert!(!checks[1].is_clean());
        let report = checks[1].report.as_ref().unwrap();
        assert_eq!(
            report.mismatches,
            vec![Mismatch::Sequence {
                index: 1,
                actual: 0
            }]
        );
        Ok(())
    }

    #[test]
    fn missing_chip_fails_bring_up() {
        let mut chip = MemFlash::new(0, 0);
        let err = logger(&mut chip).bring_up().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataFileError>(),
            Some(DataFileError::DeviceInit(_))
        ));
    }

    // ---------------------- Host directory ----------------------

    #[test]
    fn dir_flash_round_trip() -> Result<()> {
        let dir = tempdir()?;
        {
            let mut chip = DirFlash::open(dir.path(), 2 * 1024 * 1024, 64 * 1024)?;
            let mut log = Logger::new(&mut chip, FileLayout::default(), ErrorPolicy::AbortOnError, Some(FILLER_BYTE));
            log.write_test_month(2, 24)?;
        }

        let mut chip = DirFlash::open(dir.path(), 2 * 1024 * 1024, 64 * 1024)?;
        let mut log = Logger::new(&mut chip, FileLayout::default(), ErrorPolicy::AbortOnError, Some(FILLER_BYTE));
        let report = log.check_file("data-02-24.bin")?;
        assert!(report.is_clean());
        assert_eq!(report.records_checked, 696);
        Ok(())
    }
}
