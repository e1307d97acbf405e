use anyhow::Result;
use datafile::{
    filename, read_and_validate, write_month, DataFileError, ErrorPolicy, FileLayout, Header, HeaderV2, HeaderVersion,
    ReadSession, Record, Transfer, WriteSession, FILLER_BYTE, RECORD_TYPE_01,
};
use flash::{BlockDevice, DirFlash, MemFlash};
use tempfile::tempdir;

fn filler(layout: FileLayout) -> impl FnMut(u16) -> Record {
    move |i| Record::filled(i, usize::from(layout.record_size), FILLER_BYTE)
}

// -------------------- End to end --------------------

#[test]
fn leap_february_end_to_end() -> Result<()> {
    let mut chip = MemFlash::w25q16();
    let layout = FileLayout::default();

    let expected = calendar::expected_record_count(2, 24);
    assert_eq!(expected, 696);

    let name = filename::encode(2, 24)?;
    let size = layout.file_size(expected)?;
    assert_eq!(size as usize, 10 + 696 * 11);

    let mut w = WriteSession::create(&mut chip, &name, size)?;
    w.write_header(&Header::V2(HeaderV2 {
        year: 24,
        month: 2,
        num_records: 696,
        record_size: 11,
        record_type: RECORD_TYPE_01,
    }))?;
    for seq in 1..=696u16 {
        w.write(&Record::filled(seq, 11, FILLER_BYTE))?;
    }
    assert_eq!(w.close(), 696);

    let mut r = ReadSession::open(&mut chip, &name, HeaderVersion::V2)?;
    let header = r.read_header()?;
    assert_eq!((header.year(), header.month(), header.num_records()), (24, 2, 696));
    for seq in 1..=696u16 {
        let rec = r.read_record(11)?;
        assert_eq!(rec.sequence, seq);
        assert!(rec.payload.iter().all(|b| *b == FILLER_BYTE));
    }
    r.finish();

    let report = read_and_validate(&mut chip, &name, &layout, ErrorPolicy::ContinueOnError, Some(FILLER_BYTE))?;
    assert!(report.is_clean());
    assert_eq!(report.records_checked, 696);
    Ok(())
}

#[test]
fn two_years_of_month_files() -> Result<()> {
    let mut chip = MemFlash::w25q16();
    let layout = FileLayout::default();

    for year in 22..24u16 {
        for month in 1..=12u8 {
            write_month(&mut chip, month, year, &layout, ErrorPolicy::AbortOnError, filler(layout))?;
        }
    }

    let entries = chip.list()?;
    assert_eq!(entries.len(), 24);
    for entry in &entries {
        let (month, year) = filename::decode(&entry.name).expect("month file name");
        let report =
            read_and_validate(&mut chip, &entry.name, &layout, ErrorPolicy::ContinueOnError, Some(FILLER_BYTE))?;
        assert!(report.is_clean(), "{}", entry.name);
        assert_eq!(
            report.records_checked,
            u32::from(calendar::expected_record_count(month, year))
        );
    }
    Ok(())
}

// -------------------- Validation failures --------------------

#[test]
fn one_bad_sequence_number() -> Result<()> {
    let mut chip = MemFlash::w25q16();
    let layout = FileLayout::default();

    let summary = write_month(&mut chip, 2, 24, &layout, ErrorPolicy::AbortOnError, |i| {
        // the fifth record claims to be number 999
        let seq = if i == 5 { 999 } else { i };
        Record::filled(seq, 11, FILLER_BYTE)
    })?;

    let report = read_and_validate(&mut chip, &summary.name, &layout, ErrorPolicy::ContinueOnError, Some(FILLER_BYTE))?;
    assert_eq!(report.sequence_mismatches(), 1);
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.records_checked, 696);
    assert_eq!(
        report.mismatches[0],
        datafile::Mismatch::Sequence {
            index: 5,
            actual: 999
        }
    );
    Ok(())
}

#[test]
fn header_count_disagreeing_with_calendar() -> Result<()> {
    let mut chip = MemFlash::w25q16();
    let layout = FileLayout::default();
    let name = filename::encode(2, 23)?;

    // A writer that wrongly treats 2023 as a leap year.
    let mut w = WriteSession::create(&mut chip, &name, layout.file_size(696)?)?;
    w.write_header(&Header::V2(HeaderV2 {
        year: 23,
        month: 2,
        num_records: 696,
        record_size: 11,
        record_type: RECORD_TYPE_01,
    }))?;
    for seq in 1..=696u16 {
        w.write(&Record::filled(seq, 11, FILLER_BYTE))?;
    }
    w.close();

    let report = read_and_validate(&mut chip, &name, &layout, ErrorPolicy::ContinueOnError, Some(FILLER_BYTE))?;
    assert_eq!(report.record_count_mismatches(), 1);
    // still read to the end
    assert_eq!(report.records_checked, 696);
    Ok(())
}

#[test]
fn short_read_never_yields_a_record() -> Result<()> {
    let mut chip = MemFlash::w25q16();
    let layout = FileLayout::default();
    let summary = write_month(&mut chip, 3, 24, &layout, ErrorPolicy::AbortOnError, filler(layout))?;

    let mut r = ReadSession::open(&mut chip, &summary.name, HeaderVersion::V2)?;
    r.read_header()?;
    r.read_record(11)?;
    drop(r);

    let mut r = ReadSession::open(&mut chip, &summary.name, HeaderVersion::V2)?;
    r.read_header()?;
    let err = r.read_record(10_000).unwrap_err();
    assert!(matches!(
        err,
        DataFileError::ShortTransfer {
            op: Transfer::Read,
            what: "record",
            ..
        }
    ));
    assert_eq!(r.records_read(), 0);
    Ok(())
}

#[test]
fn missing_file_and_duplicate_create() -> Result<()> {
    let mut chip = MemFlash::w25q16();
    let layout = FileLayout::default();

    let err = read_and_validate(&mut chip, "data-05-24.bin", &layout, ErrorPolicy::ContinueOnError, None).unwrap_err();
    assert!(matches!(err, DataFileError::NotFound { .. }));

    write_month(&mut chip, 5, 24, &layout, ErrorPolicy::AbortOnError, filler(layout))?;
    let err = write_month(&mut chip, 5, 24, &layout, ErrorPolicy::AbortOnError, filler(layout)).unwrap_err();
    assert!(matches!(err, DataFileError::FileCreate { .. }));
    Ok(())
}

// -------------------- Host directory backend --------------------

#[test]
fn dir_flash_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let layout = FileLayout::default();
    {
        let mut chip = DirFlash::open(dir.path(), 2 * 1024 * 1024, 64 * 1024)?;
        write_month(&mut chip, 12, 99, &layout, ErrorPolicy::AbortOnError, filler(layout))?;
    }

    let mut chip = DirFlash::open(dir.path(), 2 * 1024 * 1024, 64 * 1024)?;
    let report = read_and_validate(&mut chip, "data-12-99.bin", &layout, ErrorPolicy::AbortOnError, Some(FILLER_BYTE))?;
    assert!(report.is_clean());
    assert_eq!(report.records_checked, 31 * 24);
    Ok(())
}
