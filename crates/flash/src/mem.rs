use std::ops::Range;

use tracing::trace;

use crate::{check_name, BlockDevice, DirEntry, FileHandle, FlashError, ERASED_BYTE};

/// Files start on page boundaries, as they do on the real chip.
const PAGE_SIZE: u32 = 256;

/// An in-memory serial flash chip.
///
/// Storage is a flat byte array that reads `0xFF` where nothing has been
/// written. Files are allocated back to back on page boundaries. A bulk erase
/// clears everything at once but keeps the chip busy for a configurable
/// number of [`ready`](BlockDevice::ready) polls.
///
/// Short transfers can be injected with [`short_read_at`](MemFlash::short_read_at)
/// and [`short_write_at`](MemFlash::short_write_at) to exercise error paths.
#[derive(Debug)]
pub struct MemFlash {
    data: Vec<u8>,
    block_size: u32,
    jedec: [u8; 3],
    files: Vec<DirEntry>,
    next_free: u32,
    erase_polls: u32,
    busy_polls: u32,
    reads: usize,
    writes: usize,
    short_read: Option<usize>,
    short_write: Option<usize>,
}

impl MemFlash {
    pub fn new(capacity: u32, block_size: u32) -> Self {
        Self {
            data: vec![ERASED_BYTE; capacity as usize],
            block_size,
            jedec: [0xEF, 0x40, 0x15],
            files: Vec::new(),
            next_free: 0,
            erase_polls: 3,
            busy_polls: 0,
            reads: 0,
            writes: 0,
            short_read: None,
            short_write: None,
        }
    }

    /// A 2 MiB Winbond W25Q16 with 64 KiB blocks, the logger's stock part.
    pub fn w25q16() -> Self {
        Self::new(2 * 1024 * 1024, 64 * 1024)
    }

    /// Sets how many `ready()` polls a bulk erase takes to finish.
    pub fn with_erase_polls(mut self, polls: u32) -> Self {
        self.erase_polls = polls;
        self
    }

    pub fn with_jedec(mut self, jedec: [u8; 3]) -> Self {
        self.jedec = jedec;
        self
    }

    /// Makes the `nth` read from now (0-based) return half the requested bytes.
    pub fn short_read_at(&mut self, nth: usize) {
        self.short_read = Some(self.reads + nth);
    }

    /// Makes the `nth` write from now (0-based) accept half the offered bytes.
    pub fn short_write_at(&mut self, nth: usize) {
        self.short_write = Some(self.writes + nth);
    }

    /// Raw view of the chip, for tests that corrupt bytes in place.
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn used(&self) -> u32 {
        self.next_free
    }

    /// Chip byte range of an `n`-byte transfer at the handle's cursor.
    fn span(&self, file: &FileHandle, n: usize) -> Result<Range<usize>, FlashError> {
        let start = file.address() as usize + file.position() as usize;
        match start.checked_add(n) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(FlashError::OutOfRange {
                name: file.name().to_string(),
                address: file.address(),
            }),
        }
    }

    fn busy(&self) -> Result<(), FlashError> {
        if self.busy_polls > 0 {
            return Err(FlashError::Busy);
        }
        Ok(())
    }
}

impl BlockDevice for MemFlash {
    fn capacity(&self) -> u32 {
        self.data.len() as u32
    }

    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn identify(&self) -> [u8; 3] {
        self.jedec
    }

    fn ready(&mut self) -> bool {
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            return false;
        }
        true
    }

    fn erase_all(&mut self) -> Result<(), FlashError> {
        self.data.fill(ERASED_BYTE);
        self.files.clear();
        self.next_free = 0;
        self.busy_polls = self.erase_polls;
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }

    fn create(&mut self, name: &str, size: u32) -> Result<bool, FlashError> {
        check_name(name)?;
        self.busy()?;
        if self.exists(name) {
            return Ok(false);
        }
        let address = self.next_free;
        let end = match address.checked_add(size) {
            Some(end) if end <= self.capacity() => end,
            _ => return Ok(false),
        };
        self.files.push(DirEntry {
            name: name.to_string(),
            address,
            size,
        });
        self.next_free = end.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        trace!(name, address, size, "mem flash create");
        Ok(true)
    }

    fn open(&mut self, name: &str) -> Result<Option<FileHandle>, FlashError> {
        self.busy()?;
        Ok(self
            .files
            .iter()
            .find(|f| f.name == name)
            .map(|f| FileHandle::new(f.name.clone(), f.address, f.size)))
    }

    fn read(&mut self, file: &mut FileHandle, buf: &mut [u8]) -> Result<usize, FlashError> {
        self.busy()?;
        let mut n = file.clamp(buf.len());
        if self.short_read == Some(self.reads) {
            n /= 2;
            self.short_read = None;
        }
        self.reads += 1;
        let src = self.span(file, n)?;
        buf[..n].copy_from_slice(&self.data[src]);
        file.advance(n);
        Ok(n)
    }

    fn write(&mut self, file: &mut FileHandle, buf: &[u8]) -> Result<usize, FlashError> {
        self.busy()?;
        let mut n = file.clamp(buf.len());
        if self.short_write == Some(self.writes) {
            n /= 2;
            self.short_write = None;
        }
        self.writes += 1;
        let dst = self.span(file, n)?;
        // NOR flash programming can only clear bits.
        for (dst, src) in self.data[dst].iter_mut().zip(buf) {
            *dst &= *src;
        }
        file.advance(n);
        Ok(n)
    }

    fn list(&self) -> Result<Vec<DirEntry>, FlashError> {
        Ok(self.files.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_open_write_read() -> Result<(), FlashError> {
        let mut chip = MemFlash::new(4096, 1024);
        assert!(chip.create("a.bin", 8)?);
        assert!(chip.exists("a.bin"));

        let mut w = chip.open("a.bin")?.unwrap();
        assert_eq!(chip.write(&mut w, b"abcd")?, 4);
        assert_eq!(chip.write(&mut w, b"efgh")?, 4);

        let mut r = chip.open("a.bin")?.unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(chip.read(&mut r, &mut buf)?, 8);
        assert_eq!(&buf, b"abcdefgh");
        Ok(())
    }

    #[test]
    fn duplicate_name_is_refused() -> Result<(), FlashError> {
        let mut chip = MemFlash::new(4096, 1024);
        assert!(chip.create("a.bin", 8)?);
        assert!(!chip.create("a.bin", 8)?);
        Ok(())
    }

    #[test]
    fn out_of_space_is_refused() -> Result<(), FlashError> {
        let mut chip = MemFlash::new(1024, 1024);
        assert!(!chip.create("big.bin", 2048)?);
        assert!(chip.create("fits.bin", 1000)?);
        assert!(!chip.create("more.bin", 100)?);
        Ok(())
    }

    #[test]
    fn files_are_page_aligned() -> Result<(), FlashError> {
        let mut chip = MemFlash::new(4096, 1024);
        chip.create("a.bin", 10)?;
        chip.create("b.bin", 10)?;
        let list = chip.list()?;
        assert_eq!(list[0].address, 0);
        assert_eq!(list[1].address, PAGE_SIZE);
        Ok(())
    }

    #[test]
    fn transfers_clamp_at_end_of_file() -> Result<(), FlashError> {
        let mut chip = MemFlash::new(4096, 1024);
        chip.create("a.bin", 6)?;
        let mut f = chip.open("a.bin")?.unwrap();
        assert_eq!(chip.write(&mut f, b"0123456789")?, 6);
        assert_eq!(chip.write(&mut f, b"x")?, 0);
        Ok(())
    }

    #[test]
    fn unwritten_bytes_read_erased() -> Result<(), FlashError> {
        let mut chip = MemFlash::new(4096, 1024);
        chip.create("a.bin", 4)?;
        let mut f = chip.open("a.bin")?.unwrap();
        let mut buf = [0u8; 4];
        chip.read(&mut f, &mut buf)?;
        assert_eq!(buf, [ERASED_BYTE; 4]);
        Ok(())
    }

    #[test]
    fn injected_short_read() -> Result<(), FlashError> {
        let mut chip = MemFlash::new(4096, 1024);
        chip.create("a.bin", 16)?;
        let mut f = chip.open("a.bin")?.unwrap();
        chip.short_read_at(1);
        let mut buf = [0u8; 4];
        assert_eq!(chip.read(&mut f, &mut buf)?, 4);
        assert_eq!(chip.read(&mut f, &mut buf)?, 2);
        assert_eq!(chip.read(&mut f, &mut buf)?, 4);
        Ok(())
    }

    #[test]
    fn handle_from_a_larger_chip_is_out_of_range() -> Result<(), FlashError> {
        let mut big = MemFlash::new(8192, 1024);
        big.create("pad.bin", 4096)?;
        big.create("far.bin", 16)?;
        let mut far = big.open("far.bin")?.unwrap();

        let mut small = MemFlash::new(1024, 1024);
        let mut buf = [0u8; 4];
        assert!(matches!(small.read(&mut far, &mut buf), Err(FlashError::OutOfRange { .. })));
        assert!(matches!(small.write(&mut far, &buf), Err(FlashError::OutOfRange { .. })));
        assert_eq!(far.position(), 0);
        Ok(())
    }

    #[test]
    fn erase_keeps_chip_busy() -> Result<(), FlashError> {
        let mut chip = MemFlash::new(4096, 1024).with_erase_polls(2);
        chip.create("a.bin", 4)?;
        chip.erase_all()?;
        assert!(matches!(chip.create("b.bin", 4), Err(FlashError::Busy)));
        assert!(!chip.ready());
        assert!(!chip.ready());
        assert!(chip.ready());
        assert!(!chip.exists("a.bin"));
        assert!(chip.create("b.bin", 4)?);
        Ok(())
    }
}
