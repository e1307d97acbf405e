//! # Flash
//!
//! Block-device abstraction for the serial flash chip the logger writes to.
//!
//! The chip exposes a flat namespace of fixed-size, pre-allocated files. A
//! file is created once with its final size, then written and read through a
//! sequential byte cursor ([`FileHandle`]). There is no seek, no truncate and
//! no delete short of erasing the whole chip.
//!
//! Transfers report how many bytes actually moved. A transfer that runs into
//! the end of a file is clamped and returns a short count; callers decide
//! whether a short count is an error.
//!
//! Two backends are provided:
//!
//! - [`MemFlash`]: an in-memory chip with fault injection, used by tests and
//!   the self-test harness.
//! - [`DirFlash`]: a host directory standing in for the chip so data files
//!   persist between runs of the CLI.

mod chip;
mod dir;
mod erase;
mod mem;

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chip::ChipInfo;
pub use dir::DirFlash;
pub use erase::{erase_and_wait, Clock, EraseStats, EraseTiming, LogIndicator, StatusIndicator, SystemClock};
pub use mem::MemFlash;

/// Longest file name the chip's directory accepts, not counting the terminator.
pub const MAX_NAME_LEN: usize = 31;

/// Value of an erased flash byte.
pub const ERASED_BYTE: u8 = 0xFF;

#[derive(Debug, Error)]
pub enum FlashError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    #[error("device busy")]
    Busy,
    #[error("no flash chip detected")]
    NotDetected,
    #[error("corrupt directory: {0}")]
    CorruptDirectory(String),
    #[error("directory encoding: {0}")]
    Manifest(#[from] ron::Error),
    #[error("{name}: transfer at 0x{address:08x} runs past the end of the chip")]
    OutOfRange { name: String, address: u32 },
}

/// A directory entry as reported by [`BlockDevice::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub address: u32,
    pub size: u32,
}

/// An open file: where it lives on the chip and how far the cursor has moved.
///
/// Handles are plain values. All I/O goes through the owning [`BlockDevice`],
/// which keeps a session's borrow of the device explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    name: String,
    address: u32,
    size: u32,
    offset: u32,
}

impl FileHandle {
    /// Only a [`BlockDevice`] hands out handles, from its own directory.
    pub(crate) fn new(name: impl Into<String>, address: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            address,
            size,
            offset: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start address of the file on the chip. Diagnostic only.
    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn position(&self) -> u32 {
        self.offset
    }

    pub fn remaining(&self) -> u32 {
        self.size - self.offset
    }

    /// Clamps a requested transfer to the bytes left in the file.
    pub fn clamp(&self, requested: usize) -> usize {
        requested.min(self.remaining() as usize)
    }

    /// Moves the cursor forward after a transfer of `n` bytes.
    pub fn advance(&mut self, n: usize) {
        self.offset = self.offset.saturating_add(n as u32).min(self.size);
    }
}

/// The capability set the data-file layer needs from a flash chip.
pub trait BlockDevice {
    /// Total size of the chip in bytes. Zero means no chip answered.
    fn capacity(&self) -> u32;

    /// Erase granularity in bytes.
    fn block_size(&self) -> u32;

    /// JEDEC manufacturer / memory type / capacity bytes.
    fn identify(&self) -> [u8; 3];

    /// `false` while a bulk erase is still running.
    fn ready(&mut self) -> bool;

    /// Starts a bulk erase. Poll [`ready`](BlockDevice::ready) for completion.
    fn erase_all(&mut self) -> Result<(), FlashError>;

    fn exists(&self, name: &str) -> bool;

    /// Allocates a file of `size` bytes.
    ///
    /// Returns `Ok(false)` when the chip refuses: the name is taken or there
    /// is not enough free space.
    fn create(&mut self, name: &str, size: u32) -> Result<bool, FlashError>;

    /// Opens an existing file with its cursor at offset 0.
    fn open(&mut self, name: &str) -> Result<Option<FileHandle>, FlashError>;

    /// Reads up to `buf.len()` bytes at the cursor and returns the count read.
    fn read(&mut self, file: &mut FileHandle, buf: &mut [u8]) -> Result<usize, FlashError>;

    /// Writes up to `buf.len()` bytes at the cursor and returns the count written.
    fn write(&mut self, file: &mut FileHandle, buf: &[u8]) -> Result<usize, FlashError>;

    /// All files on the chip in allocation order.
    fn list(&self) -> Result<Vec<DirEntry>, FlashError>;
}

pub(crate) fn check_name(name: &str) -> Result<(), FlashError> {
    if name.is_empty()
        || name.len() > MAX_NAME_LEN
        || !name.is_ascii()
        || name.contains('/')
        || name.chars().any(|c| c.is_ascii_control())
    {
        return Err(FlashError::InvalidName(name.to_string()));
    }
    Ok(())
}
