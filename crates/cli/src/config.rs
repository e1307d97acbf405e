use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use datafile::{ErrorPolicy, FileLayout, FILLER_BYTE};
use ron::extensions::Extensions;
use ron::Options;
use serde::{Deserialize, Serialize};

/// Everything the harness needs to know about the chip and the files on it.
///
/// Loaded from a RON file when `--config` is given; every field has a
/// default matching the stock logger, and command-line flags override both.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Host directory standing in for the flash chip.
    pub flash_dir: PathBuf,
    pub capacity: u32,
    pub block_size: u32,
    pub layout: FileLayout,
    pub policy: ErrorPolicy,
    /// Expected payload byte when checking self-test data. `None` skips the check.
    pub filler: Option<u8>,
    /// Self-test years, two-digit, end exclusive.
    pub first_year: u16,
    pub last_year: u16,
    pub verbose: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            flash_dir: PathBuf::from("flash"),
            capacity: 2 * 1024 * 1024,
            block_size: 64 * 1024,
            layout: FileLayout::default(),
            policy: ErrorPolicy::ContinueOnError,
            filler: Some(FILLER_BYTE),
            first_year: 22,
            last_year: 24,
            verbose: false,
        }
    }
}

impl LoggerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let options = Options::default().with_default_extension(Extensions::IMPLICIT_SOME);
        Ok(options.from_str(s)?)
    }

    /// Rejects settings that cannot produce valid month files.
    pub fn validate(&self) -> Result<()> {
        FileLayout::new(
            self.layout.version,
            usize::from(self.layout.record_size),
            self.layout.record_type,
        )?;
        if self.first_year > 99 || self.last_year > 100 {
            bail!("self-test years must be two-digit: {}..{}", self.first_year, self.last_year);
        }
        if self.first_year >= self.last_year {
            bail!("empty self-test year range: {}..{}", self.first_year, self.last_year);
        }
        if self.capacity == 0 {
            bail!("flash capacity must be non-zero");
        }
        Ok(())
    }

    pub fn years(&self) -> Range<u16> {
        self.first_year..self.last_year
    }
}
