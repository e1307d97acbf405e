use std::fmt;

use tracing::info;

use crate::{BlockDevice, FlashError};

/// Identification and geometry read back from a chip at bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    pub jedec: [u8; 3],
    pub capacity: u32,
    pub block_size: u32,
}

impl ChipInfo {
    /// Reads the chip's identity and size and logs them.
    ///
    /// A chip reporting zero capacity did not answer on the bus; that is
    /// [`FlashError::NotDetected`].
    pub fn probe<D: BlockDevice + ?Sized>(device: &D) -> Result<Self, FlashError> {
        let jedec = device.identify();
        let capacity = device.capacity();
        info!(
            jedec = %format!("{:02X} {:02X} {:02X}", jedec[0], jedec[1], jedec[2]),
            capacity,
            "read chip identification"
        );
        if capacity == 0 {
            return Err(FlashError::NotDetected);
        }
        let block_size = device.block_size();
        info!(block_size, "chip geometry");
        Ok(Self {
            jedec,
            capacity,
            block_size,
        })
    }
}

impl fmt::Display for ChipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  JEDEC ID:     {:02X} {:02X} {:02X}",
            self.jedec[0], self.jedec[1], self.jedec[2]
        )?;
        writeln!(f, "  Memory Size:  {}", self.capacity)?;
        write!(f, "  Block Size:   {}", self.block_size)
    }
}
