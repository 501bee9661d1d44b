use crate::driver::DeviceDriver;
use crate::util::error::{FsError, Result};
use raw::{raw_read_block, raw_write_block};

mod raw;

/// Block-granular access to a device. Every other layer addresses the
/// image through logical block numbers only.
pub struct IO<A: DeviceDriver> {
    pub(crate) device: A,
    block_size: usize,
    block_count: u64,
}

impl<A: DeviceDriver> IO<A> {
    pub fn new(device: A, block_size: usize) -> Result<IO<A>> {
        let sector_size = device.get_sector_size();
        if sector_size == 0 || block_size < sector_size || block_size % sector_size != 0 {
            return Err(FsError::Format(format!(
                "block size {} is not a multiple of sector size {}",
                block_size, sector_size
            )));
        }
        let block_count = device.get_size() / block_size as u64;
        Ok(IO { device, block_size, block_count })
    }

    pub fn get_block_size(&self) -> usize {
        self.block_size
    }

    pub fn get_block_count(&self) -> u64 {
        self.block_count
    }

    /// Narrows the addressable range to the blocks the file system owns.
    pub(crate) fn limit_block_count(&mut self, block_count: u64) {
        self.block_count = self.block_count.min(block_count);
    }

    pub fn read_block(&self, index: u64) -> Result<Vec<u8>> {
        self.check_index(index)?;
        Ok(raw_read_block(&self.device, self.block_size, index)?)
    }

    pub fn write_block(&mut self, index: u64, block: &[u8]) -> Result<()> {
        if block.len() != self.block_size {
            return Err(FsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("block size mismatch - expected {}, got {}", self.block_size, block.len()),
            )));
        }
        self.check_index(index)?;
        Ok(raw_write_block(&mut self.device, self.block_size, block, index)?)
    }

    pub fn zero_block(&mut self, index: u64) -> Result<()> {
        let zeros = vec![0; self.block_size];
        self.write_block(index, &zeros)
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.device.flush()?)
    }

    fn check_index(&self, index: u64) -> Result<()> {
        if index >= self.block_count {
            return Err(FsError::BlockOutOfRange { block: index, block_count: self.block_count });
        }
        Ok(())
    }
}
