use tracing::{error, trace};

use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::{FsError, Result};

/// Free-space bitmap, one bit per block, kept in memory and written through
/// to the bitmap region block by block.
pub struct BlockMap {
    pub(crate) first_block: BlockPointer,
    block_count: u32,
    reserved_until: BlockPointer,
    free_count: u64,
    data: Vec<u8>,
}

impl BlockMap {
    /// Fresh map with blocks `[0, reserved_until)` marked used.
    pub fn new(first_block: BlockPointer, block_count: u32, reserved_until: BlockPointer, block_size: usize) -> BlockMap {
        let data = BlockMap::create_data(block_count, block_size);
        let mut map = BlockMap { first_block, block_count, reserved_until, free_count: block_count as u64, data };
        for i in 0..reserved_until {
            map.mark_used_mem(i);
        }
        map
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>, first_block: BlockPointer, block_count: u32, reserved_until: BlockPointer) -> Result<BlockMap> {
        let block_size = io.get_block_size();
        let mut data = BlockMap::create_data(block_count, block_size);
        for (i, chunk) in data.chunks_mut(block_size).enumerate() {
            chunk.copy_from_slice(&io.read_block(first_block as u64 + i as u64)?);
        }

        let mut map = BlockMap { first_block, block_count, reserved_until, free_count: 0, data };
        for i in 0..reserved_until {
            if map.is_free(i) {
                return Err(FsError::Corruption {
                    block: first_block,
                    detail: format!("reserved block {} marked free", i),
                });
            }
        }
        map.free_count = (0..block_count).filter(|i| map.is_free(*i)).count() as u64;
        Ok(map)
    }

    fn create_data(block_count: u32, block_size: usize) -> Vec<u8> {
        let bytes = (block_count as usize).div_ceil(8);
        vec![0; bytes.div_ceil(block_size) * block_size]
    }

    pub fn write_part<A: DeviceDriver>(&self, io: &mut IO<A>, including_index: BlockPointer) -> Result<()> {
        let block_size = io.get_block_size();
        let block = including_index as usize / 8 / block_size;
        let data = &self.data[block * block_size..(block + 1) * block_size];
        io.write_block(self.first_block as u64 + block as u64, data)
    }

    pub fn write_full<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        for (i, chunk) in self.data.chunks(io.get_block_size()).enumerate() {
            io.write_block(self.first_block as u64 + i as u64, chunk)?;
        }
        Ok(())
    }

    /// Marks the lowest free block used and returns it.
    pub fn allocate<A: DeviceDriver>(&mut self, io: &mut IO<A>) -> Result<BlockPointer> {
        let index = self.find_free().ok_or(FsError::NoSpace)?;
        self.mark_used(io, index)?;
        trace!(block = index, "allocated block");
        Ok(index)
    }

    fn find_free(&self) -> Option<BlockPointer> {
        for (byte_index, byte) in self.data.iter().enumerate() {
            if *byte == u8::MAX {
                continue;
            }
            for bit in 0..8 {
                let index = (byte_index * 8 + bit) as BlockPointer;
                if index >= self.block_count {
                    return None;
                }
                if byte & (1 << bit) == 0 {
                    return Some(index);
                }
            }
        }
        None
    }

    /// Returns `index` to the free pool. Freeing a free or reserved block
    /// means the caller's bookkeeping is broken; the map is left untouched.
    pub fn free<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: BlockPointer) -> Result<()> {
        if index < self.reserved_until || index >= self.block_count || self.is_free(index) {
            error!(block = index, "invalid free of block");
            debug_assert!(false, "invalid free of block {}", index);
            return Ok(());
        }
        self.mark_free(io, index)?;
        trace!(block = index, "freed block");
        Ok(())
    }

    pub fn free_count(&self) -> u64 {
        self.free_count
    }

    pub fn total_count(&self) -> u64 {
        self.block_count as u64
    }

    pub(crate) fn is_free(&self, index: BlockPointer) -> bool {
        self.data[(index / 8) as usize] & (1 << (index % 8)) == 0
    }

    pub(crate) fn is_used(&self, index: BlockPointer) -> bool {
        !self.is_free(index)
    }

    fn mark_used_mem(&mut self, index: BlockPointer) {
        if self.is_free(index) {
            self.free_count -= 1;
        }
        self.data[(index / 8) as usize] |= 1 << (index % 8);
    }

    fn mark_used<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: BlockPointer) -> Result<()> {
        self.mark_used_mem(index);
        self.write_part(io, index)
    }

    fn mark_free_mem(&mut self, index: BlockPointer) {
        if self.is_used(index) {
            self.free_count += 1;
        }
        self.data[(index / 8) as usize] &= !(1 << (index % 8));
    }

    fn mark_free<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: BlockPointer) -> Result<()> {
        self.mark_free_mem(index);
        self.write_part(io, index)
    }
}
