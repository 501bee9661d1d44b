use tracing::trace;

use crate::consts::{BlockPointer, InodePointer, INODES_PER_BLOCK};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::inode::Inode;
use crate::util::error::{FsError, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

/// Fixed-capacity array of inode records starting at `table_index`.
///
/// Liveness is not stored separately on disk: a record is live when its
/// mode is non-zero, and the in-memory map is rebuilt from the records at
/// mount time. Inode 0 is never handed out so that zero can mean "none".
pub struct InodeTable {
    map: Vec<u8>,
    table_index: BlockPointer,
    pub(crate) inode_count: u32,
    pub(crate) block_count: u32,
    live_count: u32,
}

impl InodeTable {
    pub fn create<A: DeviceDriver>(io: &mut IO<A>, index: BlockPointer, inode_count: u32) -> Result<InodeTable> {
        let block_count = inode_count.div_ceil(INODES_PER_BLOCK as u32);
        for i in 0..block_count {
            io.zero_block(index as u64 + i as u64)?;
        }
        let mut table = InodeTable {
            map: vec![0u8; (inode_count as usize).div_ceil(8)],
            table_index: index,
            inode_count,
            block_count,
            live_count: 0,
        };
        table.mark_used(0);
        Ok(table)
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>, index: BlockPointer, inode_count: u32) -> Result<InodeTable> {
        let block_count = inode_count.div_ceil(INODES_PER_BLOCK as u32);
        let mut table = InodeTable {
            map: vec![0u8; (inode_count as usize).div_ceil(8)],
            table_index: index,
            inode_count,
            block_count,
            live_count: 0,
        };
        table.mark_used(0);

        let size = Inode::size_on_disk();
        for i in 0..block_count {
            let block_index = index + i;
            let block = io.read_block(block_index as u64)?;
            for (slot, record) in block.chunks(size).enumerate() {
                let inode_index = i * INODES_PER_BLOCK as u32 + slot as u32;
                if inode_index == 0 || inode_index >= inode_count {
                    continue;
                }
                let inode = Inode::from_bytes(record).map_err(|error| FsError::Corruption {
                    block: block_index,
                    detail: format!("inode {}: {}", inode_index, error),
                })?;
                if !inode.is_live() {
                    continue;
                }
                if inode.kind().is_none() {
                    return Err(FsError::Corruption {
                        block: block_index,
                        detail: format!("inode {} has unknown mode {:o}", inode_index, inode.mode),
                    });
                }
                table.mark_used(inode_index);
            }
        }
        Ok(table)
    }

    pub fn read_inode<A: DeviceDriver>(&self, io: &IO<A>, index: InodePointer) -> Result<Inode> {
        if !self.is_live(index) {
            return Err(FsError::NotFound);
        }
        let block_index = self.inode_block(index);
        let offset = InodeTable::inode_offset(index);
        let block = io.read_block(block_index as u64)?;
        Inode::from_bytes(&block[offset..offset + Inode::size_on_disk()]).map_err(|error| FsError::Corruption {
            block: block_index,
            detail: format!("inode {}: {}", index, error),
        })
    }

    pub fn write_inode<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: InodePointer, inode: &Inode) -> Result<()> {
        if index == 0 || index >= self.inode_count {
            return Err(FsError::NotFound);
        }
        let block_index = self.inode_block(index) as u64;
        let offset = InodeTable::inode_offset(index);
        let mut block = io.read_block(block_index)?;
        block[offset..offset + Inode::size_on_disk()].copy_from_slice(&inode.to_bytes());
        io.write_block(block_index, &block)
    }

    /// Stores `inode` in the lowest free record and returns its number.
    pub fn allocate<A: DeviceDriver>(&mut self, io: &mut IO<A>, inode: &Inode) -> Result<InodePointer> {
        let index = (1..self.inode_count).find(|i| !self.is_live(*i)).ok_or(FsError::NoSpace)?;
        self.write_inode(io, index, inode)?;
        self.mark_used(index);
        trace!(inode = index, "allocated inode");
        Ok(index)
    }

    /// Clears the record. The inode's blocks must already be released.
    pub fn free<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: InodePointer) -> Result<()> {
        if index == 0 || !self.is_live(index) {
            return Err(FsError::NotFound);
        }
        self.write_inode(io, index, &Inode::free())?;
        self.mark_free(index);
        trace!(inode = index, "freed inode");
        Ok(())
    }

    pub fn free_count(&self) -> u64 {
        (self.inode_count - 1 - self.live_count) as u64
    }

    pub fn is_live(&self, index: InodePointer) -> bool {
        index != 0 && index < self.inode_count && self.map[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    #[inline]
    fn inode_block(&self, index: InodePointer) -> BlockPointer {
        self.table_index + index / INODES_PER_BLOCK as u32
    }

    #[inline]
    fn inode_offset(index: InodePointer) -> usize {
        (index as usize % INODES_PER_BLOCK) * Inode::size_on_disk()
    }

    fn mark_used(&mut self, index: InodePointer) {
        if index != 0 && !self.is_live(index) {
            self.live_count += 1;
        }
        self.map[(index / 8) as usize] |= 1 << (index % 8);
    }

    fn mark_free(&mut self, index: InodePointer) {
        if self.is_live(index) {
            self.live_count -= 1;
        }
        self.map[(index / 8) as usize] &= !(1 << (index % 8));
    }
}
