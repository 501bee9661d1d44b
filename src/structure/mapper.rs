use tracing::warn;

use crate::consts::{BlockPointer, BLOCK_SIZE, DIRECT_POINTERS, INDIRECT_POINTERS, MAX_FILE_BLOCKS, MAX_FILE_SIZE, NULL_POINTER};
use crate::driver::DeviceDriver;
use crate::structure::inode::Inode;
use crate::structure::Structure;
use crate::util::error::{FsError, Result};
use crate::util::serializable::{read_u32, write_u32};

/// The part of one block touched by a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub block: BlockPointer,
    pub offset: usize,
    pub length: usize,
}

impl<A: DeviceDriver> Structure<A> {
    /// Physical blocks of `inode` in logical order: the direct pointers,
    /// then the entries of the indirect block, up to the first null.
    pub fn mapped_blocks(&self, inode: &Inode) -> Result<Vec<BlockPointer>> {
        let mut blocks: Vec<BlockPointer> = inode.pointers.iter().copied().take_while(|p| *p != NULL_POINTER).collect();
        if blocks.len() == DIRECT_POINTERS && inode.indirect != NULL_POINTER {
            let indirect = self.read_pointers(inode.indirect)?;
            blocks.extend(indirect.into_iter().take_while(|p| *p != NULL_POINTER));
        }
        Ok(blocks)
    }

    /// Splits `[offset, offset + length)`, clipped to the inode's size,
    /// into per-block spans.
    pub fn spans(&self, inode: &Inode, offset: u64, length: u64) -> Result<Vec<Span>> {
        let end = offset.saturating_add(length).min(inode.size);
        if offset >= end {
            return Ok(Vec::new());
        }

        let blocks = self.mapped_blocks(inode)?;
        let block_size = BLOCK_SIZE as u64;
        let mut spans = Vec::new();
        let mut position = offset;
        while position < end {
            let index = (position / block_size) as usize;
            let block = *blocks.get(index).ok_or_else(|| FsError::Corruption {
                block: inode.indirect,
                detail: format!("size {} not covered by {} blocks", inode.size, blocks.len()),
            })?;
            let block_offset = (position % block_size) as usize;
            let length = (BLOCK_SIZE - block_offset).min((end - position) as usize);
            spans.push(Span { block, offset: block_offset, length });
            position += length as u64;
        }
        Ok(spans)
    }

    /// Makes sure at least `count` zero-filled blocks are mapped. Either all
    /// new blocks are mapped or, on failure, every block taken by this call
    /// is returned to the free pool and `inode` is left as it was.
    pub fn reserve(&mut self, inode: &mut Inode, count: u64) -> Result<()> {
        if count > MAX_FILE_BLOCKS {
            return Err(FsError::invalid_argument(format!("{} blocks exceed the maximum file size", count)));
        }
        let current = self.mapped_blocks(inode)?.len() as u64;
        if count <= current {
            return Ok(());
        }

        let mut staged = inode.clone();
        let mut fresh = Vec::new();
        match self.map_new_blocks(&mut staged, current, count, &mut fresh) {
            Ok(()) => {
                *inode = staged;
                Ok(())
            }
            Err(error) => {
                for block in fresh.into_iter().rev() {
                    self.free_block(block)?;
                }
                Err(error)
            }
        }
    }

    fn map_new_blocks(&mut self, staged: &mut Inode, from: u64, to: u64, fresh: &mut Vec<BlockPointer>) -> Result<()> {
        let mut indirect = if staged.indirect != NULL_POINTER {
            Some(self.read_pointers(staged.indirect)?)
        } else {
            None
        };

        for index in from as usize..to as usize {
            if index < DIRECT_POINTERS {
                let block = self.allocate_zeroed(fresh)?;
                staged.pointers[index] = block;
                continue;
            }

            if staged.indirect == NULL_POINTER {
                staged.indirect = self.allocate_block()?;
                fresh.push(staged.indirect);
                indirect = Some(vec![NULL_POINTER; INDIRECT_POINTERS]);
            }
            let block = self.allocate_zeroed(fresh)?;
            if let Some(pointers) = indirect.as_mut() {
                pointers[index - DIRECT_POINTERS] = block;
            }
        }

        if let Some(pointers) = indirect {
            if to as usize > DIRECT_POINTERS {
                self.write_pointers(staged.indirect, &pointers)?;
            }
        }
        Ok(())
    }

    fn allocate_zeroed(&mut self, fresh: &mut Vec<BlockPointer>) -> Result<BlockPointer> {
        let block = self.allocate_block()?;
        fresh.push(block);
        self.io.zero_block(block as u64)?;
        Ok(block)
    }

    /// Frees every mapped block past the first `keep`, and the indirect
    /// block once nothing lives in it.
    pub fn release(&mut self, inode: &mut Inode, keep: u64) -> Result<()> {
        let blocks = self.mapped_blocks(inode)?;
        let keep = keep as usize;
        if keep >= blocks.len() {
            return Ok(());
        }

        let mut indirect = if inode.indirect != NULL_POINTER {
            Some(self.read_pointers(inode.indirect)?)
        } else {
            None
        };
        for index in (keep..blocks.len()).rev() {
            self.free_block(blocks[index])?;
            if index < DIRECT_POINTERS {
                inode.pointers[index] = NULL_POINTER;
            } else if let Some(pointers) = indirect.as_mut() {
                pointers[index - DIRECT_POINTERS] = NULL_POINTER;
            }
        }

        if let Some(pointers) = indirect {
            if keep <= DIRECT_POINTERS {
                self.free_block(inode.indirect)?;
                inode.indirect = NULL_POINTER;
            } else {
                self.write_pointers(inode.indirect, &pointers)?;
            }
        }
        Ok(())
    }

    /// Extends `inode` to `new_size` bytes; the new range reads as zeros.
    pub fn grow(&mut self, inode: &mut Inode, new_size: u64) -> Result<()> {
        if new_size > MAX_FILE_SIZE {
            return Err(FsError::invalid_argument(format!("size {} exceeds {}", new_size, MAX_FILE_SIZE)));
        }
        if new_size <= inode.size {
            return Ok(());
        }
        self.reserve(inode, Inode::blocks_for(new_size))?;
        inode.size = new_size;
        Ok(())
    }

    /// Drops every block mapped past the first `kept` after a later step of
    /// the operation that grew `inode` failed, and passes that failure on.
    pub fn undo_growth(&mut self, inode: &mut Inode, kept: u64, error: FsError) -> FsError {
        if let Err(cleanup) = self.release(inode, kept) {
            warn!(%cleanup, kept, "could not release blocks of a failed update");
        }
        error
    }

    /// Cuts `inode` down to `new_size` bytes, freeing whole blocks and
    /// zeroing the tail of the last one kept.
    pub fn shrink(&mut self, inode: &mut Inode, new_size: u64) -> Result<()> {
        if new_size >= inode.size {
            return Ok(());
        }
        self.release(inode, Inode::blocks_for(new_size))?;

        let tail = (new_size % BLOCK_SIZE as u64) as usize;
        if tail != 0 {
            let index = (new_size / BLOCK_SIZE as u64) as usize;
            if let Some(block) = self.mapped_blocks(inode)?.get(index).copied() {
                let mut data = self.read_block(block)?;
                data[tail..].fill(0);
                self.write_block(block, &data)?;
            }
        }
        inode.size = new_size;
        Ok(())
    }

    /// Copies `[offset, offset + length)` clipped to the inode's size.
    pub fn read_data(&self, inode: &Inode, offset: u64, length: u64) -> Result<Vec<u8>> {
        let spans = self.spans(inode, offset, length)?;
        let total: usize = spans.iter().map(|span| span.length).sum();
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(total).map_err(|_| FsError::OutOfMemory)?;

        for span in spans {
            let block = self.read_block(span.block)?;
            buffer.extend_from_slice(&block[span.offset..span.offset + span.length]);
        }
        Ok(buffer)
    }

    /// Overwrites bytes inside the inode's current size.
    pub fn write_data(&mut self, inode: &Inode, offset: u64, data: &[u8]) -> Result<usize> {
        let spans = self.spans(inode, offset, data.len() as u64)?;
        let mut written = 0;
        for span in spans {
            let chunk = &data[written..written + span.length];
            if span.length == BLOCK_SIZE {
                self.write_block(span.block, chunk)?;
            } else {
                let mut block = self.read_block(span.block)?;
                block[span.offset..span.offset + span.length].copy_from_slice(chunk);
                self.write_block(span.block, &block)?;
            }
            written += span.length;
        }
        Ok(written)
    }

    fn read_pointers(&self, block: BlockPointer) -> Result<Vec<BlockPointer>> {
        let data = self.read_block(block)?;
        Ok((0..INDIRECT_POINTERS).map(|i| read_u32(&data, i * 4)).collect())
    }

    fn write_pointers(&mut self, block: BlockPointer, pointers: &[BlockPointer]) -> Result<()> {
        let mut data = vec![0u8; BLOCK_SIZE];
        for (i, pointer) in pointers.iter().enumerate() {
            write_u32(&mut data, i * 4, *pointer);
        }
        self.write_block(block, &data)
    }
}
