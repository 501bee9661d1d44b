use crate::consts::{BlockPointer, InodePointer, BLOCK_SIZE, INODES_PER_BLOCK, MAGIC, SUPERBLOCK_BLOCK, VERSION};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::{FsError, Result};
use crate::util::serializable::{read_u32, write_u32, ByteSerializable, KnownSize};

const SUPERBLOCK_FIELDS: usize = 10;

/// Layout description stored in block 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub block_count: u32,
    pub bitmap_start: BlockPointer,
    pub bitmap_blocks: u32,
    pub inode_table_start: BlockPointer,
    pub inode_table_blocks: u32,
    pub inode_count: u32,
    pub root_inode: InodePointer,
}

impl SuperBlock {
    /// Lays out a fresh image: superblock, bitmap, inode table, data.
    pub fn new(block_count: u32, inode_count: u32) -> SuperBlock {
        let bits_per_block = (BLOCK_SIZE * 8) as u32;
        let bitmap_blocks = block_count.div_ceil(bits_per_block);
        let inode_table_blocks = inode_count.div_ceil(INODES_PER_BLOCK as u32);
        let bitmap_start = SUPERBLOCK_BLOCK + 1;

        SuperBlock {
            magic: MAGIC,
            version: VERSION,
            block_size: BLOCK_SIZE as u32,
            block_count,
            bitmap_start,
            bitmap_blocks,
            inode_table_start: bitmap_start + bitmap_blocks,
            inode_table_blocks,
            inode_count: inode_table_blocks * INODES_PER_BLOCK as u32,
            root_inode: crate::consts::ROOT_INODE,
        }
    }

    /// First block past the reserved metadata regions.
    pub fn data_start(&self) -> BlockPointer {
        self.inode_table_start + self.inode_table_blocks
    }

    /// Blocks that `statfs` reports: everything but superblock and bitmap.
    pub fn reported_blocks(&self) -> u64 {
        self.block_count as u64 - 1 - self.bitmap_blocks as u64
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>) -> Result<SuperBlock> {
        let block = io.read_block(SUPERBLOCK_BLOCK as u64)?;
        let superblock = SuperBlock::from_bytes(&block)?;
        superblock.validate(io.get_block_count())?;
        Ok(superblock)
    }

    pub fn write<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        let mut buffer = self.to_bytes();
        buffer.resize(io.get_block_size(), 0);
        io.write_block(SUPERBLOCK_BLOCK as u64, &buffer)
    }

    pub(crate) fn validate(&self, device_blocks: u64) -> Result<()> {
        if self.magic != MAGIC {
            return Err(FsError::Format(format!("bad magic {:#010x}", self.magic)));
        }
        if self.version != VERSION {
            return Err(FsError::Format(format!("unsupported version {}", self.version)));
        }
        if self.block_size as usize != BLOCK_SIZE {
            return Err(FsError::Format(format!("unsupported block size {}", self.block_size)));
        }
        if self.block_count as u64 > device_blocks {
            return Err(FsError::Format(format!(
                "image holds {} blocks, superblock claims {}",
                device_blocks, self.block_count
            )));
        }

        let expected = SuperBlock::new(self.block_count, self.inode_count);
        if self.bitmap_start != expected.bitmap_start
            || self.bitmap_blocks != expected.bitmap_blocks
            || self.inode_table_start != expected.inode_table_start
            || self.inode_table_blocks != expected.inode_table_blocks
            || self.inode_count != expected.inode_count
        {
            return Err(FsError::Format("inconsistent region geometry".to_string()));
        }
        if self.data_start() >= self.block_count {
            return Err(FsError::Format("no room for a data region".to_string()));
        }
        if self.root_inode == 0 || self.root_inode >= self.inode_count {
            return Err(FsError::Format(format!("root inode {} out of range", self.root_inode)));
        }
        Ok(())
    }
}

impl ByteSerializable for SuperBlock {
    fn to_bytes(&self) -> Vec<u8> {
        let fields = [
            self.magic,
            self.version,
            self.block_size,
            self.block_count,
            self.bitmap_start,
            self.bitmap_blocks,
            self.inode_table_start,
            self.inode_table_blocks,
            self.inode_count,
            self.root_inode,
        ];
        let mut buffer = vec![0u8; SuperBlock::size_on_disk()];
        for (i, field) in fields.iter().enumerate() {
            write_u32(&mut buffer, i * 4, *field);
        }
        buffer
    }

    fn from_bytes(bytes: &[u8]) -> Result<SuperBlock> {
        if bytes.len() < SuperBlock::size_on_disk() {
            return Err(FsError::Format("superblock truncated".to_string()));
        }
        Ok(SuperBlock {
            magic: read_u32(bytes, 0),
            version: read_u32(bytes, 4),
            block_size: read_u32(bytes, 8),
            block_count: read_u32(bytes, 12),
            bitmap_start: read_u32(bytes, 16),
            bitmap_blocks: read_u32(bytes, 20),
            inode_table_start: read_u32(bytes, 24),
            inode_table_blocks: read_u32(bytes, 28),
            inode_count: read_u32(bytes, 32),
            root_inode: read_u32(bytes, 36),
        })
    }
}

impl KnownSize for SuperBlock {
    fn size_on_disk() -> usize {
        SUPERBLOCK_FIELDS * 4
    }
}
