pub const BLOCK_SIZE: usize = 4096;
pub const SUPERBLOCK_BLOCK: BlockPointer = 0;
pub const MAGIC: u32 = 0x3736_3030;
pub const VERSION: u32 = 1;

pub const DIRECT_POINTERS: usize = 12;
pub const POINTER_SIZE: usize = 4;
pub const INDIRECT_POINTERS: usize = BLOCK_SIZE / POINTER_SIZE;
pub const MAX_FILE_BLOCKS: u64 = (DIRECT_POINTERS + INDIRECT_POINTERS) as u64;
pub const MAX_FILE_SIZE: u64 = MAX_FILE_BLOCKS * BLOCK_SIZE as u64;

pub const INODE_SIZE: usize = 128;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
pub const ROOT_INODE: InodePointer = 1;

pub const MAX_NAME_LEN: usize = 27;
pub const DIRENT_SIZE: usize = 32;
pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;

pub const NULL_POINTER: BlockPointer = 0;

pub type BlockPointer = u32;
pub type InodePointer = u32;
pub type DirectPointers = [BlockPointer; DIRECT_POINTERS];
