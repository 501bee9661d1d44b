use std::time::SystemTime;

use crate::consts::{InodePointer, MAX_NAME_LEN};
use crate::driver::DeviceDriver;
use crate::structure::inode::{Inode, InodeKind};
use crate::structure::Structure;
use crate::util::mode::ModeBits;

pub type UserId = u32;
pub type GroupId = u32;

/// Who new inodes belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Owner {
    pub uid: UserId,
    pub gid: GroupId,
}

/// Attributes of one inode as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub ino: InodePointer,
    pub kind: InodeKind,
    pub mode: ModeBits,
    pub uid: UserId,
    pub gid: GroupId,
    pub size: u64,
    /// Data blocks, not counting the indirect block.
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl Attr {
    pub fn new(ino: InodePointer, inode: &Inode) -> Attr {
        Attr {
            ino,
            kind: inode.kind().unwrap_or(InodeKind::File),
            mode: inode.mode,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size,
            blocks: Inode::blocks_for(inode.size).max(if inode.is_directory() { 1 } else { 0 }),
            atime: inode.accessed_at,
            mtime: inode.modified_at,
            ctime: inode.changed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub attr: Attr,
}

/// Volume statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statfs {
    pub block_size: u32,
    pub blocks: u64,
    pub free_blocks: u64,
    pub files: u64,
    pub free_files: u64,
    pub name_max: u32,
}

impl Statfs {
    pub fn new<A: DeviceDriver>(structure: &Structure<A>) -> Statfs {
        Statfs {
            block_size: structure.superblock.block_size,
            blocks: structure.superblock.reported_blocks(),
            free_blocks: structure.block_map.free_count(),
            files: structure.superblock.inode_count as u64 - 1,
            free_files: structure.inode_table.free_count(),
            name_max: MAX_NAME_LEN as u32,
        }
    }
}
