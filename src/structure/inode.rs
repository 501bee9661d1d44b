use std::time::{Duration, SystemTime};

use crate::consts::{BlockPointer, DirectPointers, BLOCK_SIZE, DIRECT_POINTERS, INODE_SIZE, NULL_POINTER};
use crate::util::error::{FsError, Result};
use crate::util::mode::{ModeBits, ModeBitsHelper, IS_DIR_MASK, IS_FILE_MASK};
use crate::util::serializable::{read_u32, read_u64, write_u32, write_u64, ByteSerializable, KnownSize};

const MODE_OFFSET: usize = 0;
const UID_OFFSET: usize = 4;
const GID_OFFSET: usize = 8;
const SIZE_OFFSET: usize = 12;
const ATIME_OFFSET: usize = 20;
const MTIME_OFFSET: usize = 32;
const CTIME_OFFSET: usize = 44;
const POINTERS_OFFSET: usize = 56;
const INDIRECT_OFFSET: usize = POINTERS_OFFSET + DIRECT_POINTERS * 4;
const TIME_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Directory,
}

impl InodeKind {
    pub fn type_bits(&self) -> ModeBits {
        match self {
            InodeKind::File => IS_FILE_MASK,
            InodeKind::Directory => IS_DIR_MASK,
        }
    }
}

/// One 128-byte inode record. A record whose mode is zero is free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub mode: ModeBits,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub accessed_at: SystemTime,
    pub modified_at: SystemTime,
    pub changed_at: SystemTime,
    pub pointers: DirectPointers,
    pub indirect: BlockPointer,
}

impl Inode {
    pub fn new(kind: InodeKind, permissions: ModeBits, uid: u32, gid: u32, now: SystemTime) -> Inode {
        Inode {
            mode: kind.type_bits() | permissions.get_permissions(),
            uid,
            gid,
            size: 0,
            accessed_at: now,
            modified_at: now,
            changed_at: now,
            pointers: [NULL_POINTER; DIRECT_POINTERS],
            indirect: NULL_POINTER,
        }
    }

    pub fn free() -> Inode {
        Inode {
            mode: 0,
            uid: 0,
            gid: 0,
            size: 0,
            accessed_at: SystemTime::UNIX_EPOCH,
            modified_at: SystemTime::UNIX_EPOCH,
            changed_at: SystemTime::UNIX_EPOCH,
            pointers: [NULL_POINTER; DIRECT_POINTERS],
            indirect: NULL_POINTER,
        }
    }

    pub fn is_live(&self) -> bool {
        self.mode != 0
    }

    pub fn kind(&self) -> Option<InodeKind> {
        if self.mode.is_directory() {
            Some(InodeKind::Directory)
        } else if self.mode.is_file() {
            Some(InodeKind::File)
        } else {
            None
        }
    }

    pub fn is_directory(&self) -> bool {
        self.mode.is_directory()
    }

    /// Blocks needed to hold `size` bytes.
    pub fn blocks_for(size: u64) -> u64 {
        size.div_ceil(BLOCK_SIZE as u64)
    }

    /// Content changed.
    pub fn touch_modified(&mut self, now: SystemTime) {
        self.modified_at = now;
        self.changed_at = now;
    }

    /// Metadata changed.
    pub fn touch_changed(&mut self, now: SystemTime) {
        self.changed_at = now;
    }
}

impl ByteSerializable for Inode {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; INODE_SIZE];
        write_u32(&mut bytes, MODE_OFFSET, self.mode);
        write_u32(&mut bytes, UID_OFFSET, self.uid);
        write_u32(&mut bytes, GID_OFFSET, self.gid);
        write_u64(&mut bytes, SIZE_OFFSET, self.size);
        bytes[ATIME_OFFSET..ATIME_OFFSET + TIME_SIZE].copy_from_slice(&self.accessed_at.to_bytes());
        bytes[MTIME_OFFSET..MTIME_OFFSET + TIME_SIZE].copy_from_slice(&self.modified_at.to_bytes());
        bytes[CTIME_OFFSET..CTIME_OFFSET + TIME_SIZE].copy_from_slice(&self.changed_at.to_bytes());
        for (i, pointer) in self.pointers.iter().enumerate() {
            write_u32(&mut bytes, POINTERS_OFFSET + i * 4, *pointer);
        }
        write_u32(&mut bytes, INDIRECT_OFFSET, self.indirect);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Inode> {
        if bytes.len() < INODE_SIZE {
            return Err(FsError::invalid_argument("inode record truncated"));
        }
        let mut pointers = [NULL_POINTER; DIRECT_POINTERS];
        for (i, pointer) in pointers.iter_mut().enumerate() {
            *pointer = read_u32(bytes, POINTERS_OFFSET + i * 4);
        }
        Ok(Inode {
            mode: read_u32(bytes, MODE_OFFSET),
            uid: read_u32(bytes, UID_OFFSET),
            gid: read_u32(bytes, GID_OFFSET),
            size: read_u64(bytes, SIZE_OFFSET),
            accessed_at: SystemTime::from_bytes(&bytes[ATIME_OFFSET..ATIME_OFFSET + TIME_SIZE])?,
            modified_at: SystemTime::from_bytes(&bytes[MTIME_OFFSET..MTIME_OFFSET + TIME_SIZE])?,
            changed_at: SystemTime::from_bytes(&bytes[CTIME_OFFSET..CTIME_OFFSET + TIME_SIZE])?,
            pointers,
            indirect: read_u32(bytes, INDIRECT_OFFSET),
        })
    }
}

impl KnownSize for Inode {
    fn size_on_disk() -> usize {
        INODE_SIZE
    }
}

// Seconds and nanoseconds since the epoch; earlier times clamp to the epoch.
impl ByteSerializable for SystemTime {
    fn to_bytes(&self) -> Vec<u8> {
        let since_unix = self.duration_since(SystemTime::UNIX_EPOCH).unwrap_or(Duration::ZERO);
        let mut result = Vec::with_capacity(TIME_SIZE);
        result.extend_from_slice(&since_unix.as_secs().to_le_bytes());
        result.extend_from_slice(&since_unix.subsec_nanos().to_le_bytes());
        result
    }

    fn from_bytes(bytes: &[u8]) -> Result<SystemTime> {
        let seconds = read_u64(bytes, 0);
        let nanos = read_u32(bytes, 8);
        if nanos >= 1_000_000_000 {
            return Err(FsError::invalid_argument(format!("timestamp nanoseconds {}", nanos)));
        }
        SystemTime::UNIX_EPOCH
            .checked_add(Duration::new(seconds, nanos))
            .ok_or_else(|| FsError::invalid_argument(format!("timestamp {} out of range", seconds)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_inode_mode() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let file = Inode::new(InodeKind::File, 0o100644, 500, 500, now);
        assert_eq!(file.mode, 0o100644);
        assert_eq!(file.kind(), Some(InodeKind::File));
        let dir = Inode::new(InodeKind::Directory, 0o755, 0, 0, now);
        assert_eq!(dir.mode, 0o40755);
        assert!(dir.is_directory());
        assert!(!Inode::free().is_live());
        assert_eq!(Inode::free().kind(), None);
    }

    #[test]
    fn record_layout() {
        let now = SystemTime::UNIX_EPOCH + Duration::new(1_600_000_000, 42);
        let mut inode = Inode::new(InodeKind::File, 0o666, 500, 501, now);
        inode.size = 4098;
        inode.pointers[0] = 9;
        inode.pointers[1] = 10;
        inode.indirect = 77;

        let bytes = inode.to_bytes();
        assert_eq!(bytes.len(), Inode::size_on_disk());
        assert_eq!(&bytes[0..4], &0o100666u32.to_le_bytes());
        assert_eq!(&bytes[12..20], &4098u64.to_le_bytes());
        assert_eq!(&bytes[56..60], &9u32.to_le_bytes());
        assert_eq!(&bytes[104..108], &77u32.to_le_bytes());
        assert!(bytes[108..].iter().all(|b| *b == 0));
        assert_eq!(Inode::from_bytes(&bytes).unwrap(), inode);
    }

    #[test]
    fn block_counts() {
        assert_eq!(Inode::blocks_for(0), 0);
        assert_eq!(Inode::blocks_for(1), 1);
        assert_eq!(Inode::blocks_for(4096), 1);
        assert_eq!(Inode::blocks_for(4097), 2);
        assert_eq!(Inode::blocks_for(12289), 4);
    }

    #[test]
    fn rejects_bad_timestamp() {
        let mut bytes = vec![0u8; 12];
        bytes[8..12].copy_from_slice(&2_000_000_000u32.to_le_bytes());
        assert!(SystemTime::from_bytes(&bytes).is_err());
    }
}
