use crate::consts::INODES_PER_BLOCK;
use crate::util::mode::ModeBits;

/// Parameters for laying out a fresh image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    /// Blocks to use; the whole device when unset.
    pub block_count: Option<u32>,
    /// Inode records; one per four blocks when unset.
    pub inode_count: Option<u32>,
    pub root_mode: ModeBits,
    pub root_uid: u32,
    pub root_gid: u32,
}

impl FormatOptions {
    /// One inode per four blocks, rounded up to a whole table block.
    pub fn default_inode_count(block_count: u32) -> u32 {
        let per_block = INODES_PER_BLOCK as u32;
        (block_count / 4).div_ceil(per_block).max(1) * per_block
    }
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            block_count: None,
            inode_count: None,
            root_mode: 0o777,
            root_uid: 0,
            root_gid: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FormatOptions;

    #[test]
    fn inode_count_defaults() {
        assert_eq!(FormatOptions::default_inode_count(400), 128);
        assert_eq!(FormatOptions::default_inode_count(3), 32);
        assert_eq!(FormatOptions::default_inode_count(128), 32);
        assert_eq!(FormatOptions::default_inode_count(132), 64);
    }
}
