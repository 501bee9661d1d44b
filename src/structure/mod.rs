use std::time::SystemTime;

use tracing::info;

use crate::config::FormatOptions;
use crate::consts::{BlockPointer, InodePointer, BLOCK_SIZE};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::blockmap::BlockMap;
use crate::structure::inode::{Inode, InodeKind};
use crate::structure::inode_table::InodeTable;
use crate::structure::superblock::SuperBlock;
use crate::util::error::{FsError, Result};

pub mod blockmap;
pub mod inode;
pub mod inode_table;
pub mod mapper;
pub mod superblock;

/// Everything that lives on the image: block layer, layout, free-space map
/// and inode table.
pub struct Structure<A: DeviceDriver> {
    pub(crate) io: IO<A>,
    pub(crate) superblock: SuperBlock,
    pub(crate) block_map: BlockMap,
    pub(crate) inode_table: InodeTable,
}

impl<A: DeviceDriver> Structure<A> {
    /// Writes an empty file system to `device` and mounts it.
    pub fn format(device: A, options: &FormatOptions) -> Result<Structure<A>> {
        let mut io = IO::new(device, BLOCK_SIZE)?;
        let device_blocks = io.get_block_count();
        let block_count = match options.block_count {
            Some(count) if count as u64 > device_blocks => {
                return Err(FsError::Format(format!(
                    "device holds {} blocks, {} requested",
                    device_blocks, count
                )));
            }
            Some(count) => count,
            None => u32::try_from(device_blocks)
                .map_err(|_| FsError::Format(format!("device too large: {} blocks", device_blocks)))?,
        };
        let inode_count = options.inode_count.unwrap_or_else(|| FormatOptions::default_inode_count(block_count));

        let superblock = SuperBlock::new(block_count, inode_count);
        if superblock.inode_count <= superblock.root_inode {
            return Err(FsError::Format(format!("{} inodes leave no room for the root", superblock.inode_count)));
        }
        // root directory needs its entry block on top of the metadata
        if superblock.data_start() >= block_count {
            return Err(FsError::Format(format!("{} blocks is too small for a file system", block_count)));
        }
        io.limit_block_count(block_count as u64);
        superblock.write(&mut io)?;

        let block_map = BlockMap::new(superblock.bitmap_start, block_count, superblock.data_start(), BLOCK_SIZE);
        block_map.write_full(&mut io)?;

        let inode_table = InodeTable::create(&mut io, superblock.inode_table_start, superblock.inode_count)?;

        let mut structure = Structure { io, superblock, block_map, inode_table };
        let mut root = Inode::new(
            InodeKind::Directory,
            options.root_mode,
            options.root_uid,
            options.root_gid,
            SystemTime::now(),
        );
        structure.reserve(&mut root, 1)?;
        structure.inode_table.write_inode(&mut structure.io, structure.superblock.root_inode, &root)?;
        structure.io.flush()?;

        info!(
            blocks = block_count,
            inodes = structure.superblock.inode_count,
            free = structure.block_map.free_count(),
            "formatted image"
        );
        Structure::mount(structure.io.device)
    }

    /// Loads superblock, bitmap and inode table from an existing image.
    pub fn mount(device: A) -> Result<Structure<A>> {
        let mut io = IO::new(device, BLOCK_SIZE)?;
        let superblock = SuperBlock::read(&io)?;
        io.limit_block_count(superblock.block_count as u64);

        let block_map = BlockMap::read(
            &io,
            superblock.bitmap_start,
            superblock.block_count,
            superblock.data_start(),
        )?;
        let inode_table = InodeTable::read(&io, superblock.inode_table_start, superblock.inode_count)?;

        let structure = Structure { io, superblock, block_map, inode_table };
        let root = match structure.read_inode(structure.superblock.root_inode) {
            Err(FsError::NotFound) => return Err(FsError::Format("root inode is not allocated".to_string())),
            other => other?,
        };
        if !root.is_directory() {
            return Err(FsError::Format("root inode is not a directory".to_string()));
        }

        info!(
            blocks = structure.superblock.block_count,
            free = structure.block_map.free_count(),
            "mounted image"
        );
        Ok(structure)
    }

    pub fn get_block_size(&self) -> usize {
        self.io.get_block_size()
    }

    pub fn root_inode(&self) -> InodePointer {
        self.superblock.root_inode
    }

    pub fn read_block(&self, index: BlockPointer) -> Result<Vec<u8>> {
        self.io.read_block(index as u64)
    }

    pub fn write_block(&mut self, index: BlockPointer, block: &[u8]) -> Result<()> {
        self.io.write_block(index as u64, block)
    }

    pub fn allocate_block(&mut self) -> Result<BlockPointer> {
        self.block_map.allocate(&mut self.io)
    }

    pub fn free_block(&mut self, index: BlockPointer) -> Result<()> {
        self.block_map.free(&mut self.io, index)
    }

    pub fn read_inode(&self, index: InodePointer) -> Result<Inode> {
        self.inode_table.read_inode(&self.io, index)
    }

    pub fn write_inode(&mut self, index: InodePointer, inode: &Inode) -> Result<()> {
        self.inode_table.write_inode(&mut self.io, index, inode)
    }

    pub fn create_inode(&mut self, inode: &Inode) -> Result<InodePointer> {
        self.inode_table.allocate(&mut self.io, inode)
    }

    pub fn free_inode(&mut self, index: InodePointer) -> Result<()> {
        self.inode_table.free(&mut self.io, index)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::driver::file_drive::FileDrive;

    pub(crate) fn formatted(blocks: u64) -> (tempfile::TempDir, Structure<FileDrive>) {
        let dir = tempfile::tempdir().unwrap();
        let drive = FileDrive::create(dir.path().join("structure.img"), blocks * 4096, 4096).unwrap();
        let structure = Structure::format(drive, &FormatOptions::default()).unwrap();
        (dir, structure)
    }

    #[test]
    fn format_and_mount() {
        let (dir, structure) = formatted(400);
        assert_eq!(structure.superblock, SuperBlock::new(400, 100));
        // superblock, bitmap, 4 inode table blocks, root entry block
        assert_eq!(structure.block_map.free_count(), 393);
        assert_eq!(structure.inode_table.free_count(), 126);

        let root = structure.read_inode(1).unwrap();
        assert_eq!(root.mode, 0o40777);
        assert_eq!((root.uid, root.gid, root.size), (0, 0, 0));
        assert_eq!(root.pointers[0], 6);
        drop(structure);

        let drive = FileDrive::open(dir.path().join("structure.img"), 4096).unwrap();
        let mounted = Structure::mount(drive).unwrap();
        assert_eq!(mounted.block_map.free_count(), 393);
        assert_eq!(mounted.read_inode(1).unwrap().pointers[0], 6);
    }

    #[test]
    fn mount_rejects_blank_image() {
        let dir = tempfile::tempdir().unwrap();
        let drive = FileDrive::create(dir.path().join("blank.img"), 16 * 4096, 4096).unwrap();
        assert!(matches!(Structure::mount(drive), Err(FsError::Format(_))));
    }

    #[test]
    fn format_rejects_tiny_device() {
        let dir = tempfile::tempdir().unwrap();
        let drive = FileDrive::create(dir.path().join("tiny.img"), 3 * 4096, 4096).unwrap();
        assert!(matches!(Structure::format(drive, &FormatOptions::default()), Err(FsError::Format(_))));
    }

    #[test]
    fn format_honors_options() {
        let dir = tempfile::tempdir().unwrap();
        let drive = FileDrive::create(dir.path().join("opts.img"), 200 * 4096, 4096).unwrap();
        let options = FormatOptions { block_count: Some(100), inode_count: Some(64), root_uid: 7, ..FormatOptions::default() };
        let structure = Structure::format(drive, &options).unwrap();
        assert_eq!(structure.superblock.block_count, 100);
        assert_eq!(structure.superblock.inode_count, 64);
        assert_eq!(structure.read_inode(1).unwrap().uid, 7);
        assert!(structure.read_block(100).is_err());
    }
}
