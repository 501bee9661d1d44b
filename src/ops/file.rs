use std::time::SystemTime;

use tracing::debug;

use crate::consts::InodePointer;
use crate::driver::DeviceDriver;
use crate::ops::Mount;
use crate::structure::inode::Inode;
use crate::util::error::{FsError, Result};

impl<A: DeviceDriver> Mount<A> {
    fn open_file(&self, path: &str) -> Result<(InodePointer, Inode)> {
        let index = self.resolve(path)?;
        let inode = self.structure.read_inode(index)?;
        if inode.is_directory() {
            return Err(FsError::IsDirectory);
        }
        Ok((index, inode))
    }

    /// Reads up to `length` bytes at `offset`; fewer near the end of the
    /// file and none at or past it.
    pub fn read(&self, path: &str, length: u64, offset: u64) -> Result<Vec<u8>> {
        debug!(path, length, offset, "read");
        let (_, inode) = self.open_file(path)?;
        self.structure.read_data(&inode, offset, length)
    }

    /// Writes `data` at `offset`, growing the file first when the write
    /// ends past its current size. A gap before `offset` reads as zeros.
    pub fn write(&mut self, path: &str, data: &[u8], offset: u64) -> Result<usize> {
        debug!(path, length = data.len(), offset, "write");
        let (index, mut inode) = self.open_file(path)?;
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| FsError::invalid_argument(format!("write at {} overflows", offset)))?;

        let kept = self.structure.mapped_blocks(&inode)?.len() as u64;
        self.structure.grow(&mut inode, end)?;
        let result = self.structure.write_data(&inode, offset, data).and_then(|written| {
            inode.touch_modified(SystemTime::now());
            self.structure.write_inode(index, &inode).map(|()| written)
        });
        result.map_err(|error| self.structure.undo_growth(&mut inode, kept, error))
    }

    pub fn truncate(&mut self, path: &str, size: u64) -> Result<()> {
        debug!(path, size, "truncate");
        let (index, mut inode) = self.open_file(path)?;
        if size <= inode.size {
            self.structure.shrink(&mut inode, size)?;
            inode.touch_modified(SystemTime::now());
            return self.structure.write_inode(index, &inode);
        }

        let kept = self.structure.mapped_blocks(&inode)?.len() as u64;
        self.structure.grow(&mut inode, size)?;
        inode.touch_modified(SystemTime::now());
        self.structure
            .write_inode(index, &inode)
            .map_err(|error| self.structure.undo_growth(&mut inode, kept, error))
    }
}
