use std::time::SystemTime;

use crate::consts::{InodePointer, DIRENT_SIZE, MAX_NAME_LEN};
use crate::driver::DeviceDriver;
use crate::structure::inode::Inode;
use crate::structure::Structure;
use crate::util::error::{FsError, Result};
use crate::util::serializable::{read_u32, write_u32, ByteSerializable, KnownSize};

const NAME_OFFSET: usize = 4;
const VALID_BIT: u32 = 1;

/// One 32-byte directory slot: a valid bit and inode number packed into the
/// first word, then the NUL-padded name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    valid: bool,
    inode: InodePointer,
    name: String,
}

impl Entry {
    fn new(name: &str, inode: InodePointer) -> Entry {
        Entry { valid: true, inode, name: name.to_string() }
    }

    fn empty() -> Entry {
        Entry { valid: false, inode: 0, name: String::new() }
    }

    fn is_named(&self, name: &str) -> bool {
        self.valid && self.name == name
    }
}

impl ByteSerializable for Entry {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; DIRENT_SIZE];
        let word = (self.inode << 1) | if self.valid { VALID_BIT } else { 0 };
        write_u32(&mut bytes, 0, word);
        let name = self.name.as_bytes();
        bytes[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Entry> {
        let word = read_u32(bytes, 0);
        let raw_name = &bytes[NAME_OFFSET..DIRENT_SIZE];
        let length = raw_name.iter().position(|b| *b == 0).unwrap_or(raw_name.len()).min(MAX_NAME_LEN);
        let name = std::str::from_utf8(&raw_name[..length])
            .map_err(|_| FsError::InvalidName(String::from_utf8_lossy(&raw_name[..length]).into_owned()))?;
        Ok(Entry { valid: word & VALID_BIT != 0, inode: word >> 1, name: name.to_string() })
    }
}

impl KnownSize for Entry {
    fn size_on_disk() -> usize {
        DIRENT_SIZE
    }
}

/// Names must be 1 to 27 bytes without `/` or NUL, and not `.` or `..`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > MAX_NAME_LEN
        || name == "."
        || name == ".."
        || name.bytes().any(|b| b == b'/' || b == 0)
    {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A directory's entries live in its data blocks as an array of slots. The
/// inode's size covers every slot ever used; removal only clears the valid
/// bit, and insertion reuses the lowest cleared slot before appending.
pub struct Directory {
    pub(crate) index: InodePointer,
    pub(crate) inode: Inode,
}

impl Directory {
    pub fn open<A: DeviceDriver>(structure: &Structure<A>, index: InodePointer) -> Result<Directory> {
        let inode = structure.read_inode(index)?;
        Directory::from_inode(index, inode)
    }

    pub fn from_inode(index: InodePointer, inode: Inode) -> Result<Directory> {
        if !inode.is_directory() {
            return Err(FsError::NotDirectory);
        }
        Ok(Directory { index, inode })
    }

    fn slots<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<Vec<Entry>> {
        let data = structure.read_data(&self.inode, 0, self.inode.size)?;
        data.chunks_exact(Entry::size_on_disk()).map(Entry::from_bytes).collect()
    }

    fn find<A: DeviceDriver>(&self, structure: &Structure<A>, name: &str) -> Result<Option<(usize, Entry)>> {
        Ok(self.slots(structure)?.into_iter().enumerate().find(|(_, entry)| entry.is_named(name)))
    }

    pub fn lookup<A: DeviceDriver>(&self, structure: &Structure<A>, name: &str) -> Result<InodePointer> {
        if name.len() > MAX_NAME_LEN {
            return Err(FsError::NotFound);
        }
        match self.find(structure, name)? {
            Some((_, entry)) => Ok(entry.inode),
            None => Err(FsError::NotFound),
        }
    }

    /// Live entries in slot order.
    pub fn list<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<Vec<(String, InodePointer)>> {
        Ok(self
            .slots(structure)?
            .into_iter()
            .filter(|entry| entry.valid)
            .map(|entry| (entry.name, entry.inode))
            .collect())
    }

    pub fn is_empty<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<bool> {
        Ok(self.slots(structure)?.iter().all(|entry| !entry.valid))
    }

    pub fn insert<A: DeviceDriver>(&mut self, structure: &mut Structure<A>, name: &str, index: InodePointer) -> Result<()> {
        validate_name(name)?;
        let slots = self.slots(structure)?;
        if slots.iter().any(|entry| entry.is_named(name)) {
            return Err(FsError::Exists);
        }

        let slot = slots.iter().position(|entry| !entry.valid).unwrap_or(slots.len());
        let kept = structure.mapped_blocks(&self.inode)?.len() as u64;
        let mut staged = self.inode.clone();
        structure.grow(&mut staged, ((slot + 1) * DIRENT_SIZE) as u64)?;
        staged.touch_modified(SystemTime::now());
        let result = structure
            .write_data(&staged, (slot * DIRENT_SIZE) as u64, &Entry::new(name, index).to_bytes())
            .and_then(|_| structure.write_inode(self.index, &staged));
        if let Err(error) = result {
            return Err(structure.undo_growth(&mut staged, kept, error));
        }
        self.inode = staged;
        Ok(())
    }

    /// Clears the entry's slot and returns the inode it named.
    pub fn remove<A: DeviceDriver>(&mut self, structure: &mut Structure<A>, name: &str) -> Result<InodePointer> {
        let (slot, entry) = self.find(structure, name)?.ok_or(FsError::NotFound)?;
        structure.write_data(&self.inode, (slot * DIRENT_SIZE) as u64, &Entry::empty().to_bytes())?;
        self.commit(structure)?;
        Ok(entry.inode)
    }

    /// Rewrites the name in place; the slot and inode number stay the same.
    pub fn rename<A: DeviceDriver>(&mut self, structure: &mut Structure<A>, from: &str, to: &str) -> Result<()> {
        validate_name(to)?;
        let (slot, entry) = self.find(structure, from)?.ok_or(FsError::NotFound)?;
        if from == to {
            return Ok(());
        }
        if self.find(structure, to)?.is_some() {
            return Err(FsError::Exists);
        }
        structure.write_data(&self.inode, (slot * DIRENT_SIZE) as u64, &Entry::new(to, entry.inode).to_bytes())?;
        self.commit(structure)
    }

    fn commit<A: DeviceDriver>(&mut self, structure: &mut Structure<A>) -> Result<()> {
        self.inode.touch_modified(SystemTime::now());
        structure.write_inode(self.index, &self.inode)
    }
}
