use std::path::Path;
use std::time::SystemTime;

use tracing::debug;

use crate::config::FormatOptions;
use crate::consts::{InodePointer, BLOCK_SIZE};
use crate::driver::file_drive::FileDrive;
use crate::driver::DeviceDriver;
use crate::ops::directory::{validate_name, Directory};
use crate::ops::meta::{Attr, DirEntry, GroupId, Owner, Statfs, UserId};
use crate::structure::inode::{Inode, InodeKind};
use crate::structure::Structure;
use crate::util::error::{FsError, Result};
use crate::util::mode::{ModeBits, ModeBitsHelper};

pub mod directory;
mod file;
pub mod meta;
pub mod path;

/// A mounted image. Every operation takes an absolute path; mutating
/// operations either complete or leave the image as it was.
pub struct Mount<A: DeviceDriver> {
    structure: Structure<A>,
    owner: Owner,
}

impl Mount<FileDrive> {
    /// Mounts the image file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Mount<FileDrive>> {
        Mount::init(FileDrive::open(path, BLOCK_SIZE)?)
    }
}

impl<A: DeviceDriver> Mount<A> {
    pub fn init(device: A) -> Result<Mount<A>> {
        Ok(Mount { structure: Structure::mount(device)?, owner: Owner::default() })
    }

    pub fn format(device: A, options: &FormatOptions) -> Result<Mount<A>> {
        Ok(Mount { structure: Structure::format(device, options)?, owner: Owner::default() })
    }

    /// Sets the owner recorded on inodes created from now on.
    pub fn set_owner(&mut self, uid: UserId, gid: GroupId) {
        self.owner = Owner { uid, gid };
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn get_block_size(&self) -> usize {
        self.structure.get_block_size()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.structure.io.flush()
    }

    /// Inode number `path` resolves to.
    pub fn resolve(&self, path: &str) -> Result<InodePointer> {
        path::resolve(&self.structure, path)
    }

    pub fn getattr(&self, path: &str) -> Result<Attr> {
        debug!(path, "getattr");
        let index = self.resolve(path)?;
        Ok(Attr::new(index, &self.structure.read_inode(index)?))
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        debug!(path, "readdir");
        let directory = Directory::open(&self.structure, self.resolve(path)?)?;
        directory
            .list(&self.structure)?
            .into_iter()
            .map(|(name, index)| -> Result<DirEntry> {
                let attr = Attr::new(index, &self.structure.read_inode(index)?);
                Ok(DirEntry { name, attr })
            })
            .collect()
    }

    pub fn create(&mut self, path: &str, mode: ModeBits) -> Result<Attr> {
        debug!(path, mode = format_args!("{:o}", mode), "create");
        self.make_node(path, mode, InodeKind::File)
    }

    pub fn mkdir(&mut self, path: &str, mode: ModeBits) -> Result<Attr> {
        debug!(path, mode = format_args!("{:o}", mode), "mkdir");
        self.make_node(path, mode, InodeKind::Directory)
    }

    fn make_node(&mut self, path: &str, mode: ModeBits, kind: InodeKind) -> Result<Attr> {
        let structure = &mut self.structure;
        let (parent, leaf) = path::resolve_parent(structure, path)?;
        let leaf = leaf.ok_or(FsError::Exists)?;
        let mut directory = Directory::open(structure, parent)?;
        match directory.lookup(structure, leaf) {
            Ok(_) => return Err(FsError::Exists),
            Err(FsError::NotFound) => {}
            Err(error) => return Err(error),
        }
        validate_name(leaf)?;

        let mut inode = Inode::new(kind, mode, self.owner.uid, self.owner.gid, SystemTime::now());
        if kind == InodeKind::Directory {
            structure.reserve(&mut inode, 1)?;
        }
        let index = match structure.create_inode(&inode) {
            Ok(index) => index,
            Err(error) => {
                structure.release(&mut inode, 0)?;
                return Err(error);
            }
        };
        if let Err(error) = directory.insert(structure, leaf, index) {
            structure.free_inode(index)?;
            structure.release(&mut inode, 0)?;
            return Err(error);
        }
        Ok(Attr::new(index, &inode))
    }

    pub fn unlink(&mut self, path: &str) -> Result<()> {
        debug!(path, "unlink");
        let structure = &mut self.structure;
        let (parent, leaf) = path::resolve_parent(structure, path)?;
        let leaf = leaf.ok_or(FsError::IsDirectory)?;
        let mut directory = Directory::open(structure, parent)?;
        let index = directory.lookup(structure, leaf)?;
        let mut inode = structure.read_inode(index)?;
        if inode.is_directory() {
            return Err(FsError::IsDirectory);
        }

        directory.remove(structure, leaf)?;
        structure.release(&mut inode, 0)?;
        structure.free_inode(index)
    }

    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        debug!(path, "rmdir");
        let structure = &mut self.structure;
        let (parent, leaf) = path::resolve_parent(structure, path)?;
        let leaf = leaf.ok_or(FsError::PermissionDenied)?;
        let mut directory = Directory::open(structure, parent)?;
        let index = directory.lookup(structure, leaf)?;
        let target = Directory::open(structure, index)?;
        if !target.is_empty(structure)? {
            return Err(FsError::NotEmpty);
        }

        let mut inode = target.inode;
        directory.remove(structure, leaf)?;
        structure.release(&mut inode, 0)?;
        structure.free_inode(index)
    }

    /// Renames an entry within its directory. The inode itself, including
    /// its timestamps, is left untouched.
    ///
    /// Checks run in order: `EINVAL` when either path is the root or the
    /// parents differ, then `ENOENT` for a missing source, then `EEXIST`
    /// for a taken target name.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        debug!(from, to, "rename");
        let from_components = path::components(from)?;
        let to_components = path::components(to)?;
        let (Some((from_leaf, from_parent)), Some((to_leaf, to_parent))) =
            (from_components.split_last(), to_components.split_last())
        else {
            return Err(FsError::invalid_argument("the root cannot be renamed"));
        };
        if from_parent != to_parent {
            return Err(FsError::invalid_argument(format!("{} and {} are in different directories", from, to)));
        }

        let parent = path::walk(&self.structure, from_parent)?;
        let mut directory = Directory::open(&self.structure, parent)?;
        directory.rename(&mut self.structure, from_leaf, to_leaf)
    }

    pub fn chmod(&mut self, path: &str, mode: ModeBits) -> Result<()> {
        debug!(path, mode = format_args!("{:o}", mode), "chmod");
        let index = self.resolve(path)?;
        let mut inode = self.structure.read_inode(index)?;
        inode.mode = inode.mode.with_permissions(mode);
        inode.touch_changed(SystemTime::now());
        self.structure.write_inode(index, &inode)
    }

    pub fn utime(&mut self, path: &str, accessed_at: SystemTime, modified_at: SystemTime) -> Result<()> {
        debug!(path, "utime");
        let index = self.resolve(path)?;
        let mut inode = self.structure.read_inode(index)?;
        inode.accessed_at = accessed_at;
        inode.modified_at = modified_at;
        inode.touch_changed(SystemTime::now());
        self.structure.write_inode(index, &inode)
    }

    pub fn statfs(&self) -> Statfs {
        debug!("statfs");
        Statfs::new(&self.structure)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::consts::DIRENTS_PER_BLOCK;
    use crate::driver::failing_drive::{FailingDrive, WriteFault};

    pub(crate) fn mount(blocks: u64) -> (tempfile::TempDir, Mount<FileDrive>) {
        mount_with(blocks, &FormatOptions::default())
    }

    pub(crate) fn mount_with(blocks: u64, options: &FormatOptions) -> (tempfile::TempDir, Mount<FileDrive>) {
        let dir = tempfile::tempdir().unwrap();
        let drive = FileDrive::create(dir.path().join("mount.img"), blocks * 4096, 4096).unwrap();
        let mount = Mount::format(drive, options).unwrap();
        (dir, mount)
    }

    pub(crate) fn failing_mount(blocks: u64) -> (tempfile::TempDir, Mount<FailingDrive>, WriteFault) {
        let dir = tempfile::tempdir().unwrap();
        let (drive, fault) = FailingDrive::create(dir.path().join("mount.img"), blocks * 4096, 4096).unwrap();
        let mount = Mount::format(drive, &FormatOptions::default()).unwrap();
        (dir, mount, fault)
    }

    #[test]
    fn root_attributes() {
        let (_dir, fs) = mount(400);
        let attr = fs.getattr("/").unwrap();
        assert_eq!(attr.ino, 1);
        assert_eq!((attr.uid, attr.gid, attr.mode), (0, 0, 0o40777));
        assert_eq!(attr.kind, InodeKind::Directory);
        assert!(fs.readdir("/").unwrap().is_empty());
    }

    #[test]
    fn create_and_mkdir() {
        let (_dir, mut fs) = mount(400);
        fs.set_owner(500, 501);
        let file = fs.create("/file", 0o644).unwrap();
        assert_eq!((file.mode, file.uid, file.gid, file.size), (0o100644, 500, 501, 0));
        let dir = fs.mkdir("/dir", 0o755).unwrap();
        assert_eq!(dir.mode, 0o40755);

        assert!(matches!(fs.create("/file", 0o644), Err(FsError::Exists)));
        assert!(matches!(fs.mkdir("/file", 0o755), Err(FsError::Exists)));
        assert!(matches!(fs.mkdir("/", 0o755), Err(FsError::Exists)));
        assert!(matches!(fs.create("/missing/file", 0o644), Err(FsError::NotFound)));
        assert!(matches!(fs.create("/file/inner", 0o644), Err(FsError::NotDirectory)));
        assert!(matches!(fs.create("relative", 0o644), Err(FsError::InvalidArgument(_))));
        assert!(matches!(fs.create(&format!("/{}", "x".repeat(28)), 0o644), Err(FsError::InvalidName(_))));

        let names: Vec<String> = fs.readdir("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["file", "dir"]);
        assert!(matches!(fs.readdir("/file"), Err(FsError::NotDirectory)));
    }

    #[test]
    fn failed_create_leaves_counts() {
        let (_dir, mut fs) = mount(400);
        let before = fs.statfs();
        assert!(fs.create(&format!("/{}", "y".repeat(40)), 0o644).is_err());
        assert!(fs.mkdir("/missing/dir", 0o755).is_err());
        assert_eq!(fs.statfs(), before);
    }

    #[test]
    fn mkdir_with_full_inode_table() {
        let (_dir, mut fs) = mount_with(400, &FormatOptions { inode_count: Some(32), ..FormatOptions::default() });
        for i in 0..30 {
            fs.create(&format!("/file-{}", i), 0o644).unwrap();
        }
        let before = fs.statfs();
        assert_eq!(before.free_files, 0);

        assert!(matches!(fs.mkdir("/dir", 0o755), Err(FsError::NoSpace)));
        assert!(matches!(fs.create("/file", 0o644), Err(FsError::NoSpace)));
        assert_eq!(fs.statfs(), before);
        assert!(matches!(fs.getattr("/dir"), Err(FsError::NotFound)));
    }

    #[test]
    fn create_into_full_directory_on_full_disk() {
        let (_dir, mut fs) = mount_with(400, &FormatOptions { inode_count: Some(160), ..FormatOptions::default() });
        fs.create("/filler", 0o644).unwrap();
        for i in 1..DIRENTS_PER_BLOCK {
            fs.create(&format!("/file-{}", i), 0o644).unwrap();
        }
        // the filler's data blocks and its indirect block take every free block
        let free = fs.statfs().free_blocks;
        fs.write("/filler", &vec![3u8; (free as usize - 1) * 4096], 0).unwrap();
        let before = fs.statfs();
        assert_eq!(before.free_blocks, 0);
        assert!(before.free_files > 0);

        assert!(matches!(fs.create("/one-more", 0o644), Err(FsError::NoSpace)));
        assert!(matches!(fs.mkdir("/one-more", 0o755), Err(FsError::NoSpace)));
        assert_eq!(fs.statfs(), before);
        assert_eq!(fs.readdir("/").unwrap().len(), DIRENTS_PER_BLOCK);
        assert_eq!(fs.getattr("/").unwrap().size, (DIRENTS_PER_BLOCK * 32) as u64);
    }

    #[test]
    fn remove_nodes() {
        let (_dir, mut fs) = mount(400);
        let before = fs.statfs();
        fs.mkdir("/dir", 0o755).unwrap();
        fs.create("/dir/file", 0o644).unwrap();
        fs.write("/dir/file", &[7u8; 5000], 0).unwrap();

        assert!(matches!(fs.unlink("/dir"), Err(FsError::IsDirectory)));
        assert!(matches!(fs.unlink("/"), Err(FsError::IsDirectory)));
        assert!(matches!(fs.rmdir("/dir/file"), Err(FsError::NotDirectory)));
        assert!(matches!(fs.rmdir("/dir"), Err(FsError::NotEmpty)));
        assert!(matches!(fs.rmdir("/"), Err(FsError::PermissionDenied)));

        fs.unlink("/dir/file").unwrap();
        assert!(matches!(fs.getattr("/dir/file"), Err(FsError::NotFound)));
        fs.rmdir("/dir").unwrap();
        assert!(matches!(fs.rmdir("/dir"), Err(FsError::NotFound)));

        let after = fs.statfs();
        assert_eq!(after.free_blocks, before.free_blocks);
        assert_eq!(after.free_files, before.free_files);
    }

    #[test]
    fn rename_rules() {
        let (_dir, mut fs) = mount(400);
        fs.create("/a", 0o644).unwrap();
        fs.create("/b", 0o644).unwrap();
        fs.mkdir("/d", 0o755).unwrap();
        let attr = fs.getattr("/a").unwrap();

        assert!(matches!(fs.rename("/a", "/b"), Err(FsError::Exists)));
        assert!(matches!(fs.rename("/x", "/y"), Err(FsError::NotFound)));
        assert!(matches!(fs.rename("/a", "/d/a"), Err(FsError::InvalidArgument(_))));
        // differing parents win over a missing source
        assert!(matches!(fs.rename("/x", "/d/y"), Err(FsError::InvalidArgument(_))));
        assert!(matches!(fs.rename("/", "/z"), Err(FsError::InvalidArgument(_))));
        fs.rename("/a", "/a").unwrap();

        fs.rename("/a", "/c").unwrap();
        assert!(matches!(fs.getattr("/a"), Err(FsError::NotFound)));
        assert_eq!(fs.getattr("/c").unwrap(), attr);
        fs.rename("/c", "/a").unwrap();
        let names: Vec<String> = fs.readdir("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b", "d"]);
    }

    #[test]
    fn chmod_and_utime() {
        let (_dir, mut fs) = mount(400);
        fs.create("/file", 0o644).unwrap();
        fs.chmod("/file", 0o4600).unwrap();
        assert_eq!(fs.getattr("/file").unwrap().mode, 0o104600);
        fs.chmod("/", 0o700).unwrap();
        assert_eq!(fs.getattr("/").unwrap().mode, 0o40700);

        let then = SystemTime::UNIX_EPOCH + Duration::new(1_000_000, 500);
        let later = then + Duration::from_secs(60);
        fs.utime("/file", then, later).unwrap();
        let attr = fs.getattr("/file").unwrap();
        assert_eq!((attr.atime, attr.mtime), (then, later));
        assert!(attr.ctime > later);
        assert!(matches!(fs.chmod("/nope", 0o600), Err(FsError::NotFound)));
    }

    #[test]
    fn directory_times_follow_content() {
        let (_dir, mut fs) = mount(400);
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        fs.utime("/", old, old).unwrap();
        fs.create("/file", 0o644).unwrap();
        assert!(fs.getattr("/").unwrap().mtime > old);
    }
}
