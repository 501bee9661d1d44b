use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyStatfs, ReplyWrite, Request, TimeOrNow, FUSE_ROOT_ID,
};
use libc::c_int;
use tracing::{info, trace, warn};

use crate::driver::DeviceDriver;
use crate::ops::meta::Attr;
use crate::ops::Mount;
use crate::structure::inode::InodeKind;
use crate::util::error::{FsError, Result};
use crate::util::mode::ModeBitsHelper;

const TTL: Duration = Duration::from_secs(1);

/// Serves a [`Mount`] to the kernel. FUSE addresses inodes by number while
/// the mount works on paths, so the adapter remembers the path it last saw
/// for every inode it handed out.
pub struct FuseDriver<A: DeviceDriver> {
    mount: Mount<A>,
    paths: HashMap<u64, String>,
}

fn join(parent: &str, name: &OsStr) -> Result<String> {
    let name = name.to_str().ok_or_else(|| FsError::InvalidName(name.to_string_lossy().into_owned()))?;
    if parent == "/" {
        Ok(format!("/{}", name))
    } else {
        Ok(format!("{}/{}", parent, name))
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn to_file_type(kind: InodeKind) -> FileType {
    match kind {
        InodeKind::File => FileType::RegularFile,
        InodeKind::Directory => FileType::Directory,
    }
}

fn to_system_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(time) => time,
        TimeOrNow::Now => SystemTime::now(),
    }
}

/// Logs a failed request and returns the errno to reply with.
fn log_failure(operation: &'static str, ino: u64, error: &FsError) -> c_int {
    let errno = error.errno();
    if errno == libc::ENOENT {
        trace!(operation, ino, "not found");
    } else {
        warn!(operation, ino, errno, %error, "request failed");
    }
    errno
}

impl<A: DeviceDriver> FuseDriver<A> {
    pub fn new(mount: Mount<A>) -> FuseDriver<A> {
        let mut paths = HashMap::new();
        paths.insert(FUSE_ROOT_ID, "/".to_string());
        FuseDriver { mount, paths }
    }

    fn path(&self, ino: u64) -> Result<&str> {
        self.paths.get(&ino).map(String::as_str).ok_or(FsError::NotFound)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String> {
        join(self.path(parent)?, name)
    }

    fn remember(&mut self, path: String, attr: &Attr) {
        self.paths.insert(attr.ino as u64, path);
    }

    fn to_file_attr(&self, attr: &Attr) -> FileAttr {
        FileAttr {
            ino: attr.ino as u64,
            size: attr.size,
            blocks: attr.blocks * (self.mount.get_block_size() as u64 / 512),
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            crtime: attr.ctime,
            kind: to_file_type(attr.kind),
            perm: attr.mode.get_permissions() as u16,
            nlink: if attr.kind == InodeKind::Directory { 2 } else { 1 },
            uid: attr.uid,
            gid: attr.gid,
            rdev: 0,
            blksize: self.mount.get_block_size() as u32,
            flags: 0,
        }
    }

    fn lookup_path(&mut self, parent: u64, name: &OsStr) -> Result<Attr> {
        let path = self.child_path(parent, name)?;
        let attr = self.mount.getattr(&path)?;
        self.remember(path, &attr);
        Ok(attr)
    }

    fn make_node(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, umask: u32, kind: InodeKind) -> Result<Attr> {
        let path = self.child_path(parent, name)?;
        self.mount.set_owner(req.uid(), req.gid());
        let permissions = mode & !umask;
        let attr = match kind {
            InodeKind::File => self.mount.create(&path, permissions)?,
            InodeKind::Directory => self.mount.mkdir(&path, permissions)?,
        };
        self.remember(path, &attr);
        Ok(attr)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_setattr(
        &mut self,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> Result<Attr> {
        let path = self.path(ino)?.to_string();
        let current = self.mount.getattr(&path)?;
        if uid.is_some_and(|uid| uid != current.uid) || gid.is_some_and(|gid| gid != current.gid) {
            return Err(FsError::Unsupported);
        }
        // truncate is the only step that can run out of space
        if let Some(size) = size {
            self.mount.truncate(&path, size)?;
        }
        if let Some(mode) = mode {
            self.mount.chmod(&path, mode)?;
        }
        if atime.is_some() || mtime.is_some() {
            let accessed_at = atime.map(to_system_time).unwrap_or(current.atime);
            let modified_at = mtime.map(to_system_time).unwrap_or(current.mtime);
            self.mount.utime(&path, accessed_at, modified_at)?;
        }
        self.mount.getattr(&path)
    }

    fn remove(&mut self, parent: u64, name: &OsStr, directory: bool) -> Result<()> {
        let path = self.child_path(parent, name)?;
        let ino = self.mount.resolve(&path)? as u64;
        if directory {
            self.mount.rmdir(&path)?;
        } else {
            self.mount.unlink(&path)?;
        }
        self.paths.remove(&ino);
        Ok(())
    }

    fn rename_path(&mut self, parent: u64, name: &OsStr, new_parent: u64, new_name: &OsStr) -> Result<()> {
        let from = self.child_path(parent, name)?;
        let to = self.child_path(new_parent, new_name)?;
        self.mount.rename(&from, &to)?;

        let prefix = format!("{}/", from);
        for path in self.paths.values_mut() {
            if *path == from {
                *path = to.clone();
            } else if let Some(rest) = path.strip_prefix(&prefix) {
                *path = format!("{}/{}", to, rest);
            }
        }
        Ok(())
    }

    fn list(&mut self, ino: u64) -> Result<Vec<(u64, FileType, String)>> {
        let path = self.path(ino)?.to_string();
        let parent_ino = self.mount.resolve(parent_of(&path))? as u64;
        let mut entries = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for entry in self.mount.readdir(&path)? {
            let child = join(&path, OsStr::new(&entry.name))?;
            entries.push((entry.attr.ino as u64, to_file_type(entry.attr.kind), entry.name));
            self.paths.insert(entry.attr.ino as u64, child);
        }
        Ok(entries)
    }
}

impl<A: DeviceDriver> Filesystem for FuseDriver<A> {
    fn init(&mut self, req: &Request<'_>, _config: &mut KernelConfig) -> std::result::Result<(), c_int> {
        self.mount.set_owner(req.uid(), req.gid());
        info!(uid = req.uid(), gid = req.gid(), "session started");
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(error) = self.mount.flush() {
            warn!(%error, "flush on unmount failed");
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_path(parent, name) {
            Ok(attr) => reply.entry(&TTL, &self.to_file_attr(&attr), 0),
            Err(error) => reply.error(log_failure("lookup", parent, &error)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.path(ino).and_then(|path| self.mount.getattr(path)) {
            Ok(attr) => reply.attr(&TTL, &self.to_file_attr(&attr)),
            Err(error) => reply.error(log_failure("getattr", ino, &error)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.apply_setattr(ino, mode, uid, gid, size, atime, mtime) {
            Ok(attr) => reply.attr(&TTL, &self.to_file_attr(&attr)),
            Err(error) => reply.error(log_failure("setattr", ino, &error)),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(log_failure("mknod", parent, &FsError::Unsupported));
    }

    fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, umask: u32, reply: ReplyEntry) {
        match self.make_node(req, parent, name, mode, umask, InodeKind::Directory) {
            Ok(attr) => reply.entry(&TTL, &self.to_file_attr(&attr), 0),
            Err(error) => reply.error(log_failure("mkdir", parent, &error)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.remove(parent, name, false) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(log_failure("unlink", parent, &error)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.remove(parent, name, true) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(log_failure("rmdir", parent, &error)),
        }
    }

    fn symlink(&mut self, _req: &Request<'_>, parent: u64, _name: &OsStr, _link: &Path, reply: ReplyEntry) {
        reply.error(log_failure("symlink", parent, &FsError::Unsupported));
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        match self.rename_path(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(log_failure("rename", parent, &error)),
        }
    }

    fn link(&mut self, _req: &Request<'_>, ino: u64, _newparent: u64, _newname: &OsStr, reply: ReplyEntry) {
        reply.error(log_failure("link", ino, &FsError::Unsupported));
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let result = u64::try_from(offset)
            .map_err(|_| FsError::invalid_argument(format!("negative offset {}", offset)))
            .and_then(|offset| self.mount.read(self.path(ino)?, size as u64, offset));
        match result {
            Ok(data) => reply.data(&data),
            Err(error) => reply.error(log_failure("read", ino, &error)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let result = u64::try_from(offset)
            .map_err(|_| FsError::invalid_argument(format!("negative offset {}", offset)))
            .and_then(|offset| {
                let path = self.path(ino)?.to_string();
                self.mount.write(&path, data, offset)
            });
        match result {
            Ok(written) => reply.written(written as u32),
            Err(error) => reply.error(log_failure("write", ino, &error)),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.mount.flush() {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(log_failure("fsync", ino, &error)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        match self.list(ino) {
            Ok(entries) => {
                let skip = usize::try_from(offset).unwrap_or(0);
                for (index, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(skip) {
                    if reply.add(entry_ino, (index + 1) as i64, kind, &name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(error) => reply.error(log_failure("readdir", ino, &error)),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stats = self.mount.statfs();
        reply.statfs(
            stats.blocks,
            stats.free_blocks,
            stats.free_blocks,
            stats.files,
            stats.free_files,
            stats.block_size,
            stats.name_max,
            stats.block_size,
        );
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self.make_node(req, parent, name, mode, umask, InodeKind::File) {
            Ok(attr) => reply.created(&TTL, &self.to_file_attr(&attr), 0, 0, 0),
            Err(error) => reply.error(log_failure("create", parent, &error)),
        }
    }
}
