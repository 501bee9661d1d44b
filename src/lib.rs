//! A small block file system stored in a single image file: superblock,
//! allocation bitmap, fixed inode table and data blocks, served through
//! FUSE or driven directly through [`Mount`].

pub mod config;
pub mod consts;
pub mod driver;
pub mod fuse;
pub mod io;
pub mod ops;
pub mod structure;
pub mod util;

pub use config::FormatOptions;
pub use driver::file_drive::FileDrive;
pub use driver::DeviceDriver;
pub use ops::meta::{Attr, DirEntry, Statfs};
pub use ops::Mount;
pub use util::error::{to_status, FsError, Result};
