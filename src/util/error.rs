use std::os::raw::c_int;

use thiserror::Error;

use crate::consts::BlockPointer;

pub type Result<T> = std::result::Result<T, FsError>;

/// Every failure the file system can report.
///
/// Each variant maps to exactly one POSIX errno through [`FsError::errno`];
/// the match has no wildcard arm so a new variant cannot ship without one.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("block {block} is outside the image ({block_count} blocks)")]
    BlockOutOfRange { block: u64, block_count: u64 },

    #[error("corrupt metadata at block {block}: {detail}")]
    Corruption { block: BlockPointer, detail: String },

    /// The image is not a file system this build understands.
    #[error("invalid on-disk format: {0}")]
    Format(String),

    #[error("no such file or directory")]
    NotFound,

    #[error("not a directory")]
    NotDirectory,

    #[error("is a directory")]
    IsDirectory,

    #[error("file exists")]
    Exists,

    #[error("directory not empty")]
    NotEmpty,

    #[error("no space left on device")]
    NoSpace,

    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation not permitted")]
    PermissionDenied,

    #[error("out of memory")]
    OutOfMemory,

    #[error("operation not supported")]
    Unsupported,
}

impl FsError {
    /// Positive errno for this error.
    pub fn errno(&self) -> c_int {
        match self {
            FsError::Io(_) => libc::EIO,
            FsError::BlockOutOfRange { .. } => libc::EIO,
            FsError::Corruption { .. } => libc::EIO,
            FsError::Format(_) => libc::EINVAL,
            FsError::NotFound => libc::ENOENT,
            FsError::NotDirectory => libc::ENOTDIR,
            FsError::IsDirectory => libc::EISDIR,
            FsError::Exists => libc::EEXIST,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::NoSpace => libc::ENOSPC,
            FsError::InvalidName(_) => libc::EINVAL,
            FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::PermissionDenied => libc::EPERM,
            FsError::OutOfMemory => libc::ENOMEM,
            FsError::Unsupported => libc::EOPNOTSUPP,
        }
    }

    pub(crate) fn invalid_argument(detail: impl Into<String>) -> FsError {
        FsError::InvalidArgument(detail.into())
    }
}

/// Collapses a result into the `count | -errno` return convention.
pub fn to_status(result: Result<usize>) -> isize {
    match result {
        Ok(count) => count as isize,
        Err(error) => -(error.errno() as isize),
    }
}
