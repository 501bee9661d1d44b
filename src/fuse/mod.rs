use std::io;
use std::path::Path;

use fuser::MountOption;
use tracing::info;

use crate::driver::DeviceDriver;
use crate::ops::Mount;

pub mod filesystem;

pub use filesystem::FuseDriver;

/// Kernel-side options for a FUSE session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub allow_other: bool,
    pub auto_unmount: bool,
}

fn build_mount_options(options: &MountOptions) -> Vec<MountOption> {
    let mut fuse_options = vec![
        MountOption::FSName("blockfs".to_string()),
        MountOption::Subtype("blockfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if options.allow_other {
        fuse_options.push(MountOption::AllowOther);
    }
    if options.auto_unmount {
        fuse_options.push(MountOption::AutoUnmount);
    }
    fuse_options
}

/// Serves `mount` at `mountpoint`, blocking until it is unmounted.
pub fn serve<A: DeviceDriver>(mount: Mount<A>, mountpoint: impl AsRef<Path>, options: &MountOptions) -> io::Result<()> {
    let mountpoint = mountpoint.as_ref();
    info!(mountpoint = %mountpoint.display(), "serving");
    fuser::mount2(FuseDriver::new(mount), mountpoint, &build_mount_options(options))
}
