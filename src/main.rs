use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blockfs::consts::BLOCK_SIZE;
use blockfs::fuse::MountOptions;
use blockfs::util::format::pretty_size_from_bytes;
use blockfs::{FileDrive, FormatOptions, Mount};

#[derive(Parser)]
#[command(name = "blockfs")]
#[command(about = "Create, inspect and mount blockfs images")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create and format a new image file
    Mkfs {
        image: PathBuf,

        /// Size of the image in 4 KiB blocks
        #[arg(short, long, default_value_t = 400)]
        blocks: u32,

        /// Number of inode records; one per four blocks by default
        #[arg(short, long)]
        inodes: Option<u32>,
    },
    /// Print volume statistics
    Stat { image: PathBuf },
    /// Serve an image through FUSE until it is unmounted
    Mount {
        image: PathBuf,
        mountpoint: PathBuf,

        #[arg(long)]
        allow_other: bool,

        #[arg(long)]
        auto_unmount: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(error) = run(Args::parse()) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Mkfs { image, blocks, inodes } => mkfs(&image, blocks, inodes),
        Command::Stat { image } => stat(&image),
        Command::Mount { image, mountpoint, allow_other, auto_unmount } => {
            let mount = Mount::open(&image).with_context(|| format!("failed to open image {}", image.display()))?;
            blockfs::fuse::serve(mount, &mountpoint, &MountOptions { allow_other, auto_unmount })
                .with_context(|| format!("FUSE mount failed at {}", mountpoint.display()))
        }
    }
}

fn mkfs(image: &Path, blocks: u32, inodes: Option<u32>) -> Result<()> {
    let bytes = blocks as u64 * BLOCK_SIZE as u64;
    let drive = FileDrive::create(image, bytes, BLOCK_SIZE)
        .with_context(|| format!("failed to create image {}", image.display()))?;
    let options = FormatOptions { block_count: Some(blocks), inode_count: inodes, ..FormatOptions::default() };
    let mut mount = Mount::format(drive, &options).with_context(|| format!("failed to format {}", image.display()))?;
    mount.flush()?;

    let stats = mount.statfs();
    println!(
        "{}: {} blocks ({}), {} inodes, {} free",
        image.display(),
        blocks,
        pretty_size_from_bytes(bytes),
        stats.files,
        pretty_size_from_bytes(stats.free_blocks * stats.block_size as u64)
    );
    Ok(())
}

fn stat(image: &Path) -> Result<()> {
    let mount = Mount::open(image).with_context(|| format!("failed to open image {}", image.display()))?;
    let stats = mount.statfs();
    println!("block size:  {}", stats.block_size);
    println!("blocks:      {}", stats.blocks);
    println!("free blocks: {}", stats.free_blocks);
    println!("files:       {}", stats.files);
    println!("free files:  {}", stats.free_files);
    println!("name max:    {}", stats.name_max);
    println!(
        "used:        {} of {}",
        pretty_size_from_bytes((stats.blocks - stats.free_blocks) * stats.block_size as u64),
        pretty_size_from_bytes(stats.blocks * stats.block_size as u64)
    );
    Ok(())
}
