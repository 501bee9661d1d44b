use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::driver::DeviceDriver;

/// A disk image stored in a regular file.
pub struct FileDrive {
    file: File,
    bytes: u64,
    sector_size: usize,
}

impl FileDrive {
    /// Creates a zero-filled image of `bytes` bytes. Fails if `path` exists.
    pub fn create(path: impl AsRef<Path>, bytes: u64, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(bytes)?;
        Ok(FileDrive { file, bytes, sector_size })
    }

    pub fn open(path: impl AsRef<Path>, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let bytes = file.metadata()?.len();
        Ok(FileDrive { file, bytes, sector_size })
    }

    fn check_index(&self, index: u64) -> io::Result<()> {
        if index >= self.get_sector_count() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector {} out of range", index),
            ));
        }
        Ok(())
    }
}

impl DeviceDriver for FileDrive {
    fn get_sector_count(&self) -> u64 {
        self.bytes / self.sector_size as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64) -> io::Result<Vec<u8>> {
        self.check_index(index)?;
        let mut buffer = vec![0; self.sector_size];
        self.file.read_exact_at(&mut buffer, index * self.sector_size as u64)?;
        Ok(buffer)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        self.check_index(index)?;
        if data.len() != self.sector_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector size mismatch - expected {}, got {}", self.sector_size, data.len()),
            ));
        }
        self.file.write_all_at(data, index * self.sector_size as u64)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_sectors() {
        let dir = tempfile::tempdir().unwrap();
        let mut drive = FileDrive::create(dir.path().join("drive.img"), 1024 * 512, 512).unwrap();
        assert_eq!(drive.get_sector_count(), 1024);

        let sector0 = vec![0x42; 512];
        let sector1023 = vec![0x52; 512];
        drive.write_sector(0, &sector0).unwrap();
        drive.write_sector(1023, &sector1023).unwrap();

        assert_eq!(drive.read_sector(0).unwrap(), sector0);
        assert_eq!(drive.read_sector(1023).unwrap(), sector1023);
        assert_eq!(drive.read_sector(2).unwrap(), vec![0; 512]);
    }

    #[test]
    fn rejects_bad_access() {
        let dir = tempfile::tempdir().unwrap();
        let mut drive = FileDrive::create(dir.path().join("drive.img"), 8 * 512, 512).unwrap();
        assert!(drive.read_sector(8).is_err());
        assert!(drive.write_sector(0, &[0; 100]).is_err());
    }

    #[test]
    fn create_refuses_existing_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        FileDrive::create(&path, 4096, 512).unwrap();
        assert!(FileDrive::create(&path, 4096, 512).is_err());
        assert_eq!(FileDrive::open(&path, 512).unwrap().get_size(), 4096);
    }
}
