use std::cell::Cell;
use std::io;
use std::path::Path;
use std::rc::Rc;

use crate::driver::file_drive::FileDrive;
use crate::driver::DeviceDriver;

/// Counts down the sector writes a `FailingDrive` lets through. Once armed
/// with `n`, the next `n` writes succeed and the one after fails.
#[derive(Clone, Default)]
pub(crate) struct WriteFault(Rc<Cell<Option<u32>>>);

impl WriteFault {
    pub(crate) fn fail_after(&self, writes: u32) {
        self.0.set(Some(writes));
    }

    fn take(&self) -> bool {
        match self.0.get() {
            Some(0) => {
                self.0.set(None);
                true
            }
            Some(left) => {
                self.0.set(Some(left - 1));
                false
            }
            None => false,
        }
    }
}

/// A `FileDrive` whose writes can be made to fail on demand.
pub(crate) struct FailingDrive {
    inner: FileDrive,
    fault: WriteFault,
}

impl FailingDrive {
    pub(crate) fn create(path: impl AsRef<Path>, bytes: u64, sector_size: usize) -> io::Result<(FailingDrive, WriteFault)> {
        let fault = WriteFault::default();
        let inner = FileDrive::create(path, bytes, sector_size)?;
        Ok((FailingDrive { inner, fault: fault.clone() }, fault))
    }
}

impl DeviceDriver for FailingDrive {
    fn get_sector_count(&self) -> u64 {
        self.inner.get_sector_count()
    }

    fn get_sector_size(&self) -> usize {
        self.inner.get_sector_size()
    }

    fn read_sector(&self, index: u64) -> io::Result<Vec<u8>> {
        self.inner.read_sector(index)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        if self.fault.take() {
            return Err(io::Error::new(io::ErrorKind::Other, format!("write to sector {} failed", index)));
        }
        self.inner.write_sector(index, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fails_the_armed_write_only() {
        let dir = tempfile::tempdir().unwrap();
        let (mut drive, fault) = FailingDrive::create(dir.path().join("drive.img"), 8 * 512, 512).unwrap();
        drive.write_sector(0, &[1; 512]).unwrap();

        fault.fail_after(1);
        drive.write_sector(1, &[2; 512]).unwrap();
        assert!(drive.write_sector(2, &[3; 512]).is_err());
        drive.write_sector(2, &[3; 512]).unwrap();
        assert_eq!(drive.read_sector(2).unwrap(), vec![3; 512]);
    }
}
