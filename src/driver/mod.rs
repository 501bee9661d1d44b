use std::io;

#[cfg(test)]
pub(crate) mod failing_drive;
pub mod file_drive;

/// Sector-addressed storage underneath the block layer.
pub trait DeviceDriver {
    fn get_sector_count(&self) -> u64;
    fn get_sector_size(&self) -> usize;
    fn read_sector(&self, index: u64) -> io::Result<Vec<u8>>;
    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()>;

    fn get_size(&self) -> u64 {
        self.get_sector_count() * self.get_sector_size() as u64
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
