/// Size of one disk sector in bytes. The whole driver assumes 512-byte
/// sectors; a volume reporting anything else is rejected at mount.
pub const SECTOR_SIZE: usize = 512;

/// Synchronous sector-addressed block device.
///
/// `false` means a hardware error or timeout; the caller decides whether the
/// failure is fatal. Multi-sector transfers are loops of single-sector calls,
/// matching the one-sector-per-handle buffering above this trait.
pub trait BlockDevice {
    fn read(&mut self, lba: u64, buf: &mut [u8; SECTOR_SIZE]) -> bool;
    fn write(&mut self, lba: u64, buf: &[u8; SECTOR_SIZE]) -> bool;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read(&mut self, lba: u64, buf: &mut [u8; SECTOR_SIZE]) -> bool {
        (**self).read(lba, buf)
    }

    fn write(&mut self, lba: u64, buf: &[u8; SECTOR_SIZE]) -> bool {
        (**self).write(lba, buf)
    }
}
