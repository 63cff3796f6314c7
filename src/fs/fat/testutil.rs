//! Test-only helpers: an in-memory block device and synthetic volume images
//! formatted (and cross-checked) with the `fatfs` crate.

use std::io::{Cursor, Read, Write};
use std::vec::Vec;

use crate::block::{BlockDevice, SECTOR_SIZE};

/// Vec-backed mock block device.
pub struct MemDisk(pub Vec<u8>);

impl MemDisk {
    pub fn blank(sectors: u64) -> Self {
        MemDisk(vec![0u8; sectors as usize * SECTOR_SIZE])
    }

    pub fn clone_image(&self) -> Self {
        MemDisk(self.0.clone())
    }
}

impl BlockDevice for MemDisk {
    fn read(&mut self, lba: u64, buf: &mut [u8; SECTOR_SIZE]) -> bool {
        let off = lba as usize * SECTOR_SIZE;
        if off + SECTOR_SIZE > self.0.len() {
            return false;
        }
        buf.copy_from_slice(&self.0[off..off + SECTOR_SIZE]);
        true
    }

    fn write(&mut self, lba: u64, buf: &[u8; SECTOR_SIZE]) -> bool {
        let off = lba as usize * SECTOR_SIZE;
        if off + SECTOR_SIZE > self.0.len() {
            return false;
        }
        self.0[off..off + SECTOR_SIZE].copy_from_slice(buf);
        true
    }
}

/// Partition offset used by every MBR-wrapped test image.
pub const PART_START: u64 = 2048;

/// Format a FAT volume at `PART_START` with `fatfs` and wrap it in a
/// hand-written MBR (signature + partition record 0).
pub fn formatted_disk(part_sectors: u32, options: fatfs::FormatVolumeOptions) -> MemDisk {
    let total = PART_START as usize + part_sectors as usize;
    let mut img = vec![0u8; total * SECTOR_SIZE];
    {
        let region = &mut img[PART_START as usize * SECTOR_SIZE..];
        let mut cursor = Cursor::new(region);
        fatfs::format_volume(&mut cursor, options).expect("format_volume failed");
    }

    img[510] = 0x55;
    img[511] = 0xAA;
    let e = 0x1BE;
    img[e + 4] = 0x0C; // system id; the driver only checks it for zero
    img[e + 8..e + 12].copy_from_slice(&(PART_START as u32).to_le_bytes());
    img[e + 12..e + 16].copy_from_slice(&part_sectors.to_le_bytes());
    MemDisk(img)
}

/// 1 MiB FAT12 volume at partition offset 2048, one sector per cluster.
pub fn fat12_disk() -> MemDisk {
    formatted_disk(
        2048,
        fatfs::FormatVolumeOptions::new()
            .fat_type(fatfs::FatType::Fat12)
            .bytes_per_cluster(512)
            .volume_label(*b"TESTVOLUME "),
    )
}

/// FAT12 volume with two sectors per cluster, for cluster-boundary tests.
pub fn fat12_disk_2spc() -> MemDisk {
    formatted_disk(
        4096,
        fatfs::FormatVolumeOptions::new()
            .fat_type(fatfs::FatType::Fat12)
            .bytes_per_cluster(1024),
    )
}

/// ~16 MiB FAT16 volume.
pub fn fat16_disk() -> MemDisk {
    formatted_disk(
        32 * 1024,
        fatfs::FormatVolumeOptions::new()
            .fat_type(fatfs::FatType::Fat16)
            .bytes_per_cluster(512),
    )
}

/// ~40 MiB FAT32 volume. FAT32 needs at least 65 525 data clusters, so with
/// 512-byte clusters the volume cannot be much smaller than this.
pub fn fat32_disk() -> MemDisk {
    formatted_disk(
        80 * 1024,
        fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat32),
    )
}

fn partition<'a>(disk: &'a mut MemDisk) -> Cursor<&'a mut [u8]> {
    Cursor::new(&mut disk.0[PART_START as usize * SECTOR_SIZE..])
}

/// Write a file into the image through `fatfs`.
pub fn write_via_fatfs(disk: &mut MemDisk, path: &str, content: &[u8]) {
    let fs = fatfs::FileSystem::new(partition(disk), fatfs::FsOptions::new())
        .expect("FileSystem::new failed");
    let mut f = fs.root_dir().create_file(path).expect("create_file failed");
    f.truncate().unwrap();
    f.write_all(content).unwrap();
}

/// Create a directory in the image through `fatfs`.
pub fn mkdir_via_fatfs(disk: &mut MemDisk, path: &str) {
    let fs = fatfs::FileSystem::new(partition(disk), fatfs::FsOptions::new())
        .expect("FileSystem::new failed");
    fs.root_dir().create_dir(path).expect("create_dir failed");
}

/// Delete a file from the image through `fatfs` (marks its entry 0xE5).
pub fn remove_via_fatfs(disk: &mut MemDisk, path: &str) {
    let fs = fatfs::FileSystem::new(partition(disk), fatfs::FsOptions::new())
        .expect("FileSystem::new failed");
    fs.root_dir().remove(path).expect("remove failed");
}

/// Read a file back from the image through `fatfs`.
pub fn read_via_fatfs(disk: &mut MemDisk, path: &str) -> Vec<u8> {
    let fs = fatfs::FileSystem::new(partition(disk), fatfs::FsOptions::new())
        .expect("FileSystem::new failed");
    let mut f = fs.root_dir().open_file(path).expect("open_file failed");
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).unwrap();
    buf
}

/// Deterministic non-repeating test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
