use crate::block::SECTOR_SIZE;
use crate::fs::error::{FsError, FsResult};
use crate::fs::fat::dir::DIR_ENTRY_SIZE;

// ──────────────────────────────────────────────────────────────
//  FAT type classification
// ──────────────────────────────────────────────────────────────

/// Classified by the computed cluster count: < 4085 clusters is FAT12,
/// < 65525 is FAT16, everything above is FAT32. The `SectorsPerFat == 0`
/// sentinel is deliberately not used for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

const FAT12_MAX_CLUSTERS: u32 = 4085;
const FAT16_MAX_CLUSTERS: u32 = 65525;

// ──────────────────────────────────────────────────────────────
//  BPB — BIOS Parameter Block (parsed from the boot sector)
// ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosParameterBlock {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors: u32,
    pub sectors_per_fat: u32,
    pub root_cluster: u32, // FAT32 only; garbage on FAT12/16 and never read there
}

impl BiosParameterBlock {
    pub fn parse(sector: &[u8; SECTOR_SIZE]) -> FsResult<Self> {
        let bytes_per_sector = u16::from_le_bytes([sector[11], sector[12]]);
        let sectors_per_cluster = sector[13];
        let reserved_sectors = u16::from_le_bytes([sector[14], sector[15]]);
        let num_fats = sector[16];
        let root_entry_count = u16::from_le_bytes([sector[17], sector[18]]);

        // Total sectors: 16-bit field first, 32-bit field when it is zero
        let total_16 = u16::from_le_bytes([sector[19], sector[20]]);
        let total_32 = u32::from_le_bytes([sector[32], sector[33], sector[34], sector[35]]);
        let total_sectors = if total_16 != 0 { total_16 as u32 } else { total_32 };

        // FAT size: same scheme (16-bit for FAT12/16, 32-bit for FAT32)
        let fat_16 = u16::from_le_bytes([sector[22], sector[23]]);
        let fat_32 = u32::from_le_bytes([sector[36], sector[37], sector[38], sector[39]]);
        let sectors_per_fat = if fat_16 != 0 { fat_16 as u32 } else { fat_32 };

        let root_cluster = u32::from_le_bytes([sector[44], sector[45], sector[46], sector[47]]);

        // The single-sector handle buffers hard-code 512-byte sectors.
        if bytes_per_sector as usize != SECTOR_SIZE {
            return Err(FsError::CorruptVolume);
        }
        if sectors_per_cluster == 0 || num_fats == 0 || sectors_per_fat == 0 {
            return Err(FsError::CorruptVolume);
        }

        Ok(BiosParameterBlock {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            root_entry_count,
            total_sectors,
            sectors_per_fat,
            root_cluster,
        })
    }
}

// ──────────────────────────────────────────────────────────────
//  VolumeLayout — every derived LBA, computed once at mount
// ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VolumeLayout {
    pub fat_type: FatType,
    pub partition_lba: u64,
    pub sectors_per_cluster: u32,
    pub num_fats: u8,
    pub sectors_per_fat: u32,
    pub total_sectors: u32,
    pub cluster_count: u32,
    pub fat_start_lba: u64,
    /// FAT12/16: first sector of the fixed root directory region.
    pub root_dir_lba: u64,
    /// FAT12/16: size of that region in sectors; 0 on FAT32.
    pub root_dir_sectors: u32,
    /// FAT12/16: number of 32-byte root entries; 0 on FAT32.
    pub root_entry_count: u32,
    /// FAT32: first cluster of the root directory chain; 0 on FAT12/16.
    pub root_cluster: u32,
    pub data_start_lba: u64,
}

impl VolumeLayout {
    pub fn from_bpb(partition_lba: u64, bpb: &BiosParameterBlock) -> FsResult<Self> {
        let sectors_per_cluster = bpb.sectors_per_cluster as u32;
        let root_dir_sectors = (bpb.root_entry_count as u32 * DIR_ENTRY_SIZE as u32
            + SECTOR_SIZE as u32
            - 1)
            / SECTOR_SIZE as u32;

        let meta_sectors = bpb.reserved_sectors as u32
            + bpb.num_fats as u32 * bpb.sectors_per_fat
            + root_dir_sectors;
        let data_sectors = bpb
            .total_sectors
            .checked_sub(meta_sectors)
            .ok_or(FsError::CorruptVolume)?;
        let cluster_count = data_sectors / sectors_per_cluster;

        let fat_type = if cluster_count < FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if cluster_count < FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            FatType::Fat32
        };

        let fat_start_lba = partition_lba + bpb.reserved_sectors as u64;
        let root_dir_lba = fat_start_lba + bpb.num_fats as u64 * bpb.sectors_per_fat as u64;
        let data_start_lba = root_dir_lba + root_dir_sectors as u64;

        Ok(VolumeLayout {
            fat_type,
            partition_lba,
            sectors_per_cluster,
            num_fats: bpb.num_fats,
            sectors_per_fat: bpb.sectors_per_fat,
            total_sectors: bpb.total_sectors,
            cluster_count,
            fat_start_lba,
            root_dir_lba: if fat_type == FatType::Fat32 { 0 } else { root_dir_lba },
            root_dir_sectors: if fat_type == FatType::Fat32 { 0 } else { root_dir_sectors },
            root_entry_count: if fat_type == FatType::Fat32 {
                0
            } else {
                bpb.root_entry_count as u32
            },
            root_cluster: if fat_type == FatType::Fat32 { bpb.root_cluster } else { 0 },
            data_start_lba,
        })
    }

    /// First sector of a data cluster. Clusters 0 and 1 are reserved; the
    /// data area starts at cluster 2.
    pub fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.data_start_lba + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Boot sector with just enough of a BPB for the parser.
    fn boot_sector(
        total_sectors: u32,
        sectors_per_cluster: u8,
        reserved: u16,
        num_fats: u8,
        sectors_per_fat: u16,
        root_entries: u16,
    ) -> [u8; SECTOR_SIZE] {
        let mut sec = [0u8; SECTOR_SIZE];
        sec[11..13].copy_from_slice(&512u16.to_le_bytes());
        sec[13] = sectors_per_cluster;
        sec[14..16].copy_from_slice(&reserved.to_le_bytes());
        sec[16] = num_fats;
        sec[17..19].copy_from_slice(&root_entries.to_le_bytes());
        sec[32..36].copy_from_slice(&total_sectors.to_le_bytes());
        sec[22..24].copy_from_slice(&sectors_per_fat.to_le_bytes());
        sec[44..48].copy_from_slice(&2u32.to_le_bytes());
        sec
    }

    fn classify(cluster_count: u32) -> FatType {
        // reserved 1 + one FAT of 100 sectors + no root entries, 1 sector per
        // cluster: cluster count is total - 101.
        let bpb = BiosParameterBlock::parse(&boot_sector(cluster_count + 101, 1, 1, 1, 100, 0))
            .unwrap();
        let layout = VolumeLayout::from_bpb(0, &bpb).unwrap();
        assert_eq!(layout.cluster_count, cluster_count);
        layout.fat_type
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify(4084), FatType::Fat12);
        assert_eq!(classify(4085), FatType::Fat16);
        assert_eq!(classify(65524), FatType::Fat16);
        assert_eq!(classify(65525), FatType::Fat32);
    }

    #[test]
    fn rejects_zero_bytes_per_sector() {
        let mut sec = boot_sector(4096, 1, 1, 1, 12, 224);
        sec[11] = 0;
        sec[12] = 0;
        assert_eq!(BiosParameterBlock::parse(&sec), Err(FsError::CorruptVolume));
    }

    #[test]
    fn rejects_zero_sectors_per_cluster() {
        let sec = boot_sector(4096, 0, 1, 1, 12, 224);
        assert_eq!(BiosParameterBlock::parse(&sec), Err(FsError::CorruptVolume));
    }

    #[test]
    fn fat12_layout_lbas() {
        // 1 reserved + 2 FATs of 12 sectors + 224 root entries (14 sectors)
        let bpb = BiosParameterBlock::parse(&boot_sector(4096, 2, 1, 2, 12, 224)).unwrap();
        let layout = VolumeLayout::from_bpb(2048, &bpb).unwrap();
        assert_eq!(layout.fat_type, FatType::Fat12);
        assert_eq!(layout.fat_start_lba, 2048 + 1);
        assert_eq!(layout.root_dir_lba, 2048 + 1 + 24);
        assert_eq!(layout.root_dir_sectors, 14);
        assert_eq!(layout.data_start_lba, 2048 + 1 + 24 + 14);
        assert_eq!(layout.cluster_to_lba(2), layout.data_start_lba);
        assert_eq!(layout.cluster_to_lba(3), layout.data_start_lba + 2);
    }

    #[test]
    fn total_sectors_prefers_16_bit_field() {
        let mut sec = boot_sector(0, 1, 1, 1, 12, 0);
        sec[19..21].copy_from_slice(&2880u16.to_le_bytes());
        let bpb = BiosParameterBlock::parse(&sec).unwrap();
        assert_eq!(bpb.total_sectors, 2880);
    }
}
