//! FAT12/16/32 driver core.
//!
//! All state lives in an explicit [`FatVolume`] value: the parsed volume
//! layout, an in-memory mirror of the allocation table, and a fixed table of
//! sector-buffered open-file cursors. `mount` builds the triad; `open`,
//! `read`, `write`, `seek`, `flush` and `close` drive it.

pub mod bpb;
pub mod dir;
pub mod mbr;
pub mod table;

mod handle;

#[cfg(test)]
pub(crate) mod testutil;

pub use bpb::{BiosParameterBlock, FatType, VolumeLayout};
pub use handle::{FileInfo, Handle, OpenMode, MAX_OPEN_FILES};
pub use mbr::PartitionEntry;
pub use table::FatTable;

use crate::block::{BlockDevice, SECTOR_SIZE};
use crate::fs::error::{FsError, FsResult};
use dir::{encode_83_name, DirEntry, DIR_ENTRY_SIZE, ENTRY_DELETED, ENTRY_END};
use handle::{OpenFile, Slot, ROOT_INDEX};

// ══════════════════════════════════════════════════════════════
//  FatVolume — one mounted volume
// ══════════════════════════════════════════════════════════════

pub struct FatVolume<D: BlockDevice> {
    dev: D,
    layout: VolumeLayout,
    table: FatTable,
    root: OpenFile,
    slots: [Slot; MAX_OPEN_FILES],
}

impl<D: BlockDevice> FatVolume<D> {
    /// Mount the volume on `dev`: locate the partition, parse the boot
    /// sector, load the FAT mirror, and reset the handle table.
    pub fn mount(mut dev: D) -> FsResult<Self> {
        let mut sector = [0u8; SECTOR_SIZE];
        if !dev.read(0, &mut sector) {
            return Err(FsError::DeviceError);
        }
        let partition = mbr::parse_first_partition(&sector)?;
        let partition_lba = if partition.is_empty() { 0 } else { partition.lba_start as u64 };

        if partition_lba != 0 {
            if !dev.read(partition_lba, &mut sector) {
                return Err(FsError::DeviceError);
            }
        }
        let bpb = BiosParameterBlock::parse(&sector)?;
        let layout = VolumeLayout::from_bpb(partition_lba, &bpb)?;
        let table = FatTable::load(&mut dev, &layout)?;
        let root = OpenFile::root(&layout);

        crate::log_info!(
            "FAT: {:?}, partition at {}, {} clusters of {} sectors, {} FATs of {} sectors",
            layout.fat_type,
            layout.partition_lba,
            layout.cluster_count,
            layout.sectors_per_cluster,
            layout.num_fats,
            layout.sectors_per_fat
        );

        Ok(FatVolume {
            dev,
            layout,
            table,
            root,
            slots: [Slot::EMPTY; MAX_OPEN_FILES],
        })
    }

    /// The root directory pseudo-handle. Never freed, always valid.
    pub fn root(&self) -> Handle {
        Handle::ROOT
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    /// Give the block device back, e.g. to inspect the raw image in tests.
    pub fn into_device(self) -> D {
        self.dev
    }

    /// Open a file by path. Missing files are created (in the root directory
    /// only) under `OpenMode::Create`; an existing file is never truncated.
    pub fn open(&mut self, path: &str, mode: OpenMode) -> FsResult<Handle> {
        let FatVolume { dev, layout, table, root, slots } = self;
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            root.rewind();
            return Ok(Handle::ROOT);
        }
        match walk(dev, layout, table, trimmed)? {
            Walk::Found(entry, location) => open_entry(dev, layout, table, slots, &entry, location),
            Walk::MissingInRoot(name) if mode == OpenMode::Create => {
                let (entry, location) = create_in_root(dev, layout, table, name)?;
                open_entry(dev, layout, table, slots, &entry, location)
            }
            Walk::MissingInDir if mode == OpenMode::Create => Err(FsError::Unsupported),
            _ => Err(FsError::NotFound),
        }
    }

    /// Read up to `out.len()` bytes at the handle's position. Short counts at
    /// end of file, end of chain, or device error.
    pub fn read(&mut self, handle: Handle, out: &mut [u8]) -> FsResult<usize> {
        let FatVolume { dev, layout, table, root, slots } = self;
        let file = resolve_handle(root, slots, handle)?;
        read_file(dev, layout, table, file, out)
    }

    /// Write `data` at the handle's position, growing the file and its
    /// cluster chain as needed. Short counts on device error or a full
    /// volume mid-write.
    pub fn write(&mut self, handle: Handle, data: &[u8]) -> FsResult<usize> {
        let FatVolume { dev, layout, table, root, slots } = self;
        let file = resolve_handle(root, slots, handle)?;
        write_file(dev, layout, table, file, data)
    }

    /// Reposition the handle. Offset 0 rewinds and reloads the first sector;
    /// anything past the file size is `InvalidOffset`.
    pub fn seek(&mut self, handle: Handle, offset: u32) -> FsResult<()> {
        let FatVolume { dev, layout, table, root, slots } = self;
        let file = resolve_handle(root, slots, handle)?;
        seek_file(dev, layout, table, file, offset)
    }

    /// Persist the handle's buffered sector and write the size and first
    /// cluster back into its directory entry.
    pub fn flush(&mut self, handle: Handle) -> FsResult<()> {
        let FatVolume { dev, root, slots, .. } = self;
        let file = resolve_handle(root, slots, handle)?;
        flush_file(dev, file)
    }

    /// Flush and release the handle. Closing the root pseudo-handle just
    /// rewinds it.
    pub fn close(&mut self, handle: Handle) -> FsResult<()> {
        if handle.index == ROOT_INDEX {
            self.root.rewind();
            return Ok(());
        }
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .ok_or(FsError::BadHandle)?;
        if !slot.occupied || slot.generation != handle.generation {
            return Err(FsError::BadHandle);
        }
        let result = flush_file(&mut self.dev, &mut slot.file);
        slot.occupied = false;
        slot.generation = slot.generation.wrapping_add(1);
        result
    }

    /// Look a path up without consuming a handle slot.
    pub fn stat(&mut self, path: &str) -> FsResult<FileInfo> {
        let FatVolume { dev, layout, table, .. } = self;
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Ok(FileInfo {
                size: layout.root_entry_count * 32,
                is_directory: true,
                first_cluster: layout.root_cluster,
            });
        }
        match walk(dev, layout, table, trimmed)? {
            Walk::Found(entry, _) => Ok(FileInfo {
                size: entry.size,
                is_directory: entry.is_directory(),
                first_cluster: entry.first_cluster(),
            }),
            _ => Err(FsError::NotFound),
        }
    }
}

// ══════════════════════════════════════════════════════════════
//  Handle resolution
// ══════════════════════════════════════════════════════════════

fn resolve_handle<'a>(
    root: &'a mut OpenFile,
    slots: &'a mut [Slot; MAX_OPEN_FILES],
    handle: Handle,
) -> FsResult<&'a mut OpenFile> {
    if handle.index == ROOT_INDEX {
        return Ok(root);
    }
    let slot = slots
        .get_mut(handle.index as usize)
        .ok_or(FsError::BadHandle)?;
    if !slot.occupied || slot.generation != handle.generation {
        return Err(FsError::BadHandle);
    }
    Ok(&mut slot.file)
}

fn open_entry<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    table: &mut FatTable,
    slots: &mut [Slot; MAX_OPEN_FILES],
    entry: &DirEntry,
    location: (u64, usize),
) -> FsResult<Handle> {
    let index = slots
        .iter()
        .position(|slot| !slot.occupied)
        .ok_or(FsError::OutOfHandles)?;

    let mut file = OpenFile::from_entry(entry, location);
    // Eager first-sector load; a freshly created file has no cluster yet.
    if file.first_cluster != 0 {
        ensure_sector(dev, layout, table, &mut file, false)?;
    }

    let slot = &mut slots[index];
    slot.occupied = true;
    slot.file = file;
    Ok(Handle {
        index: index as u8,
        generation: slot.generation,
    })
}

// ══════════════════════════════════════════════════════════════
//  Sector-buffered engine
// ══════════════════════════════════════════════════════════════

/// Point the cursor's buffer at the sector containing `position`, walking the
/// cluster chain as needed. Returns Ok(false) at end of chain (or end of the
/// fixed root region) when not writing; when writing, the chain is extended
/// with a freshly zeroed cluster instead.
fn ensure_sector<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    table: &mut FatTable,
    file: &mut OpenFile,
    for_write: bool,
) -> FsResult<bool> {
    let want = file.position / SECTOR_SIZE as u32;
    while file.sector_index < want {
        if file.fixed_root {
            // contiguous region, no chain to follow; bounds checked below
        } else if file.sector_in_cluster + 1 < layout.sectors_per_cluster {
            file.sector_in_cluster += 1;
        } else {
            match table.next_cluster(file.current_cluster)? {
                Some(next) => {
                    file.current_cluster = next;
                    file.sector_in_cluster = 0;
                }
                None => {
                    if !for_write {
                        return Ok(false);
                    }
                    let new = table.allocate(dev)?;
                    table.set_entry(dev, file.current_cluster, new)?;
                    zero_cluster(dev, layout, new)?;
                    file.current_cluster = new;
                    file.sector_in_cluster = 0;
                }
            }
        }
        file.sector_index += 1;
    }

    if file.fixed_root && file.sector_index >= layout.root_dir_sectors {
        return Ok(false);
    }

    let lba = file.current_lba(layout);
    if file.buffered_lba != Some(lba) {
        load_sector(dev, file, lba)?;
    }
    Ok(true)
}

/// Swap the buffer to `lba`, persisting it first when the file is dirty.
fn load_sector<D: BlockDevice>(dev: &mut D, file: &mut OpenFile, lba: u64) -> FsResult<()> {
    if file.modified {
        if let Some(old) = file.buffered_lba {
            if !dev.write(old, &file.buffer) {
                return Err(FsError::DeviceError);
            }
        }
    }
    if !dev.read(lba, &mut file.buffer) {
        return Err(FsError::DeviceError);
    }
    file.buffered_lba = Some(lba);
    Ok(())
}

fn zero_cluster<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    cluster: u32,
) -> FsResult<()> {
    let zero = [0u8; SECTOR_SIZE];
    let base = layout.cluster_to_lba(cluster);
    for s in 0..layout.sectors_per_cluster {
        if !dev.write(base + s as u64, &zero) {
            return Err(FsError::DeviceError);
        }
    }
    Ok(())
}

fn read_file<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    table: &mut FatTable,
    file: &mut OpenFile,
    out: &mut [u8],
) -> FsResult<usize> {
    let mut n = out.len();
    if !file.is_directory {
        // directories have no trustworthy size; files are clamped to EOF
        n = n.min((file.size - file.position) as usize);
    }

    let mut copied = 0usize;
    while copied < n {
        match ensure_sector(dev, layout, table, file, false) {
            Ok(true) => {}
            Ok(false) => break,
            Err(FsError::DeviceError) => break, // short count per the read contract
            Err(e) => return Err(e),
        }
        let off = file.position as usize % SECTOR_SIZE;
        let take = (SECTOR_SIZE - off).min(n - copied);
        out[copied..copied + take].copy_from_slice(&file.buffer[off..off + take]);
        file.position += take as u32;
        copied += take;
    }
    Ok(copied)
}

fn write_file<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    table: &mut FatTable,
    file: &mut OpenFile,
    data: &[u8],
) -> FsResult<usize> {
    if file.is_directory {
        return Err(FsError::IsADirectory);
    }
    if data.is_empty() {
        return Ok(0);
    }

    // A file created empty gets its first cluster on first write; the flush
    // writes it back into the directory entry.
    if file.first_cluster == 0 {
        let first = table.allocate(dev)?;
        zero_cluster(dev, layout, first)?;
        file.first_cluster = first;
        file.current_cluster = first;
        file.sector_in_cluster = 0;
        file.sector_index = 0;
        file.modified = true;
    }

    let mut written = 0usize;
    while written < data.len() {
        match ensure_sector(dev, layout, table, file, true) {
            Ok(true) => {}
            Ok(false) => break,
            Err(FsError::DeviceError) => break, // short count, buffer stays dirty
            Err(FsError::NoSpace) if written > 0 => break,
            Err(e) => return Err(e),
        }
        let off = file.position as usize % SECTOR_SIZE;
        let take = (SECTOR_SIZE - off).min(data.len() - written);
        file.buffer[off..off + take].copy_from_slice(&data[written..written + take]);
        file.modified = true;
        file.position += take as u32;
        written += take;
        if file.position > file.size {
            file.size = file.position;
        }
    }
    Ok(written)
}

fn seek_file<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    table: &mut FatTable,
    file: &mut OpenFile,
    offset: u32,
) -> FsResult<()> {
    if file.is_directory {
        if offset != 0 {
            return Err(FsError::Unsupported);
        }
        file.rewind();
        return Ok(());
    }
    if offset > file.size {
        return Err(FsError::InvalidOffset);
    }
    if offset == 0 {
        file.rewind();
        if file.first_cluster != 0 {
            ensure_sector(dev, layout, table, file, false)?;
        }
        return Ok(());
    }
    if offset < file.position {
        file.rewind();
    }
    file.position = offset;
    // Walk the chain up to the target sector now; `offset == size` on a
    // sector boundary legitimately stops at end of chain (append position).
    ensure_sector(dev, layout, table, file, false)?;
    Ok(())
}

fn flush_file<D: BlockDevice>(dev: &mut D, file: &mut OpenFile) -> FsResult<()> {
    if !file.modified {
        return Ok(());
    }
    if let Some(lba) = file.buffered_lba {
        if !dev.write(lba, &file.buffer) {
            return Err(FsError::DeviceError);
        }
    }
    if let Some((lba, off)) = file.entry_location {
        let mut sec = [0u8; SECTOR_SIZE];
        if !dev.read(lba, &mut sec) {
            return Err(FsError::DeviceError);
        }
        let mut entry = DirEntry::from_bytes(&sec[off..off + DIR_ENTRY_SIZE]);
        entry.size = file.size;
        entry.set_first_cluster(file.first_cluster);
        sec[off..off + DIR_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        if !dev.write(lba, &sec) {
            return Err(FsError::DeviceError);
        }
    }
    file.modified = false;
    Ok(())
}

// ══════════════════════════════════════════════════════════════
//  Directory operations
// ══════════════════════════════════════════════════════════════

/// Next live entry of `dir`: skips deleted, long-filename and volume-label
/// entries, stops at the 0x00 end marker. Also yields the entry's on-disk
/// location for later write-back.
fn next_dir_entry<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    table: &mut FatTable,
    dir: &mut OpenFile,
) -> FsResult<Option<(DirEntry, (u64, usize))>> {
    loop {
        if !ensure_sector(dev, layout, table, dir, false)? {
            return Ok(None);
        }
        let off = dir.position as usize % SECTOR_SIZE;
        let lba = dir.current_lba(layout);
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw.copy_from_slice(&dir.buffer[off..off + DIR_ENTRY_SIZE]);

        if raw[0] == ENTRY_END {
            return Ok(None);
        }
        dir.position += DIR_ENTRY_SIZE as u32;
        if raw[0] == ENTRY_DELETED {
            continue;
        }
        let entry = DirEntry::from_bytes(&raw);
        if entry.is_lfn() || entry.is_volume_label() {
            continue;
        }
        return Ok(Some((entry, (lba, off))));
    }
}

fn find_in_dir<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    table: &mut FatTable,
    dir: &mut OpenFile,
    name: &[u8; 11],
) -> FsResult<Option<(DirEntry, (u64, usize))>> {
    dir.rewind();
    while let Some((entry, location)) = next_dir_entry(dev, layout, table, dir)? {
        if entry.name == *name {
            return Ok(Some((entry, location)));
        }
    }
    Ok(None)
}

/// First reusable slot (end marker or deleted entry) of `dir`. A full FAT32
/// root grows by one zeroed cluster; the fixed FAT12/16 region cannot grow.
fn find_free_dir_slot<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    table: &mut FatTable,
    dir: &mut OpenFile,
) -> FsResult<(u64, usize)> {
    dir.rewind();
    loop {
        match ensure_sector(dev, layout, table, dir, true) {
            Ok(true) => {}
            Ok(false) => return Err(FsError::NoSpace),
            Err(e) => return Err(e),
        }
        let off = dir.position as usize % SECTOR_SIZE;
        let first = dir.buffer[off];
        if first == ENTRY_END || first == ENTRY_DELETED {
            return Ok((dir.current_lba(layout), off));
        }
        dir.position += DIR_ENTRY_SIZE as u32;
    }
}

fn create_in_root<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    table: &mut FatTable,
    name: [u8; 11],
) -> FsResult<(DirEntry, (u64, usize))> {
    let mut root = OpenFile::root(layout);
    let (lba, off) = find_free_dir_slot(dev, layout, table, &mut root)?;
    let entry = DirEntry::new_file(name);
    root.buffer[off..off + DIR_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
    if !dev.write(lba, &root.buffer) {
        return Err(FsError::DeviceError);
    }
    Ok((entry, (lba, off)))
}

// ══════════════════════════════════════════════════════════════
//  Path walking
// ══════════════════════════════════════════════════════════════

enum Walk {
    /// Entry found; carries the entry and its on-disk location.
    Found(DirEntry, (u64, usize)),
    /// Final segment missing from the root directory; carries the encoded
    /// 8.3 name so `Create` can reuse it.
    MissingInRoot([u8; 11]),
    /// Final segment missing from a subdirectory (creation unsupported).
    MissingInDir,
    /// An intermediate segment is missing or not a directory.
    Missing,
}

fn walk<D: BlockDevice>(
    dev: &mut D,
    layout: &VolumeLayout,
    table: &mut FatTable,
    path: &str,
) -> FsResult<Walk> {
    let mut dir = OpenFile::root(layout);
    let mut parent_is_root = true;
    let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
    if segments.peek().is_none() {
        return Err(FsError::InvalidPath);
    }

    while let Some(segment) = segments.next() {
        let name = encode_83_name(segment).ok_or(FsError::Unsupported)?;
        let last = segments.peek().is_none();
        match find_in_dir(dev, layout, table, &mut dir, &name)? {
            Some((entry, location)) => {
                if last {
                    return Ok(Walk::Found(entry, location));
                }
                if !entry.is_directory() {
                    return Ok(Walk::Missing);
                }
                dir = OpenFile::from_entry(&entry, location);
                parent_is_root = false;
            }
            None if last && parent_is_root => return Ok(Walk::MissingInRoot(name)),
            None if last => return Ok(Walk::MissingInDir),
            None => return Ok(Walk::Missing),
        }
    }
    Err(FsError::InvalidPath)
}
