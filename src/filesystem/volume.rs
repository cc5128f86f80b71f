/// ProDOS volume: block storage plus the volume bitmap
///
/// The volume owns its [`BlockStorage`]. Directories never hold a reference
/// to it; every directory operation receives the volume explicitly.

use crate::error::{DiskError, Result};
use crate::filesystem::bitmap::VolumeBitmap;
use crate::filesystem::directory::Directory;
use crate::filesystem::entry::{
    DirectoryHeader, Entry, EntryBytes, FileEntry, HeaderKind, StorageType,
};
use crate::format::constants::*;
use crate::image::BlockStorage;
use log::{debug, info};

/// Largest file a tree can describe (24-bit EOF)
pub const MAX_FILE_SIZE: usize = 0x00FF_FFFF;

/// Master index slots used by a tree file
const TREE_INDEX_BLOCKS: usize = 128;

/// Blocks needed to store `len` bytes: `(data blocks, index blocks)`
///
/// Empty data still takes one data block.
pub fn blocks_for_length(len: usize) -> (usize, usize) {
    let data = len.div_ceil(BLOCK_SIZE).max(1);
    let index = if data == 1 {
        0
    } else if data <= POINTERS_PER_INDEX_BLOCK {
        1
    } else {
        1 + data.div_ceil(POINTERS_PER_INDEX_BLOCK)
    };
    (data, index)
}

fn decode_index(block: &[u8]) -> Vec<u16> {
    (0..POINTERS_PER_INDEX_BLOCK)
        .map(|i| u16::from_le_bytes([block[i], block[POINTERS_PER_INDEX_BLOCK + i]]))
        .collect()
}

fn encode_index(pointers: &[u16]) -> Vec<u8> {
    let mut block = vec![0u8; BLOCK_SIZE];
    for (i, &pointer) in pointers.iter().enumerate() {
        let [lo, hi] = pointer.to_le_bytes();
        block[i] = lo;
        block[POINTERS_PER_INDEX_BLOCK + i] = hi;
    }
    block
}

/// Fork description inside an extended key block
#[derive(Debug, Clone, Copy)]
struct ForkEntry {
    storage_type: StorageType,
    key_pointer: u16,
    eof: usize,
}

impl ForkEntry {
    fn decode(data: &[u8]) -> Self {
        Self {
            storage_type: StorageType::from_nibble(data[0]),
            key_pointer: u16::from_le_bytes([data[1], data[2]]),
            eof: data[5] as usize | (data[6] as usize) << 8 | (data[7] as usize) << 16,
        }
    }
}

/// An open ProDOS volume
#[derive(Debug)]
pub struct Volume {
    storage: BlockStorage,
    bitmap: VolumeBitmap,
}

impl Volume {
    /// Write an empty ProDOS volume onto open, writable storage
    ///
    /// Blocks 0-1 are the zeroed boot area, the root directory occupies
    /// blocks 2-5 and the bitmap starts at block 6. Changes are buffered;
    /// commit to persist them.
    pub fn format(mut storage: BlockStorage, name: &str) -> Result<Self> {
        if !storage.is_writable() {
            return Err(DiskError::access("volume storage is not open for writing"));
        }
        if storage.block_size() != BLOCK_SIZE {
            return Err(DiskError::invalid_format(format!(
                "ProDOS volumes need {}-byte blocks, got {}",
                BLOCK_SIZE,
                storage.block_size()
            )));
        }
        let total = storage.length().min(MAX_BLOCKS);
        let bitmap_blocks = bitmap_blocks_for(total);
        let first_free = BITMAP_BLOCK as usize + bitmap_blocks;
        if total <= first_free {
            return Err(DiskError::invalid_format(format!(
                "{} blocks is too small for a ProDOS volume",
                total
            )));
        }

        let header = DirectoryHeader::new_volume(name, total as u16, BITMAP_BLOCK)?;

        for block in 0..first_free {
            storage.zero_block(block)?;
        }

        let first_dir = VOLUME_DIR_BLOCK;
        let last_dir = VOLUME_DIR_BLOCK + VOLUME_DIR_BLOCKS - 1;
        for block in first_dir..=last_dir {
            let mut data = vec![0u8; BLOCK_SIZE];
            let prev = if block == first_dir { 0 } else { block - 1 };
            let next = if block == last_dir { 0 } else { block + 1 };
            data[0..2].copy_from_slice(&prev.to_le_bytes());
            data[2..4].copy_from_slice(&next.to_le_bytes());
            if block == first_dir {
                let slot = DIR_ENTRIES_OFFSET;
                let encoded = Entry::Header(header.clone()).encode();
                data[slot..slot + ENTRY_LENGTH].copy_from_slice(&encoded);
            }
            storage.set_data(&data, block as usize)?;
        }

        let mut bitmap = VolumeBitmap::all_free(total, BITMAP_BLOCK);
        let system: Vec<u16> = (0..first_free as u16).collect();
        bitmap.set_many(&system, false)?;

        Self::write_bitmap_blocks(&mut storage, &bitmap, 0..bitmap_blocks)?;
        let volume = Self { storage, bitmap };
        info!(
            "formatted volume /{} ({} blocks, {} free)",
            header.name(),
            total,
            volume.free_block_count()
        );
        Ok(volume)
    }

    /// Mount the ProDOS volume on open storage
    pub fn open(storage: BlockStorage) -> Result<Self> {
        if !storage.is_open() {
            return Err(DiskError::access("volume storage is not open"));
        }
        let key = storage.data_for_block(VOLUME_DIR_BLOCK as usize)?;
        let header = Self::volume_header_from(&key)?;
        let (bitmap_pointer, total_blocks) = match header.kind {
            HeaderKind::Volume {
                bitmap_pointer,
                total_blocks,
            } => (bitmap_pointer, total_blocks as usize),
            HeaderKind::Subdirectory { .. } => {
                return Err(DiskError::invalid_format("key block is not a volume header"))
            }
        };
        if total_blocks > storage.length() {
            return Err(DiskError::invalid_format(format!(
                "volume claims {} blocks but the image holds {}",
                total_blocks,
                storage.length()
            )));
        }

        let mut bits = Vec::with_capacity(bitmap_blocks_for(total_blocks) * BLOCK_SIZE);
        for i in 0..bitmap_blocks_for(total_blocks) {
            let block = bitmap_pointer as usize + i;
            if block >= total_blocks {
                return Err(DiskError::invalid_format(format!(
                    "bitmap block {} is outside the volume",
                    block
                )));
            }
            bits.extend_from_slice(&storage.data_for_block(block)?);
        }
        let bitmap = VolumeBitmap::from_bytes(bits, total_blocks, bitmap_pointer)?;

        info!(
            "mounted volume /{} ({} blocks, {} free)",
            header.name(),
            total_blocks,
            bitmap.free_count()
        );
        Ok(Self { storage, bitmap })
    }

    fn volume_header_from(key: &[u8]) -> Result<DirectoryHeader> {
        let mut slot: EntryBytes = [0; ENTRY_LENGTH];
        slot.copy_from_slice(&key[DIR_ENTRIES_OFFSET..DIR_ENTRIES_OFFSET + ENTRY_LENGTH]);
        match Entry::decode(&slot) {
            Entry::Header(header)
                if header.storage_type() == StorageType::VolumeHeader
                    && header.entry_length as usize == ENTRY_LENGTH
                    && header.entries_per_block as usize == ENTRIES_PER_BLOCK =>
            {
                Ok(header)
            }
            _ => Err(DiskError::invalid_format("no ProDOS volume directory at block 2")),
        }
    }

    /// Root (volume) directory, loaded
    pub fn root(&self) -> Result<Directory> {
        Directory::open(self, VOLUME_DIR_BLOCK)
    }

    /// Volume header as currently stored, pending writes included
    pub fn header(&self) -> Result<DirectoryHeader> {
        let key = self.storage.data_for_block(VOLUME_DIR_BLOCK as usize)?;
        Self::volume_header_from(&key)
    }

    /// Volume name
    pub fn name(&self) -> Result<String> {
        Ok(self.header()?.name())
    }

    /// Blocks on the volume
    pub fn total_blocks(&self) -> usize {
        self.bitmap.total_blocks()
    }

    /// Free blocks on the volume
    pub fn free_block_count(&self) -> usize {
        self.bitmap.free_count()
    }

    /// Whether a block is marked free
    pub fn is_block_free(&self, block: u16) -> bool {
        self.bitmap.is_free(block as usize)
    }

    /// Pick `count` free blocks without marking them
    pub fn find_free_blocks(&self, count: usize) -> Result<Vec<u16>> {
        self.bitmap.find_free(count)
    }

    /// Whether the underlying storage accepts writes
    pub fn is_writable(&self) -> bool {
        self.storage.is_writable()
    }

    pub(crate) fn require_writable(&self) -> Result<()> {
        if !self.storage.is_writable() {
            return Err(DiskError::access("volume is not open for writing"));
        }
        Ok(())
    }

    /// Mark blocks as in use
    pub fn mark_used(&mut self, blocks: &[u16]) -> Result<()> {
        self.update_bitmap(blocks, false)?;
        debug!("allocated blocks {:?}", blocks);
        Ok(())
    }

    /// Return blocks to the free pool
    pub fn release(&mut self, blocks: &[u16]) -> Result<()> {
        self.update_bitmap(blocks, true)?;
        debug!("released blocks {:?}", blocks);
        Ok(())
    }

    /// Bitmap changes only take effect once their blocks are staged
    fn update_bitmap(&mut self, blocks: &[u16], free: bool) -> Result<()> {
        let mut bitmap = self.bitmap.clone();
        let touched = bitmap.set_many(blocks, free)?;
        Self::write_bitmap_blocks(&mut self.storage, &bitmap, touched)?;
        self.bitmap = bitmap;
        Ok(())
    }

    fn write_bitmap_blocks<I: IntoIterator<Item = usize>>(
        storage: &mut BlockStorage,
        bitmap: &VolumeBitmap,
        indices: I,
    ) -> Result<()> {
        for index in indices {
            let block = bitmap.pointer() as usize + index;
            storage.set_data(bitmap.block_data(index), block)?;
        }
        Ok(())
    }

    fn check_block(&self, block: u16) -> Result<()> {
        if block as usize >= self.total_blocks() {
            return Err(DiskError::BlockOutOfRange {
                index: block as usize,
                length: self.total_blocks(),
            });
        }
        Ok(())
    }

    /// Read a volume block
    pub fn read_block(&self, block: u16) -> Result<Vec<u8>> {
        self.check_block(block)?;
        self.storage.data_for_block(block as usize)
    }

    /// Write a volume block (buffered)
    pub fn write_block(&mut self, block: u16, data: &[u8]) -> Result<()> {
        self.check_block(block)?;
        self.storage.set_data(data, block as usize)
    }

    fn read_index(&self, block: u16) -> Result<Vec<u16>> {
        Ok(decode_index(&self.read_block(block)?))
    }

    /// Read the contents of a file entry
    ///
    /// Extended (forked) files yield their data fork.
    pub fn read_file(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        match entry.storage_type {
            StorageType::Extended => {
                let key = self.read_block(entry.key_pointer)?;
                let fork = ForkEntry::decode(&key[..8]);
                self.read_fork(fork.storage_type, fork.key_pointer, fork.eof)
            }
            StorageType::Subdirectory => Err(DiskError::NotAFile(entry.name())),
            other => self.read_fork(other, entry.key_pointer, entry.eof()),
        }
    }

    fn read_fork(&self, storage_type: StorageType, key: u16, eof: usize) -> Result<Vec<u8>> {
        let data_blocks: Vec<u16> = match storage_type {
            StorageType::Seedling => vec![key],
            StorageType::Sapling => self.read_index(key)?,
            StorageType::Tree => {
                let mut pointers = Vec::new();
                for &index in self.read_index(key)?.iter().take(TREE_INDEX_BLOCKS) {
                    if index == 0 {
                        pointers.extend(std::iter::repeat(0).take(POINTERS_PER_INDEX_BLOCK));
                    } else {
                        pointers.extend(self.read_index(index)?);
                    }
                    if pointers.len() * BLOCK_SIZE >= eof {
                        break;
                    }
                }
                pointers
            }
            other => {
                return Err(DiskError::filesystem(format!(
                    "cannot read {} storage",
                    other
                )))
            }
        };

        let mut data = Vec::with_capacity(eof);
        for block in data_blocks {
            if data.len() >= eof {
                break;
            }
            let take = (eof - data.len()).min(BLOCK_SIZE);
            if block == 0 {
                data.resize(data.len() + take, 0);
            } else {
                data.extend_from_slice(&self.read_block(block)?[..take]);
            }
        }
        data.resize(eof, 0);
        Ok(data)
    }

    /// Every block owned by an entry: data, index and key blocks, or the
    /// directory chain for subdirectories
    pub fn file_blocks(&self, entry: &FileEntry) -> Result<Vec<u16>> {
        match entry.storage_type {
            StorageType::Subdirectory => self.directory_chain(entry.key_pointer),
            StorageType::Extended => {
                let key = self.read_block(entry.key_pointer)?;
                let mut blocks = vec![entry.key_pointer];
                for offset in [0, 0x100] {
                    let fork = ForkEntry::decode(&key[offset..offset + 8]);
                    if fork.key_pointer != 0 {
                        blocks.extend(self.fork_blocks(fork.storage_type, fork.key_pointer)?);
                    }
                }
                Ok(blocks)
            }
            other => self.fork_blocks(other, entry.key_pointer),
        }
    }

    fn fork_blocks(&self, storage_type: StorageType, key: u16) -> Result<Vec<u16>> {
        if key == 0 {
            return Ok(Vec::new());
        }
        let mut blocks = vec![key];
        match storage_type {
            StorageType::Seedling => {}
            StorageType::Sapling => {
                blocks.extend(self.read_index(key)?.into_iter().filter(|&b| b != 0));
            }
            StorageType::Tree => {
                for index in self.read_index(key)?.into_iter().filter(|&b| b != 0) {
                    blocks.push(index);
                    blocks.extend(self.read_index(index)?.into_iter().filter(|&b| b != 0));
                }
            }
            other => {
                return Err(DiskError::filesystem(format!(
                    "cannot walk {} storage",
                    other
                )))
            }
        }
        Ok(blocks)
    }

    /// Blocks of a directory chain starting at its key block
    ///
    /// Loops and pointers outside the volume are format errors.
    pub fn directory_chain(&self, key: u16) -> Result<Vec<u16>> {
        let mut chain = Vec::new();
        let mut block = key;
        while block != 0 {
            if block as usize >= self.total_blocks() {
                return Err(DiskError::invalid_format(format!(
                    "directory chain from block {} points outside the volume ({})",
                    key, block
                )));
            }
            if chain.contains(&block) {
                return Err(DiskError::invalid_format(format!(
                    "directory chain from block {} loops at block {}",
                    key, block
                )));
            }
            chain.push(block);
            let data = self.read_block(block)?;
            block = u16::from_le_bytes([data[2], data[3]]);
        }
        debug!("directory chain from block {}: {:?}", key, chain);
        Ok(chain)
    }

    /// Lay `data` out over freshly allocated `blocks`
    ///
    /// `blocks` must hold exactly the count from [`blocks_for_length`]; the
    /// first block becomes the key block. Returns the storage type.
    pub(crate) fn write_file_data(&mut self, data: &[u8], blocks: &[u16]) -> Result<StorageType> {
        let (data_count, index_count) = blocks_for_length(data.len());
        if blocks.len() != data_count + index_count {
            return Err(DiskError::filesystem(format!(
                "{} blocks given for a layout needing {}",
                blocks.len(),
                data_count + index_count
            )));
        }
        let (index_blocks, data_blocks) = blocks.split_at(index_count);

        for (i, &block) in data_blocks.iter().enumerate() {
            let mut chunk = vec![0u8; BLOCK_SIZE];
            let start = (i * BLOCK_SIZE).min(data.len());
            let end = ((i + 1) * BLOCK_SIZE).min(data.len());
            chunk[..end - start].copy_from_slice(&data[start..end]);
            self.write_block(block, &chunk)?;
        }

        match index_count {
            0 => Ok(StorageType::Seedling),
            1 => {
                self.write_block(index_blocks[0], &encode_index(data_blocks))?;
                Ok(StorageType::Sapling)
            }
            _ => {
                let (master, indices) = index_blocks.split_at(1);
                for (index, pointers) in indices
                    .iter()
                    .zip(data_blocks.chunks(POINTERS_PER_INDEX_BLOCK))
                {
                    self.write_block(*index, &encode_index(pointers))?;
                }
                self.write_block(master[0], &encode_index(indices))?;
                Ok(StorageType::Tree)
            }
        }
    }

    /// Persist all buffered writes
    pub fn commit(&mut self) -> Result<()> {
        self.storage.commit_modified_blocks()
    }

    /// Close the underlying storage, discarding uncommitted writes
    pub fn close(&mut self) {
        self.storage.close();
    }

    /// Underlying block storage
    pub fn storage(&self) -> &BlockStorage {
        &self.storage
    }

    /// Underlying block storage, mutably
    pub fn storage_mut(&mut self) -> &mut BlockStorage {
        &mut self.storage
    }

    /// Give back the block storage
    pub fn into_storage(self) -> BlockStorage {
        self.storage
    }
}
