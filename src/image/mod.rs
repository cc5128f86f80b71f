/// Block storage over disk image bytes

/// Scoped mutable block views
pub mod block;
/// Builder for fresh images
pub mod builder;
/// Track/sector coordinates
pub mod track_sector;
/// Logical to physical address translation
pub mod translate;

pub use block::BlockMut;
pub use builder::BlockStorageBuilder;
pub use track_sector::TrackSector;
pub use translate::{AddressTranslator, Placement};

use crate::error::{DiskError, Result};
use crate::format::{AddressingMode, StorageSpec};
use crate::io::Backing;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How the backing store is currently held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Not open; block access fails
    Closed,
    /// Reads only
    ReadOnly,
    /// Reads, buffered writes and commits
    ReadWrite,
}

/// Fixed-size block access to a disk image with write-back buffering
///
/// Writes go to an in-memory dirty set and reach the backing store only
/// through [`BlockStorage::commit_modified_blocks`]. Closing discards any
/// pending writes.
#[derive(Debug)]
pub struct BlockStorage {
    path: Option<PathBuf>,
    block_size: usize,
    length: usize,
    partition_offset: usize,
    header_data: Vec<u8>,
    /// Declared payload length (2IMG), limits the data area
    data_limit: Option<u64>,
    translator: AddressTranslator,
    backing: Option<Box<dyn Backing>>,
    /// In-memory and caller-supplied backings survive `close`
    retain_backing: bool,
    mode: OpenMode,
    dirty: BTreeMap<usize, Vec<u8>>,
}

impl BlockStorage {
    /// Describe an existing image file, inferring its header and layout
    ///
    /// The storage starts closed; call [`open`](Self::open) or
    /// [`open_for_writing`](Self::open_for_writing) before block access.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        crate::io::reader::read_image(path)
    }

    /// Allocate a fresh zero-filled in-memory image
    pub fn with_capacity(block_size: usize, block_count: usize) -> Result<Self> {
        BlockStorageBuilder::new()
            .block_size(block_size)
            .block_count(block_count)
            .build()
    }

    /// Wrap a caller-supplied backing store holding a complete image
    pub fn with_backing(backing: Box<dyn Backing>, spec: &StorageSpec) -> Result<Self> {
        Self::from_parts(None, Some(backing), spec, None)
    }

    pub(crate) fn from_parts(
        path: Option<PathBuf>,
        backing: Option<Box<dyn Backing>>,
        spec: &StorageSpec,
        data_limit: Option<u64>,
    ) -> Result<Self> {
        let translator = AddressTranslator::new(spec.addressing_mode, spec.block_size)?;
        let retain_backing = backing.is_some();
        Ok(Self {
            path,
            block_size: spec.block_size,
            length: spec.block_count,
            partition_offset: spec.partition_offset,
            header_data: spec.header.clone(),
            data_limit,
            translator,
            backing,
            retain_backing,
            mode: OpenMode::Closed,
            dirty: BTreeMap::new(),
        })
    }

    /// Open for reading, validating the image layout
    pub fn open(&mut self) -> Result<()> {
        self.open_with(false)
    }

    /// Open for reading and writing, validating the image layout
    pub fn open_for_writing(&mut self) -> Result<()> {
        self.open_with(true)
    }

    fn open_with(&mut self, writable: bool) -> Result<()> {
        match (self.mode, writable) {
            (OpenMode::ReadWrite, _) | (OpenMode::ReadOnly, false) => return Ok(()),
            _ => {}
        }

        if !self.retain_backing {
            let path = self
                .path
                .clone()
                .ok_or_else(|| DiskError::access("image has no backing store"))?;
            self.backing = None;
            self.backing = Some(Box::new(crate::io::FileBacking::open(&path, writable)?));
        }

        let total = match self.backing.as_ref() {
            Some(backing) => {
                if writable && !backing.is_writable() {
                    return Err(DiskError::access("backing store is read-only"));
                }
                backing.len()?
            }
            None => return Err(DiskError::access("image has no backing store")),
        };

        match self.validated_length(total) {
            Ok(length) => self.length = length,
            Err(e) => {
                if !self.retain_backing {
                    self.backing = None;
                }
                return Err(e);
            }
        }

        self.mode = if writable {
            OpenMode::ReadWrite
        } else {
            OpenMode::ReadOnly
        };
        info!(
            "opened {} ({} blocks of {} bytes, {}, {})",
            self.display_name(),
            self.length,
            self.block_size,
            self.translator.mode(),
            if writable { "read-write" } else { "read-only" }
        );
        Ok(())
    }

    fn validated_length(&self, total: u64) -> Result<usize> {
        let header_len = self.header_data.len() as u64;
        let padding = (self.partition_offset * self.block_size) as u64;
        let data_end = match self.data_limit {
            Some(limit) => header_len + limit,
            None => total,
        };
        if data_end > total {
            return Err(DiskError::invalid_format(format!(
                "image is {} bytes but its header declares {}",
                total, data_end
            )));
        }
        if data_end < header_len + padding {
            return Err(DiskError::invalid_format(format!(
                "image of {} bytes is smaller than its header and partition offset",
                total
            )));
        }
        let usable = data_end - header_len - padding;
        if usable % self.block_size as u64 != 0 {
            return Err(DiskError::invalid_format(format!(
                "{} data bytes is not a multiple of the {}-byte block size",
                usable, self.block_size
            )));
        }
        let length = (usable / self.block_size as u64) as usize;
        self.translator.validate_length(length)?;
        Ok(length)
    }

    /// Release the handle, discarding uncommitted writes
    pub fn close(&mut self) {
        if !self.dirty.is_empty() {
            warn!(
                "closing {} with {} uncommitted blocks; changes discarded",
                self.display_name(),
                self.dirty.len()
            );
            self.dirty.clear();
        }
        if !self.retain_backing {
            self.backing = None;
        }
        if self.mode != OpenMode::Closed {
            debug!("closed {}", self.display_name());
        }
        self.mode = OpenMode::Closed;
    }

    fn display_name(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "<memory>".to_string(),
        }
    }

    /// Location of the backing image, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Bytes per block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of addressable blocks
    pub fn length(&self) -> usize {
        self.length
    }

    /// Block index at which usable storage begins
    pub fn partition_offset(&self) -> usize {
        self.partition_offset
    }

    /// Container header bytes preceding the data
    pub fn header_data(&self) -> &[u8] {
        &self.header_data
    }

    /// Physical layout of the blocks
    pub fn addressing_mode(&self) -> AddressingMode {
        self.translator.mode()
    }

    /// Address translator in effect
    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    /// Current open mode
    pub fn open_mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether block access is possible
    pub fn is_open(&self) -> bool {
        self.mode != OpenMode::Closed
    }

    /// Whether writes are accepted
    pub fn is_writable(&self) -> bool {
        self.mode == OpenMode::ReadWrite
    }

    /// Change the block size; only allowed while closed
    pub fn set_block_size(&mut self, block_size: usize) -> Result<()> {
        self.require_closed("block size")?;
        self.translator = AddressTranslator::new(self.translator.mode(), block_size)?;
        self.block_size = block_size;
        Ok(())
    }

    /// Change the addressing mode; only allowed while closed
    ///
    /// This changes how bytes are interpreted, it never rewrites them.
    pub fn set_addressing_mode(&mut self, mode: AddressingMode) -> Result<()> {
        self.require_closed("addressing mode")?;
        self.translator = AddressTranslator::new(mode, self.block_size)?;
        Ok(())
    }

    /// Change the partition offset; only allowed while closed
    pub fn set_partition_offset(&mut self, blocks: usize) -> Result<()> {
        self.require_closed("partition offset")?;
        self.partition_offset = blocks;
        Ok(())
    }

    /// Replace the container header description; only allowed while closed
    pub fn set_header_data(&mut self, header: Vec<u8>) -> Result<()> {
        self.require_closed("header")?;
        self.header_data = header;
        Ok(())
    }

    fn require_closed(&self, what: &str) -> Result<()> {
        if self.mode != OpenMode::Closed {
            return Err(DiskError::access(format!(
                "cannot change {} while the image is open",
                what
            )));
        }
        Ok(())
    }

    fn require_open(&self) -> Result<&dyn Backing> {
        match (&self.backing, self.mode) {
            (Some(backing), OpenMode::ReadOnly | OpenMode::ReadWrite) => Ok(backing.as_ref()),
            _ => Err(DiskError::access("image is not open")),
        }
    }

    fn require_writable(&self) -> Result<()> {
        if self.mode != OpenMode::ReadWrite {
            return Err(DiskError::access("image is not open for writing"));
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.length {
            return Err(DiskError::BlockOutOfRange {
                index,
                length: self.length,
            });
        }
        Ok(())
    }

    /// Byte offset of the data area within the image
    fn data_offset(&self) -> u64 {
        (self.header_data.len() + self.partition_offset * self.block_size) as u64
    }

    fn read_committed(&self, index: usize) -> Result<Vec<u8>> {
        let backing = self.require_open()?;
        let base = self.data_offset();
        let mut data = vec![0u8; self.block_size];
        let mut pos = 0;
        for (offset, len) in self.translator.translate(index).spans(self.block_size) {
            backing.read_at(base + offset, &mut data[pos..pos + len])?;
            pos += len;
        }
        Ok(data)
    }

    /// Copy of a block's current content, buffered writes included
    pub fn data_for_block(&self, index: usize) -> Result<Vec<u8>> {
        self.require_open()?;
        self.check_index(index)?;
        match self.dirty.get(&index) {
            Some(data) => Ok(data.clone()),
            None => self.read_committed(index),
        }
    }

    /// Replace a block's content in the write buffer
    pub fn set_data(&mut self, data: &[u8], index: usize) -> Result<()> {
        self.require_writable()?;
        self.check_index(index)?;
        if data.len() != self.block_size {
            return Err(DiskError::invalid_format(format!(
                "block data is {} bytes, expected {}",
                data.len(),
                self.block_size
            )));
        }
        self.stage_block(index, data.to_vec());
        Ok(())
    }

    /// Editable view of a block; dropping a written view marks the block dirty
    pub fn mutable_data_for_block(&mut self, index: usize) -> Result<BlockMut<'_>> {
        self.require_writable()?;
        let data = self.data_for_block(index)?;
        Ok(BlockMut::new(self, index, data))
    }

    /// Fill a block with zeros
    pub fn zero_block(&mut self, index: usize) -> Result<()> {
        let zeros = vec![0u8; self.block_size];
        self.set_data(&zeros, index)
    }

    /// Mark a block dirty without changing its content
    pub fn mark_modified_block_at_index(&mut self, index: usize) -> Result<()> {
        self.require_writable()?;
        self.check_index(index)?;
        if !self.dirty.contains_key(&index) {
            let data = self.read_committed(index)?;
            self.dirty.insert(index, data);
        }
        Ok(())
    }

    pub(crate) fn stage_block(&mut self, index: usize, data: Vec<u8>) {
        self.dirty.insert(index, data);
    }

    /// Indices of blocks with uncommitted writes, ascending
    pub fn dirty_blocks(&self) -> Vec<usize> {
        self.dirty.keys().copied().collect()
    }

    /// Whether a block has uncommitted writes
    pub fn is_modified(&self, index: usize) -> bool {
        self.dirty.contains_key(&index)
    }

    /// Whether any block has uncommitted writes
    pub fn has_modified_blocks(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Forget all uncommitted writes
    pub fn discard_modified_blocks(&mut self) {
        if !self.dirty.is_empty() {
            debug!("discarding {} uncommitted blocks", self.dirty.len());
        }
        self.dirty.clear();
    }

    /// Write every dirty block to the backing store in ascending order
    ///
    /// Blocks that were written are marked clean even if a later block
    /// fails. Failures are reported as [`DiskError::CommitFailed`] listing
    /// the blocks that are still dirty; nothing is retried.
    pub fn commit_modified_blocks(&mut self) -> Result<()> {
        self.require_writable()?;
        if self.dirty.is_empty() {
            return Ok(());
        }

        let base = self.data_offset();
        let block_size = self.block_size;
        let backing = self
            .backing
            .as_mut()
            .ok_or_else(|| DiskError::access("image is not open"))?;

        let mut written = Vec::with_capacity(self.dirty.len());
        let mut failed = Vec::new();
        for (&index, data) in self.dirty.iter() {
            let mut result = Ok(());
            let mut pos = 0;
            for (offset, len) in self.translator.translate(index).spans(block_size) {
                result = backing.write_at(base + offset, &data[pos..pos + len]);
                if result.is_err() {
                    break;
                }
                pos += len;
            }
            match result {
                Ok(()) => {
                    debug!("committed block {}", index);
                    written.push(index);
                }
                Err(e) => {
                    warn!("failed to write block {}: {}", index, e);
                    failed.push(index);
                }
            }
        }

        if let Err(e) = backing.flush() {
            warn!("flush failed after commit: {}", e);
            return Err(DiskError::CommitFailed {
                failed: self.dirty_blocks(),
            });
        }

        for index in &written {
            self.dirty.remove(index);
        }

        if failed.is_empty() {
            info!(
                "committed {} blocks to {}",
                written.len(),
                self.display_name()
            );
            Ok(())
        } else {
            Err(DiskError::CommitFailed { failed })
        }
    }

    /// First `len` bytes of the raw image, for sniffing container headers
    pub fn header_data_with_length(&self, len: usize) -> Result<Vec<u8>> {
        let backing = self.require_open()?;
        let len = len.min(backing.len()? as usize);
        let mut data = vec![0u8; len];
        backing.read_at(0, &mut data)?;
        Ok(data)
    }

    /// Complete image bytes with buffered writes applied
    pub(crate) fn physical_image(&self) -> Result<Vec<u8>> {
        let backing = self.require_open()?;
        let mut image = vec![0u8; backing.len()? as usize];
        backing.read_at(0, &mut image)?;
        let base = self.data_offset() as usize;
        for (&index, data) in &self.dirty {
            let mut pos = 0;
            for (offset, len) in self.translator.translate(index).spans(self.block_size) {
                let start = base + offset as usize;
                image[start..start + len].copy_from_slice(&data[pos..pos + len]);
                pos += len;
            }
        }
        Ok(image)
    }

    /// Write the complete image, buffered writes included, to a new file
    pub fn save_as<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::io::writer::write_image(self, path)
    }
}

impl Drop for BlockStorage {
    fn drop(&mut self) {
        if !self.dirty.is_empty() {
            warn!(
                "dropping {} with {} uncommitted blocks",
                self.display_name(),
                self.dirty.len()
            );
        }
    }
}
