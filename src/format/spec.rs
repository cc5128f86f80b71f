/// Storage specifications and presets

use crate::format::constants::*;

/// How logical blocks are laid out in the image bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// Blocks are stored sequentially (ProDOS order, `.po`, `.hdv`)
    BlockNative,
    /// 256-byte sectors are stored in DOS 3.3 order (`.do`, `.dsk`) and each
    /// block is made of two skewed half-sectors
    DosOrder,
}

impl AddressingMode {
    /// Get a human-readable name for this mode
    pub fn name(&self) -> &'static str {
        match self {
            AddressingMode::BlockNative => "ProDOS order",
            AddressingMode::DosOrder => "DOS 3.3 order",
        }
    }
}

impl std::fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Block storage specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSpec {
    /// Bytes per block
    pub block_size: usize,
    /// Number of usable blocks
    pub block_count: usize,
    /// Physical layout of the blocks
    pub addressing_mode: AddressingMode,
    /// Blocks of padding between the header and the first usable block
    pub partition_offset: usize,
    /// Container header preceding the data
    pub header: Vec<u8>,
}

impl StorageSpec {
    /// Create a new block-native specification
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            block_count,
            addressing_mode: AddressingMode::BlockNative,
            partition_offset: 0,
            header: Vec::new(),
        }
    }

    /// 140K 5.25" ProDOS-ordered disk
    pub fn prodos_525() -> Self {
        Self::new(BLOCK_SIZE, BLOCKS_525)
    }

    /// 140K 5.25" DOS 3.3-ordered disk
    pub fn dos33_525() -> Self {
        Self::new(BLOCK_SIZE, BLOCKS_525).with_addressing_mode(AddressingMode::DosOrder)
    }

    /// 800K 3.5" disk
    pub fn prodos_35() -> Self {
        Self::new(BLOCK_SIZE, BLOCKS_35)
    }

    /// Hard disk image of the given number of blocks
    pub fn hard_disk(block_count: usize) -> Self {
        Self::new(BLOCK_SIZE, block_count.min(MAX_BLOCKS))
    }

    /// Create a copy with a different addressing mode
    pub fn with_addressing_mode(mut self, mode: AddressingMode) -> Self {
        self.addressing_mode = mode;
        self
    }

    /// Create a copy with a container header
    pub fn with_header(mut self, header: Vec<u8>) -> Self {
        self.header = header;
        self
    }

    /// Create a copy with a partition offset
    pub fn with_partition_offset(mut self, blocks: usize) -> Self {
        self.partition_offset = blocks;
        self
    }

    /// Total size of the data area in bytes
    pub fn total_capacity(&self) -> usize {
        self.block_count * self.block_size
    }

    /// Total size of the data area in kilobytes
    pub fn total_capacity_kb(&self) -> usize {
        self.total_capacity() / 1024
    }

    /// Total image size including header and partition padding
    pub fn image_size(&self) -> usize {
        self.header.len() + (self.partition_offset + self.block_count) * self.block_size
    }
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self::prodos_525()
    }
}
