/// Logical block to physical offset translation
///
/// ProDOS addresses the medium as 512-byte blocks. DOS 3.3 ordered images
/// store 256-byte sectors in DOS logical order, so each block is assembled
/// from two half-sectors whose positions come from the interleave table.

use crate::error::{DiskError, Result};
use crate::format::constants::*;
use crate::format::AddressingMode;
use crate::image::TrackSector;

/// Physical placement of one logical block, relative to the data area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The block occupies `block_size` consecutive bytes
    Contiguous {
        /// Byte offset of the block
        offset: u64,
    },
    /// The block is made of two separate half-blocks
    Split {
        /// Byte offset of the first half
        first: u64,
        /// Byte offset of the second half
        second: u64,
        /// Size of each half in bytes
        half: usize,
    },
}

impl Placement {
    /// Byte ranges covered by this placement, in block order
    pub fn spans(&self, block_size: usize) -> Vec<(u64, usize)> {
        match *self {
            Placement::Contiguous { offset } => vec![(offset, block_size)],
            Placement::Split {
                first,
                second,
                half,
            } => vec![(first, half), (second, half)],
        }
    }
}

/// Converts logical block indices into physical byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressTranslator {
    mode: AddressingMode,
    block_size: usize,
}

impl AddressTranslator {
    /// Create a translator for the given mode and block size
    pub fn new(mode: AddressingMode, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(DiskError::invalid_format("Block size must be non-zero"));
        }
        if mode == AddressingMode::DosOrder && block_size != BLOCK_SIZE {
            return Err(DiskError::invalid_format(format!(
                "DOS 3.3 ordering requires {}-byte blocks, got {}",
                BLOCK_SIZE, block_size
            )));
        }
        Ok(Self { mode, block_size })
    }

    /// Addressing mode
    pub fn mode(&self) -> AddressingMode {
        self.mode
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Check that a block count can be addressed in this mode
    pub fn validate_length(&self, blocks: usize) -> Result<()> {
        if self.mode == AddressingMode::DosOrder && blocks % BLOCKS_PER_TRACK != 0 {
            return Err(DiskError::invalid_format(format!(
                "DOS 3.3 ordered image of {} blocks is not a whole number of tracks",
                blocks
            )));
        }
        Ok(())
    }

    /// Physical offset of a 256-byte ProDOS logical sector (half block)
    ///
    /// Only meaningful for sector-ordered images; block-native images map
    /// sectors linearly.
    pub fn translate_sector(&self, logical_sector: usize) -> u64 {
        match self.mode {
            AddressingMode::BlockNative => (logical_sector * SECTOR_SIZE) as u64,
            AddressingMode::DosOrder => {
                let ts = TrackSector::from_index(logical_sector);
                self.sector_offset(TrackSector::new(ts.track(), PRODOS_TO_DOS_SECTOR[ts.sector()]))
            }
        }
    }

    /// Physical offset of a DOS 3.3 track/sector
    pub fn sector_offset(&self, ts: TrackSector) -> u64 {
        (ts.index() * SECTOR_SIZE) as u64
    }

    /// Physical placement of a logical block
    pub fn translate(&self, block: usize) -> Placement {
        match self.mode {
            AddressingMode::BlockNative => Placement::Contiguous {
                offset: (block * self.block_size) as u64,
            },
            AddressingMode::DosOrder => Placement::Split {
                first: self.translate_sector(block * 2),
                second: self.translate_sector(block * 2 + 1),
                half: SECTOR_SIZE,
            },
        }
    }

    /// Logical ProDOS half-block sector stored at a physical track/sector
    pub fn logical_sector(&self, ts: TrackSector) -> usize {
        match self.mode {
            AddressingMode::BlockNative => ts.index(),
            AddressingMode::DosOrder => {
                let position = PRODOS_TO_DOS_SECTOR
                    .iter()
                    .position(|&s| s == ts.sector())
                    .unwrap_or(ts.sector());
                ts.track() * SECTORS_PER_TRACK + position
            }
        }
    }

    /// DOS 3.3 track/sector holding the given half of a block
    pub fn dos_track_sector(&self, block: usize, second_half: bool) -> TrackSector {
        let logical = block * 2 + usize::from(second_half);
        let ts = TrackSector::from_index(logical);
        match self.mode {
            AddressingMode::BlockNative => ts,
            AddressingMode::DosOrder => {
                TrackSector::new(ts.track(), PRODOS_TO_DOS_SECTOR[ts.sector()])
            }
        }
    }
}
