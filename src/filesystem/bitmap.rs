/// ProDOS volume bitmap

use crate::error::{DiskError, Result};
use crate::format::constants::*;
use std::collections::BTreeSet;

/// Free-block map: one bit per block, most significant bit first, 1 = free
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBitmap {
    bits: Vec<u8>,
    total_blocks: usize,
    pointer: u16,
}

impl VolumeBitmap {
    /// Wrap bitmap bytes read from the volume
    pub fn from_bytes(bits: Vec<u8>, total_blocks: usize, pointer: u16) -> Result<Self> {
        if bits.len() * 8 < total_blocks {
            return Err(DiskError::filesystem(format!(
                "bitmap of {} bytes cannot track {} blocks",
                bits.len(),
                total_blocks
            )));
        }
        Ok(Self {
            bits,
            total_blocks,
            pointer,
        })
    }

    /// Bitmap with every block free
    pub fn all_free(total_blocks: usize, pointer: u16) -> Self {
        let mut bits = vec![0u8; bitmap_blocks_for(total_blocks) * BLOCK_SIZE];
        for block in 0..total_blocks {
            bits[block / 8] |= 0x80 >> (block % 8);
        }
        Self {
            bits,
            total_blocks,
            pointer,
        }
    }

    /// First bitmap block on the volume
    pub fn pointer(&self) -> u16 {
        self.pointer
    }

    /// Number of blocks the bitmap itself occupies
    pub fn block_count(&self) -> usize {
        bitmap_blocks_for(self.total_blocks)
    }

    /// Blocks tracked
    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    /// Whether a block is free; blocks past the volume are never free
    pub fn is_free(&self, block: usize) -> bool {
        block < self.total_blocks && self.bits[block / 8] & (0x80 >> (block % 8)) != 0
    }

    /// Set or clear a block's free bit, returning the bitmap block that changed
    pub fn set_free(&mut self, block: usize, free: bool) -> Result<usize> {
        if block >= self.total_blocks {
            return Err(DiskError::BlockOutOfRange {
                index: block,
                length: self.total_blocks,
            });
        }
        let mask = 0x80 >> (block % 8);
        if free {
            self.bits[block / 8] |= mask;
        } else {
            self.bits[block / 8] &= !mask;
        }
        Ok(block / BLOCKS_PER_BITMAP_BLOCK)
    }

    /// Number of free blocks
    pub fn free_count(&self) -> usize {
        (0..self.total_blocks).filter(|&b| self.is_free(b)).count()
    }

    /// Pick `count` free blocks, lowest first, without marking them
    pub fn find_free(&self, count: usize) -> Result<Vec<u16>> {
        let found: Vec<u16> = (0..self.total_blocks)
            .filter(|&b| self.is_free(b))
            .take(count)
            .map(|b| b as u16)
            .collect();
        if found.len() < count {
            return Err(DiskError::DiskFull {
                needed: count,
                available: self.free_count(),
            });
        }
        Ok(found)
    }

    /// Mark blocks used or free, returning the bitmap blocks that changed
    pub fn set_many(&mut self, blocks: &[u16], free: bool) -> Result<BTreeSet<usize>> {
        if let Some(&bad) = blocks.iter().find(|&&b| b as usize >= self.total_blocks) {
            return Err(DiskError::BlockOutOfRange {
                index: bad as usize,
                length: self.total_blocks,
            });
        }
        let mut touched = BTreeSet::new();
        for &block in blocks {
            touched.insert(self.set_free(block as usize, free)?);
        }
        Ok(touched)
    }

    /// Raw bytes of the `index`th bitmap block
    pub fn block_data(&self, index: usize) -> &[u8] {
        let start = index * BLOCK_SIZE;
        &self.bits[start..start + BLOCK_SIZE]
    }
}
