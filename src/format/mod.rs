/// Image container formats, specifications and constants

/// Format constants
pub mod constants;
/// Storage specification types
pub mod spec;

pub use constants::*;
pub use spec::{AddressingMode, StorageSpec};

use crate::error::{DiskError, Result};
use std::path::Path;

/// Disk image container type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Raw blocks in ProDOS order (`.po`, `.hdv`)
    ProdosOrder,
    /// Raw sectors in DOS 3.3 order (`.do`, `.dsk`)
    DosOrder,
    /// 2IMG container with a header describing the payload
    TwoImg,
}

impl ImageFormat {
    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::ProdosOrder => "ProDOS order",
            ImageFormat::DosOrder => "DOS 3.3 order",
            ImageFormat::TwoImg => "2IMG",
        }
    }

    /// Guess the format from a file extension
    pub fn from_extension<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "po" | "hdv" => Some(ImageFormat::ProdosOrder),
            "do" | "dsk" => Some(ImageFormat::DosOrder),
            "2mg" | "2img" => Some(ImageFormat::TwoImg),
            _ => None,
        }
    }
}

/// Detect a container format from the first bytes of an image
pub fn detect_format(magic: &[u8]) -> Option<ImageFormat> {
    if magic.starts_with(TWO_IMG_SIGNATURE) {
        Some(ImageFormat::TwoImg)
    } else {
        None
    }
}

/// Parsed 2IMG container header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoImgHeader {
    /// Creator signature
    pub creator: [u8; 4],
    /// Header length as declared
    pub header_length: u16,
    /// Payload sector ordering
    pub addressing_mode: AddressingMode,
    /// ProDOS block count (may be zero for DOS-ordered payloads)
    pub block_count: u32,
    /// Offset of the payload from the start of the file
    pub data_offset: u32,
    /// Length of the payload in bytes
    pub data_length: u32,
}

fn le_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

impl TwoImgHeader {
    /// Parse a 2IMG header from the start of an image
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < TWO_IMG_HEADER_SIZE {
            return Err(DiskError::invalid_format(format!(
                "2IMG header needs {} bytes, got {}",
                TWO_IMG_HEADER_SIZE,
                data.len()
            )));
        }
        if detect_format(data) != Some(ImageFormat::TwoImg) {
            return Err(DiskError::parse(0, "Missing 2IMG signature"));
        }

        let mut creator = [0u8; 4];
        creator.copy_from_slice(&data[4..8]);

        let header_length = le_u16(data, TWO_IMG_HEADER_LEN_OFFSET);
        let addressing_mode = match le_u32(data, TWO_IMG_FORMAT_OFFSET) {
            0 => AddressingMode::DosOrder,
            1 => AddressingMode::BlockNative,
            2 => {
                return Err(DiskError::invalid_format(
                    "Nibble 2IMG images are not supported",
                ))
            }
            other => {
                return Err(DiskError::parse(
                    TWO_IMG_FORMAT_OFFSET,
                    format!("Unknown 2IMG image format {}", other),
                ))
            }
        };
        let block_count = le_u32(data, TWO_IMG_BLOCKS_OFFSET);
        let data_offset = le_u32(data, TWO_IMG_DATA_OFFSET_OFFSET);
        let data_length = le_u32(data, TWO_IMG_DATA_LEN_OFFSET);

        if (data_offset as usize) < TWO_IMG_HEADER_SIZE {
            return Err(DiskError::parse(
                TWO_IMG_DATA_OFFSET_OFFSET,
                format!("2IMG data offset {} overlaps the header", data_offset),
            ));
        }

        Ok(Self {
            creator,
            header_length,
            addressing_mode,
            block_count,
            data_offset,
            data_length,
        })
    }

    /// Build a header for a payload of `block_count` blocks
    pub fn new(addressing_mode: AddressingMode, block_count: usize, block_size: usize) -> Self {
        Self {
            creator: *CREATOR_SIGNATURE,
            header_length: TWO_IMG_HEADER_SIZE as u16,
            addressing_mode,
            block_count: match addressing_mode {
                AddressingMode::BlockNative => block_count as u32,
                AddressingMode::DosOrder => 0,
            },
            data_offset: TWO_IMG_HEADER_SIZE as u32,
            data_length: (block_count * block_size) as u32,
        }
    }

    /// Encode the header into its 64-byte on-disk form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = vec![0u8; TWO_IMG_HEADER_SIZE];
        header[..4].copy_from_slice(TWO_IMG_SIGNATURE);
        header[4..8].copy_from_slice(&self.creator);
        header[TWO_IMG_HEADER_LEN_OFFSET..TWO_IMG_HEADER_LEN_OFFSET + 2]
            .copy_from_slice(&self.header_length.to_le_bytes());
        // version
        header[0x0A..0x0C].copy_from_slice(&1u16.to_le_bytes());
        let format: u32 = match self.addressing_mode {
            AddressingMode::DosOrder => 0,
            AddressingMode::BlockNative => 1,
        };
        header[TWO_IMG_FORMAT_OFFSET..TWO_IMG_FORMAT_OFFSET + 4]
            .copy_from_slice(&format.to_le_bytes());
        header[TWO_IMG_BLOCKS_OFFSET..TWO_IMG_BLOCKS_OFFSET + 4]
            .copy_from_slice(&self.block_count.to_le_bytes());
        header[TWO_IMG_DATA_OFFSET_OFFSET..TWO_IMG_DATA_OFFSET_OFFSET + 4]
            .copy_from_slice(&self.data_offset.to_le_bytes());
        header[TWO_IMG_DATA_LEN_OFFSET..TWO_IMG_DATA_LEN_OFFSET + 4]
            .copy_from_slice(&self.data_length.to_le_bytes());
        header
    }
}
