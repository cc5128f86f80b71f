/// Builder for creating fresh disk images

use crate::error::{DiskError, Result};
use crate::format::{AddressingMode, StorageSpec, TwoImgHeader};
use crate::image::BlockStorage;
use crate::io::{Backing, FileBacking, MemoryBacking};
use log::debug;
use std::path::{Path, PathBuf};

/// Builder for zero-filled block storage
///
/// Without a file the image lives in memory. The built storage is closed;
/// open it before use.
#[derive(Debug, Clone)]
pub struct BlockStorageBuilder {
    spec: StorageSpec,
    path: Option<PathBuf>,
    two_img: bool,
}

impl BlockStorageBuilder {
    /// Create a new builder for a 140K ProDOS-ordered disk
    pub fn new() -> Self {
        Self {
            spec: StorageSpec::default(),
            path: None,
            two_img: false,
        }
    }

    /// Set the whole storage specification
    pub fn spec(mut self, spec: StorageSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Set the block size
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.spec.block_size = block_size;
        self
    }

    /// Set the number of blocks
    pub fn block_count(mut self, block_count: usize) -> Self {
        self.spec.block_count = block_count;
        self
    }

    /// Set the physical addressing mode
    pub fn addressing_mode(mut self, mode: AddressingMode) -> Self {
        self.spec.addressing_mode = mode;
        self
    }

    /// Set raw header bytes preceding the data
    pub fn header(mut self, header: Vec<u8>) -> Self {
        self.spec.header = header;
        self
    }

    /// Set the partition offset in blocks
    pub fn partition_offset(mut self, blocks: usize) -> Self {
        self.spec.partition_offset = blocks;
        self
    }

    /// Wrap the data in a 2IMG container, replacing any raw header
    pub fn two_img(mut self) -> Self {
        self.two_img = true;
        self
    }

    /// Create the image as a file instead of in memory
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Build the storage, writing the header into the new image
    pub fn build(mut self) -> Result<BlockStorage> {
        if self.spec.block_size == 0 {
            return Err(DiskError::invalid_format("Block size must be non-zero"));
        }

        let mut data_limit = None;
        if self.two_img {
            let header = TwoImgHeader::new(
                self.spec.addressing_mode,
                self.spec.block_count,
                self.spec.block_size,
            );
            data_limit = Some(u64::from(header.data_length));
            self.spec.header = header.to_bytes();
            self.spec.partition_offset = 0;
        }

        let size = self.spec.image_size();
        debug!(
            "building {} block image ({} bytes, {})",
            self.spec.block_count, size, self.spec.addressing_mode
        );

        match self.path {
            Some(path) => {
                let mut backing = FileBacking::create(&path, size as u64)?;
                backing.write_at(0, &self.spec.header)?;
                backing.flush()?;
                drop(backing);
                BlockStorage::from_parts(Some(path), None, &self.spec, data_limit)
            }
            None => {
                let mut backing = MemoryBacking::zeroed(size);
                backing.write_at(0, &self.spec.header)?;
                BlockStorage::from_parts(None, Some(Box::new(backing)), &self.spec, data_limit)
            }
        }
    }
}

impl Default for BlockStorageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let mut storage = BlockStorageBuilder::new().build().unwrap();
        storage.open().unwrap();
        assert_eq!(storage.length(), 280);
        assert_eq!(storage.block_size(), 512);
        assert_eq!(storage.addressing_mode(), AddressingMode::BlockNative);
    }

    #[test]
    fn test_builder_custom() {
        let mut storage = BlockStorageBuilder::new()
            .block_size(256)
            .block_count(10)
            .build()
            .unwrap();
        storage.open().unwrap();
        assert_eq!(storage.length(), 10);
        assert_eq!(storage.data_for_block(9).unwrap().len(), 256);
    }

    #[test]
    fn test_builder_two_img() {
        let mut storage = BlockStorageBuilder::new()
            .spec(StorageSpec::prodos_525())
            .two_img()
            .build()
            .unwrap();
        storage.open().unwrap();
        assert_eq!(storage.header_data().len(), 64);
        assert_eq!(&storage.header_data_with_length(4).unwrap(), b"2IMG");
        assert_eq!(storage.length(), 280);
    }

    #[test]
    fn test_builder_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.po");
        let mut storage = BlockStorageBuilder::new()
            .block_count(16)
            .file(&path)
            .build()
            .unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16 * 512);
        assert!(!storage.is_open());
        storage.open_for_writing().unwrap();
        assert_eq!(storage.length(), 16);
    }

    #[test]
    fn test_builder_rejects_zero_block_size() {
        assert!(BlockStorageBuilder::new().block_size(0).build().is_err());
    }
}
