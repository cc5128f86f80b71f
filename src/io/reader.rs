/// Disk image reader

use crate::error::Result;
use crate::format::constants::*;
use crate::format::{detect_format, AddressingMode, ImageFormat, StorageSpec, TwoImgHeader};
use crate::image::BlockStorage;
use log::debug;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Describe an existing image file
///
/// A 2IMG header is honored when present. Otherwise the layout is inferred
/// from the extension: `.do` and `.dsk` are DOS 3.3 ordered, anything else
/// is treated as raw ProDOS blocks. The returned storage is closed and its
/// length is established when it is opened.
pub fn read_image<P: AsRef<Path>>(path: P) -> Result<BlockStorage> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let mut magic = vec![0u8; TWO_IMG_HEADER_SIZE.min(file_len as usize)];
    file.read_exact(&mut magic)?;

    let (spec, data_limit) = match detect_format(&magic) {
        Some(ImageFormat::TwoImg) => {
            let header = TwoImgHeader::parse(&magic)?;
            let mut header_bytes = vec![0u8; header.data_offset as usize];
            let prefix = magic.len().min(header_bytes.len());
            header_bytes[..prefix].copy_from_slice(&magic[..prefix]);
            if header_bytes.len() > prefix {
                file.read_exact(&mut header_bytes[prefix..])?;
            }
            debug!(
                "{}: 2IMG container, {} at offset {}",
                path.display(),
                header.addressing_mode,
                header.data_offset
            );
            let spec = StorageSpec::new(BLOCK_SIZE, header.data_length as usize / BLOCK_SIZE)
                .with_addressing_mode(header.addressing_mode)
                .with_header(header_bytes);
            (spec, Some(u64::from(header.data_length)))
        }
        _ => {
            let mode = match ImageFormat::from_extension(path) {
                Some(ImageFormat::DosOrder) => AddressingMode::DosOrder,
                _ => AddressingMode::BlockNative,
            };
            debug!("{}: raw image, {}", path.display(), mode);
            let spec = StorageSpec::new(BLOCK_SIZE, file_len as usize / BLOCK_SIZE)
                .with_addressing_mode(mode);
            (spec, None)
        }
    };

    BlockStorage::from_parts(Some(path.to_path_buf()), None, &spec, data_limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::BlockStorageBuilder;

    #[test]
    fn test_read_dos_ordered_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.dsk");
        std::fs::write(&path, vec![0u8; 143360]).unwrap();

        let mut storage = read_image(&path).unwrap();
        assert_eq!(storage.addressing_mode(), AddressingMode::DosOrder);
        storage.open().unwrap();
        assert_eq!(storage.length(), 280);
    }

    #[test]
    fn test_read_two_img() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.2mg");
        BlockStorageBuilder::new()
            .block_count(16)
            .two_img()
            .file(&path)
            .build()
            .unwrap();

        let mut storage = read_image(&path).unwrap();
        assert_eq!(storage.header_data().len(), 64);
        storage.open().unwrap();
        assert_eq!(storage.length(), 16);
    }

    #[test]
    fn test_read_truncated_two_img_fails_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.2mg");
        let mut bytes = TwoImgHeader::new(AddressingMode::BlockNative, 16, 512).to_bytes();
        bytes.extend(vec![0u8; 8 * 512]);
        std::fs::write(&path, bytes).unwrap();

        let mut storage = read_image(&path).unwrap();
        assert!(storage.open().is_err());
    }

    #[test]
    fn test_misaligned_raw_image_fails_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.po");
        std::fs::write(&path, vec![0u8; 1000]).unwrap();

        let mut storage = read_image(&path).unwrap();
        assert!(matches!(
            storage.open(),
            Err(crate::error::DiskError::InvalidFormat(_))
        ));
    }
}
