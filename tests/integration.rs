/// Integration tests for a2disk

use a2disk::*;
use std::path::Path;
use tempfile::TempDir;

fn create_volume(path: &Path, blocks: usize, mode: AddressingMode, name: &str) -> Volume {
    let mut storage = BlockStorageBuilder::new()
        .block_count(blocks)
        .addressing_mode(mode)
        .file(path)
        .build()
        .expect("Failed to build image");
    storage.open_for_writing().expect("Failed to open image");
    Volume::format(storage, name).expect("Failed to format volume")
}

fn reopen(path: &Path) -> Volume {
    let mut storage = read_image(path).expect("Failed to read image");
    storage.open().expect("Failed to open image");
    Volume::open(storage).expect("Failed to mount volume")
}

#[test]
fn test_create_commit_and_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("work.po");

    let mut volume = create_volume(&path, BLOCKS_525, AddressingMode::BlockNative, "WORK");
    assert_eq!(volume.free_block_count(), 273);

    let data: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
    let mut root = volume.root().unwrap();
    let entry = FileEntry::new("DATA", 0x06).unwrap();
    root.create_file_with_entry(&mut volume, entry, &data).unwrap();
    volume.commit().unwrap();
    assert!(!volume.storage().has_modified_blocks());
    drop(volume);

    let volume = reopen(&path);
    assert_eq!(volume.name().unwrap(), "WORK");
    assert_eq!(volume.total_blocks(), 280);
    assert_eq!(volume.free_block_count(), 270);

    let listing = volume.read_dir().unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "DATA");
    assert_eq!(listing[0].size, 1024);
    assert_eq!(listing[0].blocks, 3);
    assert_eq!(listing[0].storage_type, StorageType::Sapling);
    assert_eq!(listing[0].access, Access::standard());

    assert_eq!(FileSystem::read_file(&volume, "data").unwrap(), data);
}

#[test]
fn test_small_image_file_allocation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("small.po");

    let mut volume = create_volume(&path, 140, AddressingMode::BlockNative, "SMALL");
    let free = volume.free_block_count();
    assert_eq!(free, 133);

    let (data_blocks, index_blocks) = blocks_for_length(1024);
    assert_eq!(data_blocks, 2);
    assert_eq!(index_blocks, 1);

    let mut root = volume.root().unwrap();
    let entry = FileEntry::new("PAYLOAD", 0x06).unwrap();
    root.create_file_with_entry(&mut volume, entry, &[0xC3; 1024]).unwrap();
    assert_eq!(volume.free_block_count(), free - data_blocks - index_blocks);

    let added = root.find("PAYLOAD").unwrap().entry.file_entry().unwrap().clone();
    let mut data_only = volume.file_blocks(&added).unwrap();
    data_only.retain(|&block| block != added.key_pointer);
    assert_eq!(data_only.len(), 2);

    volume.commit().unwrap();
    drop(volume);

    let volume = reopen(&path);
    let listing = volume.read_dir().unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "PAYLOAD");
    assert_eq!(listing[0].size, 1024);
    assert_eq!(volume.free_block_count(), free - 3);
}

#[test]
fn test_uncommitted_changes_are_lost_on_close() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scratch.po");

    let mut storage = BlockStorageBuilder::new().file(&path).build().unwrap();
    storage.open_for_writing().unwrap();
    storage.set_data(&[0x5A; 512], 10).unwrap();
    assert_eq!(storage.data_for_block(10).unwrap(), vec![0x5A; 512]);
    storage.close();

    let mut storage = BlockStorage::from_path(&path).unwrap();
    storage.open_for_writing().unwrap();
    assert_eq!(storage.data_for_block(10).unwrap(), vec![0; 512]);

    storage.set_data(&[0xA5; 512], 10).unwrap();
    storage.commit_modified_blocks().unwrap();
    storage.close();

    let mut storage = BlockStorage::from_path(&path).unwrap();
    storage.open().unwrap();
    assert_eq!(storage.data_for_block(10).unwrap(), vec![0xA5; 512]);
}

#[test]
fn test_delete_restores_free_count() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("delete.po");
    let mut volume = create_volume(&path, BLOCKS_525, AddressingMode::BlockNative, "DEL");

    let before = volume.free_block_count();
    volume.write_file("BIG", &vec![7u8; 20_000]).unwrap();
    let mut root = volume.root().unwrap();
    root.create_directory_with_name(&mut volume, "SUB").unwrap();
    volume.write_file("SUB/INNER", &[1, 2, 3]).unwrap();
    assert!(volume.free_block_count() < before);

    volume.delete_file("BIG").unwrap();
    volume.delete_file("SUB").unwrap();
    assert_eq!(volume.free_block_count(), before);
    assert!(volume.read_dir().unwrap().is_empty());
    assert_eq!(volume.root().unwrap().file_count().unwrap(), 0);
}

#[test]
fn test_unique_names_are_stable() {
    let mut storage = BlockStorage::with_capacity(512, 280).unwrap();
    storage.open_for_writing().unwrap();
    let mut volume = Volume::format(storage, "NAMES").unwrap();
    let mut root = volume.root().unwrap();

    assert_eq!(root.unique_name_from_string("hello world"), "HELLO.WORLD");
    root.create_file_with_entry(&mut volume, FileEntry::new("HELLO", 4).unwrap(), b"1")
        .unwrap();

    let first = root.unique_name_from_string("hello");
    assert_eq!(first, "HELLO.1");
    assert_eq!(root.unique_name_from_string("hello"), first);

    root.create_file_with_entry(&mut volume, FileEntry::new(&first, 4).unwrap(), b"2")
        .unwrap();
    assert_eq!(root.unique_name_from_string("hello"), "HELLO.2");

    let long = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let base = root.unique_name_from_string(long);
    assert_eq!(base, "ABCDEFGHIJKLMNO");
    root.create_file_with_entry(&mut volume, FileEntry::new(&base, 4).unwrap(), b"3")
        .unwrap();
    let next = root.unique_name_from_string(long);
    assert_eq!(next, "ABCDEFGHIJKLM.1");
    assert!(is_valid_name(&next));
}

#[derive(Debug)]
struct RejectingBacking {
    inner: MemoryBacking,
    rejected_offset: u64,
}

impl Backing for RejectingBacking {
    fn len(&self) -> Result<u64> {
        self.inner.len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if offset == self.rejected_offset {
            return Err(DiskError::Io(std::io::Error::other("sector not found")));
        }
        self.inner.write_at(offset, data)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }
}

#[test]
fn test_partial_commit_keeps_failed_blocks_staged() {
    let backing = RejectingBacking {
        inner: MemoryBacking::zeroed(280 * 512),
        rejected_offset: 7 * 512,
    };
    let mut storage = BlockStorage::with_backing(Box::new(backing), &StorageSpec::prodos_525())
        .unwrap();
    storage.open_for_writing().unwrap();
    let mut volume = Volume::format(storage, "FLAKY").unwrap();
    volume.write_file("NOTE", b"first data block is 7").unwrap();

    match volume.commit() {
        Err(DiskError::CommitFailed { failed }) => assert_eq!(failed, vec![7]),
        other => panic!("expected a partial commit, got {:?}", other),
    }
    assert_eq!(volume.storage().dirty_blocks(), vec![7]);
    assert_eq!(
        FileSystem::read_file(&volume, "NOTE").unwrap(),
        b"first data block is 7"
    );
}

#[test]
fn test_directory_block_survives_bogus_delete() {
    let mut storage = BlockStorage::with_capacity(512, 280).unwrap();
    storage.open_for_writing().unwrap();
    let mut volume = Volume::format(storage, "ANCHOR").unwrap();

    let mut root = volume.root().unwrap();
    let sub = root.create_directory_with_name(&mut volume, "SUB").unwrap();
    let mut dir = volume.directory_at("SUB").unwrap();
    let location = dir
        .create_file_with_entry(&mut volume, FileEntry::new("ODD", 6).unwrap(), b"x")
        .unwrap();

    // Point the file at its own directory's key block
    let mut block = volume.read_block(location.block).unwrap();
    let key = location.offset() + 0x11;
    block[key..key + 2].copy_from_slice(&sub.key_pointer.to_le_bytes());
    volume.write_block(location.block, &block).unwrap();

    let mut dir = volume.directory_at("SUB").unwrap();
    dir.delete_file_entry(&mut volume, location).unwrap();

    assert!(!volume.is_block_free(sub.key_pointer));
    let dir = volume.directory_at("SUB").unwrap();
    assert_eq!(dir.name().unwrap(), "SUB");
    assert!(dir.entries().is_empty());
}

#[test]
fn test_dos_order_image() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dos.do");

    let mut volume = create_volume(&path, BLOCKS_525, AddressingMode::DosOrder, "SKEWED");
    volume.write_file("TEXT", b"APPLE ][").unwrap();
    volume.commit().unwrap();
    drop(volume);

    let volume = reopen(&path);
    assert_eq!(volume.storage().addressing_mode(), AddressingMode::DosOrder);
    assert_eq!(volume.name().unwrap(), "SKEWED");
    assert_eq!(FileSystem::read_file(&volume, "TEXT").unwrap(), b"APPLE ][");

    // The volume key block is split across two skewed sectors
    let raw = std::fs::read(&path).unwrap();
    let block = volume.read_block(2).unwrap();
    let translator = volume.storage().translator();
    for (half, chunk) in block.chunks(SECTOR_SIZE).enumerate() {
        let ts = translator.dos_track_sector(2, half == 1);
        let offset = translator.sector_offset(ts) as usize;
        assert_eq!(&raw[offset..offset + SECTOR_SIZE], chunk);
    }
}

#[test]
fn test_two_img_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("disk.2mg");

    let mut storage = BlockStorageBuilder::new()
        .block_count(BLOCKS_525)
        .two_img()
        .file(&path)
        .build()
        .unwrap();
    storage.open_for_writing().unwrap();
    let mut volume = Volume::format(storage, "CONTAINER").unwrap();
    volume.write_file("README", b"inside a 2IMG").unwrap();
    volume.commit().unwrap();
    drop(volume);

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(detect_format(&raw), Some(ImageFormat::TwoImg));
    assert_eq!(raw.len(), 64 + 280 * 512);

    let volume = reopen(&path);
    let header = TwoImgHeader::parse(volume.storage().header_data()).unwrap();
    assert_eq!(header.block_count, 280);
    assert_eq!(header.data_offset, 64);
    assert_eq!(volume.storage().length(), 280);
    assert_eq!(
        FileSystem::read_file(&volume, "README").unwrap(),
        b"inside a 2IMG"
    );
}

#[test]
fn test_tree_file_on_800k_volume() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.po");

    let mut volume = create_volume(&path, BLOCKS_35, AddressingMode::BlockNative, "BIG");
    let data: Vec<u8> = (0..300_000u32).map(|i| (i * 7 % 256) as u8).collect();
    volume.write_file("HUGE", &data).unwrap();
    volume.commit().unwrap();
    drop(volume);

    let volume = reopen(&path);
    let listing = volume.read_dir().unwrap();
    assert_eq!(listing[0].storage_type, StorageType::Tree);
    assert_eq!(listing[0].blocks, 586 + 4);
    assert_eq!(FileSystem::read_file(&volume, "HUGE").unwrap(), data);
}

#[test]
fn test_save_as_copies_pending_changes() {
    let dir = TempDir::new().unwrap();
    let copy = dir.path().join("copy.po");

    let mut storage = BlockStorage::with_capacity(512, 280).unwrap();
    storage.open_for_writing().unwrap();
    let mut volume = Volume::format(storage, "MEMORY").unwrap();
    volume.write_file("KEEP", b"saved").unwrap();
    volume.storage().save_as(&copy).unwrap();

    let volume = reopen(&copy);
    assert_eq!(volume.name().unwrap(), "MEMORY");
    assert_eq!(FileSystem::read_file(&volume, "KEEP").unwrap(), b"saved");
}
