/// ProDOS directories
///
/// A directory is a chain of blocks linked by previous/next pointers. Each
/// block holds 13 slots; the first slot of the key block is the directory
/// header. A [`Directory`] keeps the chain block numbers and the decoded
/// slots in on-disk order and writes every change back through the volume,
/// where it stays buffered until committed.

use crate::error::{DiskError, Result};
use crate::filesystem::entry::{
    sanitize_name, validate_name, DirectoryHeader, Entry, EntryBytes, EntryLocation, FileEntry,
    HeaderKind, StorageType,
};
use crate::filesystem::time::Timestamp;
use crate::filesystem::volume::{blocks_for_length, Volume, MAX_FILE_SIZE};
use crate::format::constants::*;
use log::{debug, info, warn};

/// Load state of a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    /// Only the key block is known
    Unloaded,
    /// Slots decoded and in sync with the volume
    Loaded,
    /// Changes written to the volume but not yet committed
    Mutated,
}

/// A decoded slot and where it lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySlot {
    /// Position in the chain
    pub location: EntryLocation,
    /// Decoded content
    pub entry: Entry,
}

/// Where a new entry will go
#[derive(Debug, Clone, Copy)]
enum SlotChoice {
    /// An existing empty or deleted slot
    Existing(EntryLocation),
    /// The first slot of a new block appended to the chain
    Extend,
}

/// A ProDOS volume directory or subdirectory
#[derive(Debug, Clone)]
pub struct Directory {
    key_block: u16,
    blocks: Vec<u16>,
    slots: Vec<DirectorySlot>,
    file_entry: Option<(EntryLocation, FileEntry)>,
    all_entries_visible: bool,
    state: DirectoryState,
}

impl Directory {
    /// Unloaded directory anchored at a key block
    pub fn at_block(block: u16) -> Self {
        Self {
            key_block: block,
            blocks: Vec::new(),
            slots: Vec::new(),
            file_entry: None,
            all_entries_visible: false,
            state: DirectoryState::Unloaded,
        }
    }

    /// Load the directory whose key block is `block`
    pub fn open(volume: &Volume, block: u16) -> Result<Self> {
        let mut directory = Self::at_block(block);
        directory.load(volume)?;
        Ok(directory)
    }

    /// Load the subdirectory governed by `entry`, found at `location` in its parent
    pub fn from_file_entry(
        volume: &Volume,
        entry: &FileEntry,
        location: EntryLocation,
    ) -> Result<Self> {
        if entry.storage_type != StorageType::Subdirectory {
            return Err(DiskError::NotADirectory(entry.name()));
        }
        let mut directory = Self::at_block(entry.key_pointer);
        directory.file_entry = Some((location, entry.clone()));
        directory.load(volume)?;
        if directory.header()?.storage_type() != StorageType::SubdirectoryHeader {
            return Err(DiskError::invalid_format(format!(
                "{} does not point at a subdirectory header",
                entry.name()
            )));
        }
        Ok(directory)
    }

    /// Walk the chain and decode every slot
    ///
    /// Pointers outside the volume, loops and a key block without a header
    /// are format errors.
    pub fn load(&mut self, volume: &Volume) -> Result<()> {
        let blocks = volume.directory_chain(self.key_block)?;
        let mut slots = Vec::with_capacity(blocks.len() * ENTRIES_PER_BLOCK);
        for &block in &blocks {
            let data = volume.read_block(block)?;
            for slot in 0..ENTRIES_PER_BLOCK {
                let location = EntryLocation::new(block, slot);
                let offset = location.offset();
                let mut bytes: EntryBytes = [0; ENTRY_LENGTH];
                bytes.copy_from_slice(&data[offset..offset + ENTRY_LENGTH]);
                slots.push(DirectorySlot {
                    location,
                    entry: Entry::decode(&bytes),
                });
            }
        }

        match slots.first().map(|s| &s.entry) {
            Some(Entry::Header(header))
                if header.entry_length as usize == ENTRY_LENGTH
                    && header.entries_per_block as usize == ENTRIES_PER_BLOCK => {}
            _ => {
                return Err(DiskError::invalid_format(format!(
                    "block {} is not a directory key block",
                    self.key_block
                )))
            }
        }

        debug!(
            "loaded directory at block {} ({} blocks, {} slots)",
            self.key_block,
            blocks.len(),
            slots.len()
        );
        self.blocks = blocks;
        self.slots = slots;
        self.state = DirectoryState::Loaded;
        Ok(())
    }

    /// Key block
    pub fn key_block(&self) -> u16 {
        self.key_block
    }

    /// Chain block numbers in order
    pub fn blocks(&self) -> &[u16] {
        &self.blocks
    }

    /// Load state
    pub fn state(&self) -> DirectoryState {
        self.state
    }

    /// Whether tombstones are listed and left behind on deletion
    pub fn all_entries_visible(&self) -> bool {
        self.all_entries_visible
    }

    /// Show or hide tombstones
    pub fn set_all_entries_visible(&mut self, visible: bool) {
        self.all_entries_visible = visible;
    }

    /// Governing entry in the parent, for subdirectories
    pub fn file_entry(&self) -> Option<&FileEntry> {
        self.file_entry.as_ref().map(|(_, entry)| entry)
    }

    /// Location of the governing entry in the parent, for subdirectories
    pub fn file_entry_location(&self) -> Option<EntryLocation> {
        self.file_entry.as_ref().map(|(location, _)| *location)
    }

    /// Whether this is the volume directory
    pub fn is_root(&self) -> bool {
        matches!(
            self.header().map(|h| h.kind),
            Ok(HeaderKind::Volume { .. })
        )
    }

    /// Directory header
    pub fn header(&self) -> Result<&DirectoryHeader> {
        match self.slots.first().map(|s| &s.entry) {
            Some(Entry::Header(header)) => Ok(header),
            _ => Err(DiskError::filesystem(format!(
                "directory at block {} is not loaded",
                self.key_block
            ))),
        }
    }

    /// Directory name
    pub fn name(&self) -> Result<String> {
        Ok(self.header()?.name())
    }

    /// Active entries recorded in the header
    pub fn file_count(&self) -> Result<u16> {
        Ok(self.header()?.file_count)
    }

    /// Listed slots in on-disk order: active entries, plus tombstones when
    /// all entries are visible
    pub fn entries(&self) -> Vec<&DirectorySlot> {
        self.slots
            .iter()
            .filter(|slot| match slot.entry {
                Entry::File(_) => true,
                Entry::Deleted(_) => self.all_entries_visible,
                Entry::Empty | Entry::Header(_) => false,
            })
            .collect()
    }

    /// Every slot including the header and empty slots
    pub fn slots(&self) -> &[DirectorySlot] {
        &self.slots
    }

    /// Active entry with the given name, ignoring case
    pub fn find(&self, name: &str) -> Option<&DirectorySlot> {
        self.slots.iter().find(|slot| match &slot.entry {
            Entry::File(entry) => entry.name().eq_ignore_ascii_case(name),
            _ => false,
        })
    }

    /// Slot at a location
    pub fn slot_at(&self, location: EntryLocation) -> Option<&DirectorySlot> {
        self.slots.iter().find(|slot| slot.location == location)
    }

    /// Valid, non-colliding name derived from arbitrary text
    ///
    /// The text is sanitised first; while the name is taken, `.1`, `.2`, ...
    /// is appended with the base cut so the result stays within 15
    /// characters.
    pub fn unique_name_from_string(&self, name: &str) -> String {
        let base = sanitize_name(name);
        if self.find(&base).is_none() {
            return base;
        }
        let mut n = 1usize;
        loop {
            let suffix = format!(".{}", n);
            let keep = MAX_NAME_LENGTH.saturating_sub(suffix.len()).min(base.len());
            let candidate = format!("{}{}", &base[..keep], suffix);
            if self.find(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    fn require_loaded(&self) -> Result<()> {
        if self.state == DirectoryState::Unloaded {
            return Err(DiskError::filesystem(format!(
                "directory at block {} is not loaded",
                self.key_block
            )));
        }
        Ok(())
    }

    fn check_new_name(&self, name: &str) -> Result<String> {
        let name = validate_name(name)?;
        if self.find(&name).is_some() {
            return Err(DiskError::NameCollision(name));
        }
        Ok(name)
    }

    /// First available slot in chain order, else extension when allowed
    fn choose_slot(&self) -> Result<SlotChoice> {
        if let Some(slot) = self.slots.iter().find(|slot| slot.entry.is_available()) {
            return Ok(SlotChoice::Existing(slot.location));
        }
        if self.is_root() {
            return Err(DiskError::DirectoryFull(self.name()?));
        }
        Ok(SlotChoice::Extend)
    }

    /// Append `block` to the chain and return its first slot
    fn extend_chain(&mut self, volume: &mut Volume, block: u16) -> Result<EntryLocation> {
        let last = *self
            .blocks
            .last()
            .ok_or_else(|| DiskError::filesystem("directory chain is empty"))?;

        let mut data = vec![0u8; BLOCK_SIZE];
        data[0..2].copy_from_slice(&last.to_le_bytes());
        volume.write_block(block, &data)?;

        let mut last_data = volume.read_block(last)?;
        last_data[2..4].copy_from_slice(&block.to_le_bytes());
        volume.write_block(last, &last_data)?;

        self.blocks.push(block);
        for slot in 0..ENTRIES_PER_BLOCK {
            self.slots.push(DirectorySlot {
                location: EntryLocation::new(block, slot),
                entry: Entry::Empty,
            });
        }

        if let Some((location, _)) = self.file_entry {
            self.update_governing_entry(volume, location, |entry| {
                entry.blocks_used = entry.blocks_used.saturating_add(1);
                entry.eof += BLOCK_SIZE as u32;
                Ok(())
            })?;
        }

        debug!("extended directory {} with block {}", self.key_block, block);
        Ok(EntryLocation::new(block, 0))
    }

    fn update_governing_entry<F: FnOnce(&mut FileEntry) -> Result<()>>(
        &mut self,
        volume: &mut Volume,
        location: EntryLocation,
        update: F,
    ) -> Result<()> {
        let mut data = volume.read_block(location.block)?;
        let offset = location.offset();
        let mut bytes: EntryBytes = [0; ENTRY_LENGTH];
        bytes.copy_from_slice(&data[offset..offset + ENTRY_LENGTH]);
        let mut entry = match Entry::decode(&bytes) {
            Entry::File(entry) if entry.is_directory() => entry,
            _ => {
                return Err(DiskError::invalid_format(format!(
                    "governing entry at {} is not a subdirectory",
                    location
                )))
            }
        };
        update(&mut entry)?;
        data[offset..offset + ENTRY_LENGTH].copy_from_slice(&Entry::File(entry.clone()).encode());
        volume.write_block(location.block, &data)?;
        self.file_entry = Some((location, entry));
        Ok(())
    }

    fn write_slot(
        &mut self,
        volume: &mut Volume,
        location: EntryLocation,
        entry: Entry,
    ) -> Result<()> {
        let mut data = volume.read_block(location.block)?;
        let offset = location.offset();
        data[offset..offset + ENTRY_LENGTH].copy_from_slice(&entry.encode());
        volume.write_block(location.block, &data)?;
        if let Some(slot) = self.slots.iter_mut().find(|s| s.location == location) {
            slot.entry = entry;
        }
        self.state = DirectoryState::Mutated;
        Ok(())
    }

    fn update_header<F: FnOnce(&mut DirectoryHeader)>(
        &mut self,
        volume: &mut Volume,
        update: F,
    ) -> Result<()> {
        let mut header = self.header()?.clone();
        update(&mut header);
        let location = EntryLocation::new(self.key_block, 0);
        self.write_slot(volume, location, Entry::Header(header))
    }

    /// Add a file holding `data`
    ///
    /// The slot, any chain extension and the data blocks are chosen before
    /// anything is written, so a failure leaves the volume untouched. The
    /// entry's layout fields (storage type, key pointer, blocks used, EOF,
    /// header pointer) are filled in here.
    pub fn create_file_with_entry(
        &mut self,
        volume: &mut Volume,
        mut entry: FileEntry,
        data: &[u8],
    ) -> Result<EntryLocation> {
        self.require_loaded()?;
        volume.require_writable()?;
        let name = self.check_new_name(&entry.name())?;
        if data.len() > MAX_FILE_SIZE {
            return Err(DiskError::filesystem(format!(
                "{} bytes exceeds the largest ProDOS file",
                data.len()
            )));
        }

        let choice = self.choose_slot()?;
        let (data_blocks, index_blocks) = blocks_for_length(data.len());
        let file_blocks = data_blocks + index_blocks;
        let extra = usize::from(matches!(choice, SlotChoice::Extend));
        let picked = volume.find_free_blocks(file_blocks + extra)?;

        volume.mark_used(&picked)?;
        let location = match choice {
            SlotChoice::Existing(location) => location,
            SlotChoice::Extend => self.extend_chain(volume, picked[file_blocks])?,
        };
        let storage_type = volume.write_file_data(data, &picked[..file_blocks])?;

        entry.storage_type = storage_type;
        entry.key_pointer = picked[0];
        entry.blocks_used = file_blocks as u16;
        entry.eof = data.len() as u32;
        entry.header_pointer = self.key_block;
        self.write_slot(volume, location, Entry::File(entry))?;
        self.update_header(volume, |header| {
            header.file_count = header.file_count.saturating_add(1)
        })?;

        info!(
            "created {} ({} bytes, {} blocks) at {}",
            name,
            data.len(),
            file_blocks,
            location
        );
        Ok(location)
    }

    /// Add an empty subdirectory
    pub fn create_directory_with_name(
        &mut self,
        volume: &mut Volume,
        name: &str,
    ) -> Result<FileEntry> {
        self.require_loaded()?;
        volume.require_writable()?;
        let name = self.check_new_name(name)?;

        let choice = self.choose_slot()?;
        let extra = usize::from(matches!(choice, SlotChoice::Extend));
        let picked = volume.find_free_blocks(1 + extra)?;

        volume.mark_used(&picked)?;
        let location = match choice {
            SlotChoice::Existing(location) => location,
            SlotChoice::Extend => self.extend_chain(volume, picked[1])?,
        };

        let key = picked[0];
        let header = DirectoryHeader::new_subdirectory(&name, location)?;
        let mut block = vec![0u8; BLOCK_SIZE];
        let offset = DIR_ENTRIES_OFFSET;
        let encoded = Entry::Header(header.clone()).encode();
        block[offset..offset + ENTRY_LENGTH].copy_from_slice(&encoded);
        volume.write_block(key, &block)?;

        let mut entry = FileEntry::new(&name, DIRECTORY_FILE_TYPE)?;
        entry.storage_type = StorageType::Subdirectory;
        entry.key_pointer = key;
        entry.blocks_used = 1;
        entry.eof = BLOCK_SIZE as u32;
        entry.creation = header.creation;
        entry.last_modified = header.creation;
        entry.header_pointer = self.key_block;
        self.write_slot(volume, location, Entry::File(entry.clone()))?;
        self.update_header(volume, |header| {
            header.file_count = header.file_count.saturating_add(1)
        })?;

        info!("created directory {} at block {}", name, key);
        Ok(entry)
    }

    /// Remove the entry at `location` and free its blocks
    ///
    /// Subdirectories are emptied recursively first. The slot is zeroed, or
    /// left as a tombstone when all entries are visible.
    pub fn delete_file_entry(
        &mut self,
        volume: &mut Volume,
        location: EntryLocation,
    ) -> Result<()> {
        self.require_loaded()?;
        volume.require_writable()?;
        let entry = match self.slot_at(location).map(|s| &s.entry) {
            Some(Entry::File(entry)) => entry.clone(),
            _ => return Err(DiskError::FileNotFound(location.to_string())),
        };

        if entry.is_directory() {
            let mut child = Directory::from_file_entry(volume, &entry, location)?;
            let children: Vec<EntryLocation> = child.entries_active().collect();
            for child_location in children {
                child.delete_file_entry(volume, child_location)?;
            }
        }

        let blocks: Vec<u16> = volume
            .file_blocks(&entry)?
            .into_iter()
            .filter(|block| {
                let anchored = self.blocks.contains(block);
                if anchored {
                    warn!(
                        "{} claims directory block {}; not freeing it",
                        entry.name(),
                        block
                    );
                }
                !anchored
            })
            .collect();
        volume.release(&blocks)?;

        let remains = if self.all_entries_visible {
            let mut tombstone = entry.clone();
            tombstone.storage_type = StorageType::Deleted;
            tombstone.last_modified = Timestamp::now();
            Entry::Deleted(tombstone)
        } else {
            Entry::Empty
        };
        self.write_slot(volume, location, remains)?;
        self.update_header(volume, |header| {
            header.file_count = header.file_count.saturating_sub(1)
        })?;

        info!("deleted {} ({} blocks freed)", entry.name(), blocks.len());
        Ok(())
    }

    fn entries_active(&self) -> impl Iterator<Item = EntryLocation> + '_ {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.entry, Entry::File(_)))
            .map(|slot| slot.location)
    }

    /// Rename the directory
    ///
    /// For a subdirectory the governing entry in the parent is renamed too,
    /// and the new name must not collide with its siblings.
    pub fn set_name(&mut self, volume: &mut Volume, name: &str) -> Result<()> {
        self.require_loaded()?;
        volume.require_writable()?;
        let name = validate_name(name)?;

        if let Some((location, entry)) = self.file_entry.clone() {
            let parent = Directory::open(volume, entry.header_pointer)?;
            if let Some(slot) = parent.find(&name) {
                if slot.location != location {
                    return Err(DiskError::NameCollision(name));
                }
            }
            let renamed = name.clone();
            self.update_governing_entry(volume, location, move |entry| entry.set_name(&renamed))?;
        }

        let mut header = self.header()?.clone();
        header.set_name(&name)?;
        self.write_slot(volume, EntryLocation::new(self.key_block, 0), Entry::Header(header))?;
        debug!("renamed directory at block {} to {}", self.key_block, name);
        Ok(())
    }

    /// Persist the volume's buffered writes
    pub fn commit(&mut self, volume: &mut Volume) -> Result<()> {
        volume.commit()?;
        if self.state == DirectoryState::Mutated {
            self.state = DirectoryState::Loaded;
        }
        Ok(())
    }

    /// Forget decoded content
    pub fn close(&mut self) {
        self.blocks.clear();
        self.slots.clear();
        self.state = DirectoryState::Unloaded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::BlockStorage;

    fn blank_volume(blocks: usize) -> Volume {
        let mut storage = BlockStorage::with_capacity(512, blocks).unwrap();
        storage.open_for_writing().unwrap();
        Volume::format(storage, "TEST").unwrap()
    }

    fn add(
        directory: &mut Directory,
        volume: &mut Volume,
        name: &str,
        len: usize,
    ) -> EntryLocation {
        let entry = FileEntry::new(name, 0x06).unwrap();
        directory
            .create_file_with_entry(volume, entry, &vec![0xA5; len])
            .unwrap()
    }

    #[test]
    fn test_empty_root() {
        let volume = blank_volume(280);
        let root = volume.root().unwrap();
        assert_eq!(root.state(), DirectoryState::Loaded);
        assert_eq!(root.blocks(), &[2, 3, 4, 5]);
        assert_eq!(root.slots().len(), 52);
        assert!(root.entries().is_empty());
        assert!(root.is_root());
        assert_eq!(root.name().unwrap(), "TEST");
    }

    #[test]
    fn test_create_file() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        let free = volume.free_block_count();

        let location = add(&mut root, &mut volume, "hello", 1024);
        assert_eq!(location, EntryLocation::new(2, 1));
        assert_eq!(root.state(), DirectoryState::Mutated);
        assert_eq!(root.file_count().unwrap(), 1);
        assert_eq!(volume.free_block_count(), free - 3);

        let entry = root.find("HELLO").unwrap().entry.file_entry().unwrap().clone();
        assert_eq!(entry.storage_type, StorageType::Sapling);
        assert_eq!(entry.eof(), 1024);
        assert_eq!(entry.blocks_used, 3);
        assert_eq!(entry.header_pointer, 2);
        assert_eq!(volume.read_file(&entry).unwrap(), vec![0xA5; 1024]);

        let reloaded = volume.root().unwrap();
        assert_eq!(reloaded.entries().len(), 1);
    }

    #[test]
    fn test_name_collision_is_case_insensitive() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        add(&mut root, &mut volume, "README", 10);
        let dirty = volume.storage().dirty_blocks();
        let free = volume.free_block_count();

        let entry = FileEntry::new("readme", 0x04).unwrap();
        assert!(matches!(
            root.create_file_with_entry(&mut volume, entry, b"x"),
            Err(DiskError::NameCollision(_))
        ));
        assert_eq!(volume.storage().dirty_blocks(), dirty);
        assert_eq!(volume.free_block_count(), free);
    }

    #[test]
    fn test_disk_full_leaves_nothing_dirty() {
        let mut volume = blank_volume(16);
        volume.commit().unwrap();
        let mut root = volume.root().unwrap();

        let entry = FileEntry::new("BIG", 0x06).unwrap();
        let result = root.create_file_with_entry(&mut volume, entry, &vec![0; 20 * 512]);
        assert!(matches!(result, Err(DiskError::DiskFull { .. })));
        assert!(volume.storage().dirty_blocks().is_empty());
        assert_eq!(root.state(), DirectoryState::Loaded);
    }

    #[test]
    fn test_root_never_extends() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        for i in 0..51 {
            add(&mut root, &mut volume, &format!("F{}", i), 0);
        }
        let entry = FileEntry::new("ONE.MORE", 0x06).unwrap();
        assert!(matches!(
            root.create_file_with_entry(&mut volume, entry, &[]),
            Err(DiskError::DirectoryFull(_))
        ));
    }

    #[test]
    fn test_subdirectory_extends() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        let entry = root.create_directory_with_name(&mut volume, "games").unwrap();
        let location = root.find("GAMES").unwrap().location;
        let mut games = Directory::from_file_entry(&volume, &entry, location).unwrap();
        assert_eq!(games.blocks().len(), 1);

        for i in 0..13 {
            add(&mut games, &mut volume, &format!("G{}", i), 0);
        }
        assert_eq!(games.blocks().len(), 2);
        assert_eq!(games.file_count().unwrap(), 13);
        assert_eq!(games.file_entry().unwrap().blocks_used, 2);
        assert_eq!(games.file_entry().unwrap().eof(), 1024);

        let reloaded = Directory::open(&volume, entry.key_pointer).unwrap();
        assert_eq!(reloaded.entries().len(), 13);
        assert_eq!(reloaded.header().unwrap().parent_location(), Some(location));
    }

    #[test]
    fn test_emptying_extended_chain_keeps_its_blocks() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        let entry = root.create_directory_with_name(&mut volume, "DOCS").unwrap();
        let location = root.find("DOCS").unwrap().location;
        let mut docs = Directory::from_file_entry(&volume, &entry, location).unwrap();

        let mut added: Vec<EntryLocation> = (0..14)
            .map(|i| add(&mut docs, &mut volume, &format!("PAGE{}", i), 100))
            .collect();
        let chain = docs.blocks().to_vec();
        assert_eq!(chain.len(), 2);
        let last = added.pop().unwrap();
        assert_eq!(last.block, chain[1]);

        for location in added {
            docs.delete_file_entry(&mut volume, location).unwrap();
        }
        docs.delete_file_entry(&mut volume, last).unwrap();

        assert!(docs.entries().is_empty());
        for block in &chain {
            assert!(!volume.is_block_free(*block));
        }
        let reloaded = Directory::open(&volume, entry.key_pointer).unwrap();
        assert_eq!(reloaded.blocks(), chain.as_slice());
        assert_eq!(reloaded.file_count().unwrap(), 0);
        assert_eq!(reloaded.name().unwrap(), "DOCS");
    }

    fn read_only(volume: Volume) -> Volume {
        let mut storage = volume.into_storage();
        storage.commit_modified_blocks().unwrap();
        storage.close();
        storage.open().unwrap();
        Volume::open(storage).unwrap()
    }

    #[test]
    fn test_create_on_read_only_volume_changes_nothing() {
        let mut volume = read_only(blank_volume(280));
        let mut root = volume.root().unwrap();
        let free = volume.free_block_count();

        let entry = FileEntry::new("LETTER", 0x04).unwrap();
        assert!(matches!(
            root.create_file_with_entry(&mut volume, entry, &[0x41; 1024]),
            Err(DiskError::Access(_))
        ));
        assert!(matches!(
            root.create_directory_with_name(&mut volume, "SUB"),
            Err(DiskError::Access(_))
        ));
        assert_eq!(volume.free_block_count(), free);
        assert!(volume.storage().dirty_blocks().is_empty());
        assert_eq!(root.state(), DirectoryState::Loaded);
        assert!(volume.root().unwrap().entries().is_empty());
    }

    #[test]
    fn test_delete_on_read_only_volume_changes_nothing() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        let location = add(&mut root, &mut volume, "KEEP", 1024);
        let mut volume = read_only(volume);
        let mut root = volume.root().unwrap();
        let free = volume.free_block_count();

        assert!(matches!(
            root.delete_file_entry(&mut volume, location),
            Err(DiskError::Access(_))
        ));
        assert_eq!(volume.free_block_count(), free);
        assert!(volume.storage().dirty_blocks().is_empty());
        assert!(root.find("KEEP").is_some());
    }

    #[test]
    fn test_first_available_slot_is_reused() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        let a = add(&mut root, &mut volume, "A", 10);
        add(&mut root, &mut volume, "B", 10);
        root.delete_file_entry(&mut volume, a).unwrap();
        let c = add(&mut root, &mut volume, "C", 10);
        assert_eq!(c, a);
    }

    #[test]
    fn test_delete_restores_free_blocks() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        let free = volume.free_block_count();
        let location = add(&mut root, &mut volume, "DATA", 300 * 512);
        assert!(volume.free_block_count() < free);

        root.delete_file_entry(&mut volume, location).unwrap();
        assert_eq!(volume.free_block_count(), free);
        assert_eq!(root.file_count().unwrap(), 0);
        assert_eq!(root.slot_at(location).unwrap().entry, Entry::Empty);
    }

    #[test]
    fn test_delete_leaves_tombstone_when_visible() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        let location = add(&mut root, &mut volume, "GHOST", 10);
        root.set_all_entries_visible(true);
        root.delete_file_entry(&mut volume, location).unwrap();

        assert!(matches!(root.slot_at(location).unwrap().entry, Entry::Deleted(_)));
        assert_eq!(root.entries().len(), 1);
        root.set_all_entries_visible(false);
        assert!(root.entries().is_empty());
        assert!(root.find("GHOST").is_none());
    }

    #[test]
    fn test_delete_missing_entry() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        assert!(matches!(
            root.delete_file_entry(&mut volume, EntryLocation::new(2, 5)),
            Err(DiskError::FileNotFound(_))
        ));
        assert!(matches!(
            root.delete_file_entry(&mut volume, EntryLocation::new(2, 0)),
            Err(DiskError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_delete_subdirectory_cascades() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        let free = volume.free_block_count();

        let entry = root.create_directory_with_name(&mut volume, "TOOLS").unwrap();
        let location = root.find("TOOLS").unwrap().location;
        let mut tools = Directory::from_file_entry(&volume, &entry, location).unwrap();
        add(&mut tools, &mut volume, "ASM", 2000);
        let inner = tools.create_directory_with_name(&mut volume, "LIB").unwrap();
        let inner_location = tools.find("LIB").unwrap().location;
        let mut lib = Directory::from_file_entry(&volume, &inner, inner_location).unwrap();
        add(&mut lib, &mut volume, "MACROS", 700);

        root.delete_file_entry(&mut volume, location).unwrap();
        assert_eq!(volume.free_block_count(), free);
        assert!(root.entries().is_empty());
        assert!(!volume.is_block_free(2));
    }

    #[test]
    fn test_from_file_entry_requires_directory() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        let location = add(&mut root, &mut volume, "PLAIN", 10);
        let entry = root.slot_at(location).unwrap().entry.file_entry().unwrap().clone();
        assert!(matches!(
            Directory::from_file_entry(&volume, &entry, location),
            Err(DiskError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_unique_name() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        assert_eq!(root.unique_name_from_string("my notes"), "MY.NOTES");
        assert_eq!(root.unique_name_from_string("my notes"), "MY.NOTES");

        add(&mut root, &mut volume, "MY.NOTES", 1);
        assert_eq!(root.unique_name_from_string("my notes"), "MY.NOTES.1");
        add(&mut root, &mut volume, "MY.NOTES.1", 1);
        assert_eq!(root.unique_name_from_string("My Notes"), "MY.NOTES.2");

        add(&mut root, &mut volume, "ABCDEFGHIJKLMNO", 1);
        assert_eq!(root.unique_name_from_string("abcdefghijklmno"), "ABCDEFGHIJKLM.1");
    }

    #[test]
    fn test_rename_subdirectory_updates_parent() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        let entry = root.create_directory_with_name(&mut volume, "OLD").unwrap();
        root.create_directory_with_name(&mut volume, "TAKEN").unwrap();
        let location = root.find("OLD").unwrap().location;
        let mut sub = Directory::from_file_entry(&volume, &entry, location).unwrap();

        assert!(matches!(
            sub.set_name(&mut volume, "taken"),
            Err(DiskError::NameCollision(_))
        ));
        assert!(matches!(
            sub.set_name(&mut volume, "9LIVES"),
            Err(DiskError::InvalidName(_))
        ));
        assert_eq!(sub.file_entry().unwrap().name(), "OLD");
        sub.set_name(&mut volume, "new").unwrap();
        assert_eq!(sub.name().unwrap(), "NEW");

        let root = volume.root().unwrap();
        assert!(root.find("NEW").is_some());
        assert!(root.find("OLD").is_none());
    }

    #[test]
    fn test_commit_returns_to_loaded() {
        let mut volume = blank_volume(280);
        let mut root = volume.root().unwrap();
        add(&mut root, &mut volume, "X", 1);
        assert_eq!(root.state(), DirectoryState::Mutated);
        root.commit(&mut volume).unwrap();
        assert_eq!(root.state(), DirectoryState::Loaded);
        assert!(!volume.storage().has_modified_blocks());

        root.close();
        assert_eq!(root.state(), DirectoryState::Unloaded);
        assert!(root.entries().is_empty());
    }
}
