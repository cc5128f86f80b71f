/// ProDOS filesystem

/// Access flags
pub mod access;
/// Volume bitmap
pub mod bitmap;
/// Directory chains and entry management
pub mod directory;
/// Directory entry codec
pub mod entry;
/// Date and time stamps
pub mod time;
/// Volume mounting, allocation and file layout
pub mod volume;

pub use access::Access;
pub use bitmap::VolumeBitmap;
pub use directory::{Directory, DirectorySlot, DirectoryState};
pub use entry::{
    is_valid_name, sanitize_name, validate_name, DirectoryHeader, Entry, EntryLocation,
    FileEntry, HeaderKind, StorageType,
};
pub use time::Timestamp;
pub use volume::{blocks_for_length, Volume};

use crate::error::{DiskError, Result};
use crate::format::constants::*;

/// Summary of one directory entry
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Name as stored
    pub name: String,
    /// ProDOS file type
    pub file_type: u8,
    /// Auxiliary type
    pub aux_type: u16,
    /// File size in bytes
    pub size: usize,
    /// Blocks used
    pub blocks: usize,
    /// Storage type
    pub storage_type: StorageType,
    /// Access flags
    pub access: Access,
    /// Last modification time
    pub modified: Timestamp,
    /// Slot holding the entry
    pub location: EntryLocation,
}

impl DirEntry {
    /// Whether the entry is a subdirectory
    pub fn is_directory(&self) -> bool {
        self.storage_type == StorageType::Subdirectory
    }

    /// Whether the entry is a tombstone
    pub fn is_deleted(&self) -> bool {
        self.storage_type == StorageType::Deleted
    }

    fn from_slot(slot: &DirectorySlot) -> Option<Self> {
        let entry = match &slot.entry {
            Entry::File(entry) | Entry::Deleted(entry) => entry,
            Entry::Empty | Entry::Header(_) => return None,
        };
        Some(Self {
            name: entry.name(),
            file_type: entry.file_type,
            aux_type: entry.aux_type,
            size: entry.eof(),
            blocks: entry.blocks_used as usize,
            storage_type: entry.storage_type,
            access: entry.access,
            modified: entry.last_modified,
            location: slot.location,
        })
    }
}

/// Filesystem information
#[derive(Debug)]
pub struct FileSystemInfo {
    /// Filesystem type name
    pub fs_type: String,
    /// Volume name
    pub volume_name: String,
    /// Total blocks on disk
    pub total_blocks: usize,
    /// Free blocks
    pub free_blocks: usize,
    /// Block size in bytes
    pub block_size: usize,
}

/// Filesystem trait for accessing files on disk images
///
/// Names may be paths with `/` separators, relative to the volume directory.
pub trait FileSystem {
    /// List the volume directory
    fn read_dir(&self) -> Result<Vec<DirEntry>>;

    /// List a directory by path
    fn read_dir_at(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Read a file's contents
    fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Write a new file
    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()>;

    /// Delete a file or directory tree
    fn delete_file(&mut self, name: &str) -> Result<()>;

    /// Get filesystem information
    fn info(&self) -> Result<FileSystemInfo>;
}

/// List the visible entries of a loaded directory
pub fn list_directory(directory: &Directory) -> Vec<DirEntry> {
    directory
        .entries()
        .into_iter()
        .filter_map(DirEntry::from_slot)
        .collect()
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

impl Volume {
    /// Load the directory at a `/`-separated path
    pub fn directory_at(&self, path: &str) -> Result<Directory> {
        let mut directory = self.root()?;
        for part in split_path(path) {
            let slot = directory
                .find(part)
                .ok_or_else(|| DiskError::FileNotFound(part.to_string()))?;
            let entry = slot
                .entry
                .file_entry()
                .ok_or_else(|| DiskError::FileNotFound(part.to_string()))?;
            directory = Directory::from_file_entry(self, entry, slot.location)?;
        }
        Ok(directory)
    }

    /// Split a path into its parent directory and leaf name
    pub fn parent_of<'a>(&self, path: &'a str) -> Result<(Directory, &'a str)> {
        let parts = split_path(path);
        let (leaf, parents) = parts
            .split_last()
            .ok_or_else(|| DiskError::InvalidName(path.to_string()))?;
        let directory = self.directory_at(&parents.join("/"))?;
        Ok((directory, *leaf))
    }
}

impl FileSystem for Volume {
    fn read_dir(&self) -> Result<Vec<DirEntry>> {
        Ok(list_directory(&self.root()?))
    }

    fn read_dir_at(&self, path: &str) -> Result<Vec<DirEntry>> {
        Ok(list_directory(&self.directory_at(path)?))
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let (directory, leaf) = self.parent_of(name)?;
        let entry = directory
            .find(leaf)
            .and_then(|slot| slot.entry.file_entry())
            .ok_or_else(|| DiskError::FileNotFound(name.to_string()))?;
        Volume::read_file(self, entry)
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let (mut directory, leaf) = self.parent_of(name)?;
        let entry = FileEntry::new(leaf, 0x06)?;
        directory.create_file_with_entry(self, entry, data)?;
        Ok(())
    }

    fn delete_file(&mut self, name: &str) -> Result<()> {
        let (mut directory, leaf) = self.parent_of(name)?;
        let location = directory
            .find(leaf)
            .map(|slot| slot.location)
            .ok_or_else(|| DiskError::FileNotFound(name.to_string()))?;
        directory.delete_file_entry(self, location)
    }

    fn info(&self) -> Result<FileSystemInfo> {
        Ok(FileSystemInfo {
            fs_type: "ProDOS".to_string(),
            volume_name: self.name()?,
            total_blocks: self.total_blocks(),
            free_blocks: self.free_block_count(),
            block_size: BLOCK_SIZE,
        })
    }
}
