/// ProDOS directory entry records
///
/// Every slot of a directory block is 39 bytes and decodes into one
/// [`Entry`]. The codec is lossless: encoding a decoded slot reproduces the
/// original bytes, including name bytes past the name length and the
/// reserved area of headers.

use crate::error::{DiskError, Result};
use crate::filesystem::access::Access;
use crate::filesystem::time::Timestamp;
use crate::format::constants::*;
use log::warn;
use std::fmt;

/// Raw bytes of one directory slot
pub type EntryBytes = [u8; ENTRY_LENGTH];

/// Storage type nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    /// Slot is free (0)
    Deleted,
    /// One data block (1)
    Seedling,
    /// One index block (2)
    Sapling,
    /// Master index block (3)
    Tree,
    /// Pascal area (4)
    PascalArea,
    /// Forked file with an extended key block (5)
    Extended,
    /// Subdirectory file entry (0xD)
    Subdirectory,
    /// Subdirectory key block header (0xE)
    SubdirectoryHeader,
    /// Volume directory key block header (0xF)
    VolumeHeader,
    /// Any other value
    Other(u8),
}

impl StorageType {
    /// Decode from the high nibble value
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            0x0 => StorageType::Deleted,
            0x1 => StorageType::Seedling,
            0x2 => StorageType::Sapling,
            0x3 => StorageType::Tree,
            0x4 => StorageType::PascalArea,
            0x5 => StorageType::Extended,
            0xD => StorageType::Subdirectory,
            0xE => StorageType::SubdirectoryHeader,
            0xF => StorageType::VolumeHeader,
            other => StorageType::Other(other),
        }
    }

    /// Encode to the high nibble value
    pub fn nibble(&self) -> u8 {
        match self {
            StorageType::Deleted => 0x0,
            StorageType::Seedling => 0x1,
            StorageType::Sapling => 0x2,
            StorageType::Tree => 0x3,
            StorageType::PascalArea => 0x4,
            StorageType::Extended => 0x5,
            StorageType::Subdirectory => 0xD,
            StorageType::SubdirectoryHeader => 0xE,
            StorageType::VolumeHeader => 0xF,
            StorageType::Other(n) => n & 0x0F,
        }
    }

    /// Get a human-readable name for this storage type
    pub fn name(&self) -> &'static str {
        match self {
            StorageType::Deleted => "deleted",
            StorageType::Seedling => "seedling",
            StorageType::Sapling => "sapling",
            StorageType::Tree => "tree",
            StorageType::PascalArea => "pascal",
            StorageType::Extended => "extended",
            StorageType::Subdirectory => "directory",
            StorageType::SubdirectoryHeader => "subdir header",
            StorageType::VolumeHeader => "volume header",
            StorageType::Other(_) => "unknown",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of a slot within a directory chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryLocation {
    /// Directory block holding the slot
    pub block: u16,
    /// Slot index within the block (0-12)
    pub slot: usize,
}

impl EntryLocation {
    /// Create a new location
    pub fn new(block: u16, slot: usize) -> Self {
        Self { block, slot }
    }

    /// Byte offset of the slot within its block
    pub fn offset(&self) -> usize {
        DIR_ENTRIES_OFFSET + self.slot * ENTRY_LENGTH
    }
}

impl fmt::Display for EntryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {} slot {}", self.block, self.slot)
    }
}

/// Check a string against the ProDOS naming rules
///
/// 1-15 characters, a letter first, then letters, digits or periods.
pub fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= MAX_NAME_LENGTH
        && bytes[0].is_ascii_alphabetic()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'.')
}

/// Validate a name and return its stored (uppercase) form
pub fn validate_name(name: &str) -> Result<String> {
    if !is_valid_name(name) {
        return Err(DiskError::InvalidName(name.to_string()));
    }
    Ok(name.to_ascii_uppercase())
}

/// Turn arbitrary text into a valid ProDOS name
///
/// Characters outside the allowed set become periods, leading characters
/// that are not letters are dropped and the result is cut to 15 characters.
/// Text with no usable characters becomes `UNTITLED`.
pub fn sanitize_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '.'
            }
        })
        .skip_while(|c| !c.is_ascii_alphabetic())
        .take(MAX_NAME_LENGTH)
        .collect();
    if mapped.is_empty() {
        "UNTITLED".to_string()
    } else {
        mapped
    }
}

fn name_bytes(name: &str) -> Result<(u8, [u8; MAX_NAME_LENGTH])> {
    let stored = validate_name(name)?;
    let mut bytes = [0u8; MAX_NAME_LENGTH];
    bytes[..stored.len()].copy_from_slice(stored.as_bytes());
    Ok((stored.len() as u8, bytes))
}

fn decode_name(length: u8, bytes: &[u8; MAX_NAME_LENGTH]) -> String {
    let raw = &bytes[..(length as usize).min(MAX_NAME_LENGTH)];
    let name: String = raw.iter().map(|&b| (b & 0x7F) as char).collect();
    if !raw.iter().all(|b| b.is_ascii_graphic()) {
        warn!("directory entry has an invalid name {:?}", name);
    }
    name
}

fn le_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn put_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn timestamp_at(data: &[u8], offset: usize) -> Timestamp {
    Timestamp::from_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// File entry (also used for subdirectory entries and tombstones)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Storage type nibble
    pub storage_type: StorageType,
    /// Name length nibble
    pub name_length: u8,
    /// Raw name bytes, including any bytes past `name_length`
    pub name: [u8; MAX_NAME_LENGTH],
    /// ProDOS file type
    pub file_type: u8,
    /// Data block, index block, master index or subdirectory key block
    pub key_pointer: u16,
    /// Blocks used by the file, index blocks included
    pub blocks_used: u16,
    /// File length in bytes (24 bits)
    pub eof: u32,
    /// Creation time
    pub creation: Timestamp,
    /// Version of ProDOS that created the entry
    pub version: u8,
    /// Minimum ProDOS version able to access the entry
    pub min_version: u8,
    /// Access flags
    pub access: Access,
    /// Auxiliary type (load address, record length, ...)
    pub aux_type: u16,
    /// Last modification time
    pub last_modified: Timestamp,
    /// Key block of the directory holding this entry
    pub header_pointer: u16,
}

impl FileEntry {
    /// Create an entry for a new file; layout fields are set on creation
    pub fn new(name: &str, file_type: u8) -> Result<Self> {
        let (name_length, name) = name_bytes(name)?;
        let now = Timestamp::now();
        Ok(Self {
            storage_type: StorageType::Seedling,
            name_length,
            name,
            file_type,
            key_pointer: 0,
            blocks_used: 0,
            eof: 0,
            creation: now,
            version: 0,
            min_version: 0,
            access: Access::standard(),
            aux_type: 0,
            last_modified: now,
            header_pointer: 0,
        })
    }

    /// Decoded name
    pub fn name(&self) -> String {
        decode_name(self.name_length, &self.name)
    }

    /// Replace the name, validating it
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let (length, bytes) = name_bytes(name)?;
        self.name_length = length;
        self.name = bytes;
        Ok(())
    }

    /// Whether this entry governs a subdirectory
    pub fn is_directory(&self) -> bool {
        self.storage_type == StorageType::Subdirectory
    }

    /// File length in bytes
    pub fn eof(&self) -> usize {
        self.eof as usize
    }

    fn decode(data: &EntryBytes) -> Self {
        let mut name = [0u8; MAX_NAME_LENGTH];
        name.copy_from_slice(&data[1..16]);
        Self {
            storage_type: StorageType::from_nibble(data[0] >> 4),
            name_length: data[0] & 0x0F,
            name,
            file_type: data[16],
            key_pointer: le_u16(data, 17),
            blocks_used: le_u16(data, 19),
            eof: u32::from(data[21]) | u32::from(data[22]) << 8 | u32::from(data[23]) << 16,
            creation: timestamp_at(data, 24),
            version: data[28],
            min_version: data[29],
            access: Access(data[30]),
            aux_type: le_u16(data, 31),
            last_modified: timestamp_at(data, 33),
            header_pointer: le_u16(data, 37),
        }
    }

    fn encode(&self, data: &mut EntryBytes) {
        data[0] = (self.storage_type.nibble() << 4) | (self.name_length & 0x0F);
        data[1..16].copy_from_slice(&self.name);
        data[16] = self.file_type;
        put_u16(data, 17, self.key_pointer);
        put_u16(data, 19, self.blocks_used);
        data[21..24].copy_from_slice(&self.eof.to_le_bytes()[..3]);
        data[24..28].copy_from_slice(&self.creation.to_bytes());
        data[28] = self.version;
        data[29] = self.min_version;
        data[30] = self.access.0;
        put_u16(data, 31, self.aux_type);
        data[33..37].copy_from_slice(&self.last_modified.to_bytes());
        put_u16(data, 37, self.header_pointer);
    }
}

/// Kind-specific trailing fields of a directory header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// Volume directory header
    Volume {
        /// First block of the volume bitmap
        bitmap_pointer: u16,
        /// Blocks on the volume
        total_blocks: u16,
    },
    /// Subdirectory header
    Subdirectory {
        /// Parent directory block holding the governing entry
        parent_pointer: u16,
        /// Slot number of the governing entry in that block (1-based slot
        /// numbering as ProDOS counts it, header included)
        parent_entry_number: u8,
        /// Entry length of the parent directory
        parent_entry_length: u8,
    },
}

/// Header of a directory key block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHeader {
    /// Name length nibble
    pub name_length: u8,
    /// Raw name bytes
    pub name: [u8; MAX_NAME_LENGTH],
    /// Reserved bytes
    pub reserved: [u8; 8],
    /// Creation time
    pub creation: Timestamp,
    /// Version of ProDOS that created the directory
    pub version: u8,
    /// Minimum ProDOS version able to access the directory
    pub min_version: u8,
    /// Access flags
    pub access: Access,
    /// Bytes per entry (0x27)
    pub entry_length: u8,
    /// Entries per block (0x0D)
    pub entries_per_block: u8,
    /// Active entries in the directory
    pub file_count: u16,
    /// Volume or subdirectory fields
    pub kind: HeaderKind,
}

impl DirectoryHeader {
    /// Header for a freshly formatted volume
    pub fn new_volume(name: &str, total_blocks: u16, bitmap_pointer: u16) -> Result<Self> {
        let (name_length, name) = name_bytes(name)?;
        Ok(Self {
            name_length,
            name,
            reserved: [0; 8],
            creation: Timestamp::now(),
            version: 0,
            min_version: 0,
            access: Access::standard(),
            entry_length: ENTRY_LENGTH as u8,
            entries_per_block: ENTRIES_PER_BLOCK as u8,
            file_count: 0,
            kind: HeaderKind::Volume {
                bitmap_pointer,
                total_blocks,
            },
        })
    }

    /// Header for a new subdirectory governed by `parent`
    pub fn new_subdirectory(name: &str, parent: EntryLocation) -> Result<Self> {
        let (name_length, name) = name_bytes(name)?;
        let mut reserved = [0u8; 8];
        reserved[0] = SUBDIR_HEADER_MARKER;
        Ok(Self {
            name_length,
            name,
            reserved,
            creation: Timestamp::now(),
            version: 0,
            min_version: 0,
            access: Access::standard(),
            entry_length: ENTRY_LENGTH as u8,
            entries_per_block: ENTRIES_PER_BLOCK as u8,
            file_count: 0,
            kind: HeaderKind::Subdirectory {
                parent_pointer: parent.block,
                parent_entry_number: (parent.slot + 1) as u8,
                parent_entry_length: ENTRY_LENGTH as u8,
            },
        })
    }

    /// Storage type implied by the header kind
    pub fn storage_type(&self) -> StorageType {
        match self.kind {
            HeaderKind::Volume { .. } => StorageType::VolumeHeader,
            HeaderKind::Subdirectory { .. } => StorageType::SubdirectoryHeader,
        }
    }

    /// Decoded name
    pub fn name(&self) -> String {
        decode_name(self.name_length, &self.name)
    }

    /// Replace the name, validating it
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let (length, bytes) = name_bytes(name)?;
        self.name_length = length;
        self.name = bytes;
        Ok(())
    }

    /// Location of the governing entry, for subdirectories
    pub fn parent_location(&self) -> Option<EntryLocation> {
        match self.kind {
            HeaderKind::Subdirectory {
                parent_pointer,
                parent_entry_number,
                ..
            } if parent_entry_number > 0 => Some(EntryLocation::new(
                parent_pointer,
                parent_entry_number as usize - 1,
            )),
            _ => None,
        }
    }

    fn decode(data: &EntryBytes) -> Self {
        let mut name = [0u8; MAX_NAME_LENGTH];
        name.copy_from_slice(&data[1..16]);
        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[16..24]);
        let kind = if data[0] >> 4 == 0xF {
            HeaderKind::Volume {
                bitmap_pointer: le_u16(data, 35),
                total_blocks: le_u16(data, 37),
            }
        } else {
            HeaderKind::Subdirectory {
                parent_pointer: le_u16(data, 35),
                parent_entry_number: data[37],
                parent_entry_length: data[38],
            }
        };
        Self {
            name_length: data[0] & 0x0F,
            name,
            reserved,
            creation: timestamp_at(data, 24),
            version: data[28],
            min_version: data[29],
            access: Access(data[30]),
            entry_length: data[31],
            entries_per_block: data[32],
            file_count: le_u16(data, 33),
            kind,
        }
    }

    fn encode(&self, data: &mut EntryBytes) {
        data[0] = (self.storage_type().nibble() << 4) | (self.name_length & 0x0F);
        data[1..16].copy_from_slice(&self.name);
        data[16..24].copy_from_slice(&self.reserved);
        data[24..28].copy_from_slice(&self.creation.to_bytes());
        data[28] = self.version;
        data[29] = self.min_version;
        data[30] = self.access.0;
        data[31] = self.entry_length;
        data[32] = self.entries_per_block;
        put_u16(data, 33, self.file_count);
        match self.kind {
            HeaderKind::Volume {
                bitmap_pointer,
                total_blocks,
            } => {
                put_u16(data, 35, bitmap_pointer);
                put_u16(data, 37, total_blocks);
            }
            HeaderKind::Subdirectory {
                parent_pointer,
                parent_entry_number,
                parent_entry_length,
            } => {
                put_u16(data, 35, parent_pointer);
                data[37] = parent_entry_number;
                data[38] = parent_entry_length;
            }
        }
    }
}

/// One decoded directory slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// All-zero slot
    Empty,
    /// Tombstone: storage type 0 with other bytes retained
    Deleted(FileEntry),
    /// Active file or subdirectory entry
    File(FileEntry),
    /// Volume or subdirectory header
    Header(DirectoryHeader),
}

impl Entry {
    /// Decode a 39-byte slot
    pub fn decode(data: &EntryBytes) -> Self {
        if data.iter().all(|&b| b == 0) {
            return Entry::Empty;
        }
        match data[0] >> 4 {
            0x0 => Entry::Deleted(FileEntry::decode(data)),
            0xE | 0xF => Entry::Header(DirectoryHeader::decode(data)),
            _ => Entry::File(FileEntry::decode(data)),
        }
    }

    /// Encode into a 39-byte slot
    pub fn encode(&self) -> EntryBytes {
        let mut data = [0u8; ENTRY_LENGTH];
        match self {
            Entry::Empty => {}
            Entry::Deleted(entry) | Entry::File(entry) => entry.encode(&mut data),
            Entry::Header(header) => header.encode(&mut data),
        }
        data
    }

    /// Whether a new entry may be placed in this slot
    pub fn is_available(&self) -> bool {
        matches!(self, Entry::Empty | Entry::Deleted(_))
    }

    /// Active file entry, if any
    pub fn file_entry(&self) -> Option<&FileEntry> {
        match self {
            Entry::File(entry) => Some(entry),
            _ => None,
        }
    }

    /// Name of a file, tombstone or header
    pub fn name(&self) -> Option<String> {
        match self {
            Entry::Empty => None,
            Entry::Deleted(entry) | Entry::File(entry) => Some(entry.name()),
            Entry::Header(header) => Some(header.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_file() -> EntryBytes {
        let mut data = [0u8; ENTRY_LENGTH];
        data[0] = 0x28; // sapling, 8 chars
        data[1..9].copy_from_slice(b"STARTUP.");
        data[16] = 0xFC;
        data[17] = 0x20;
        data[19] = 3;
        data[21..24].copy_from_slice(&[0x00, 0x04, 0x00]);
        data[30] = 0xE3;
        data[31..33].copy_from_slice(&0x0801u16.to_le_bytes());
        data[37] = 2;
        data
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(Entry::decode(&[0u8; ENTRY_LENGTH]), Entry::Empty);
        assert!(Entry::Empty.is_available());
    }

    #[test]
    fn test_decode_file() {
        let entry = Entry::decode(&sample_file());
        let file = entry.file_entry().unwrap();
        assert_eq!(file.storage_type, StorageType::Sapling);
        assert_eq!(file.name(), "STARTUP.");
        assert_eq!(file.file_type, 0xFC);
        assert_eq!(file.key_pointer, 0x20);
        assert_eq!(file.blocks_used, 3);
        assert_eq!(file.eof(), 1024);
        assert_eq!(file.aux_type, 0x0801);
        assert_eq!(file.header_pointer, 2);
        assert_eq!(entry.encode(), sample_file());
    }

    #[test]
    fn test_tombstone() {
        let mut data = sample_file();
        data[0] &= 0x0F;
        let entry = Entry::decode(&data);
        assert!(matches!(entry, Entry::Deleted(_)));
        assert!(entry.is_available());
        assert_eq!(entry.name().unwrap(), "STARTUP.");
        assert_eq!(entry.encode(), data);
    }

    #[test]
    fn test_volume_header_roundtrip() {
        let header = DirectoryHeader::new_volume("BLANK", 280, 6).unwrap();
        let bytes = Entry::Header(header.clone()).encode();
        assert_eq!(bytes[0], 0xF5);
        assert_eq!(bytes[31], 0x27);
        assert_eq!(bytes[32], 0x0D);
        assert_eq!(le_u16(&bytes, 35), 6);
        assert_eq!(le_u16(&bytes, 37), 280);
        assert_eq!(Entry::decode(&bytes), Entry::Header(header));
    }

    #[test]
    fn test_subdirectory_header() {
        let header = DirectoryHeader::new_subdirectory("GAMES", EntryLocation::new(2, 3)).unwrap();
        let bytes = Entry::Header(header.clone()).encode();
        assert_eq!(bytes[0], 0xE5);
        assert_eq!(bytes[16], SUBDIR_HEADER_MARKER);
        assert_eq!(bytes[37], 4);
        assert_eq!(bytes[38], 0x27);
        assert_eq!(header.parent_location(), Some(EntryLocation::new(2, 3)));
    }

    #[test]
    fn test_name_rules() {
        assert!(is_valid_name("A"));
        assert!(is_valid_name("basic.system"));
        assert!(is_valid_name("ABCDEFGHIJKLMNO"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1ST"));
        assert!(!is_valid_name("HAS SPACE"));
        assert!(!is_valid_name("ABCDEFGHIJKLMNOP"));
        assert_eq!(validate_name("hello").unwrap(), "HELLO");
        assert!(matches!(validate_name("a-b"), Err(DiskError::InvalidName(_))));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("my file.txt"), "MY.FILE.TXT");
        assert_eq!(sanitize_name("2nd try"), "ND.TRY");
        assert_eq!(sanitize_name("a very long file name here"), "A.VERY.LONG.FIL");
        assert_eq!(sanitize_name("123"), "UNTITLED");
        assert_eq!(sanitize_name("ÉCOLE"), "COLE");
    }

    proptest! {
        #[test]
        fn prop_decode_encode_is_lossless(
            bytes in proptest::collection::vec(any::<u8>(), ENTRY_LENGTH)
        ) {
            let mut data = [0u8; ENTRY_LENGTH];
            data.copy_from_slice(&bytes);
            prop_assert_eq!(Entry::decode(&data).encode(), data);
        }

        #[test]
        fn prop_sanitized_names_are_valid(name in ".{0,40}") {
            prop_assert!(is_valid_name(&sanitize_name(&name)));
        }
    }
}
