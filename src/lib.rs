/*!
# a2disk

A Rust library for reading and writing Apple II disk images with ProDOS filesystem support.

## Features

- Block storage over ProDOS-order (`.po`, `.hdv`), DOS-order (`.do`, `.dsk`) and 2IMG images
- DOS 3.3 sector skew translation between ProDOS blocks and track/sector pairs
- Staged writes: modified blocks are buffered until committed
- ProDOS volumes: formatting, the volume bitmap, directory chains, subdirectories
- Seedling, sapling and tree files
- Idiomatic Rust API with comprehensive error handling

## Quick Start

```rust,no_run
use a2disk::{read_image, FileEntry, FileSystem, Volume};

// Open an existing image and mount its volume
let mut storage = read_image("disk.po")?;
storage.open_for_writing()?;
let mut volume = Volume::open(storage)?;

// List the volume directory
for entry in volume.read_dir()? {
    println!("{}: {} bytes", entry.name, entry.size);
}

// Add a file and write the staged blocks back
let mut root = volume.root()?;
let entry = FileEntry::new("HELLO", 0x04)?;
root.create_file_with_entry(&mut volume, entry, b"HELLO WORLD")?;
volume.commit()?;

// Read a file by path
let contents = FileSystem::read_file(&volume, "HELLO")?;
# Ok::<(), a2disk::DiskError>(())
```

## Image Layouts

- ProDOS order: block `n` lives at byte `n * 512` of the data area
- DOS order: each block is two 256-byte sectors placed through the DOS 3.3 skew table
- 2IMG: a 64-byte header followed by data in either order

## Modules

- `format`: Image formats, storage specifications and constants
- `image`: Block storage, address translation and staged writes
- `io`: Image file backings, loading and saving
- `filesystem`: ProDOS volumes, directories and files
- `error`: Error types and Result alias
*/

#![warn(missing_docs)]

/// Error types and Result alias
pub mod error;
/// ProDOS filesystem
pub mod filesystem;
/// Image formats, storage specifications and constants
pub mod format;
/// Block storage and address translation
pub mod image;
/// I/O operations for reading and writing image files
pub mod io;

// Re-export common types
pub use error::{DiskError, Result};
pub use filesystem::{
    blocks_for_length, is_valid_name, list_directory, sanitize_name, validate_name, Access,
    DirEntry, Directory, DirectoryHeader, DirectorySlot, DirectoryState, Entry, EntryLocation,
    FileEntry, FileSystem, FileSystemInfo, HeaderKind, StorageType, Timestamp, Volume,
    VolumeBitmap,
};
pub use format::{
    detect_format, AddressingMode, ImageFormat, StorageSpec, TwoImgHeader, BLOCKS_35,
    BLOCKS_525, BLOCK_SIZE, SECTOR_SIZE,
};
pub use image::{
    AddressTranslator, BlockMut, BlockStorage, BlockStorageBuilder, OpenMode, Placement,
    TrackSector,
};
pub use io::{read_image, write_image, Backing, FileBacking, MemoryBacking};
