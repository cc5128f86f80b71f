/// Disk image layout constants

/// Canonical ProDOS block size
pub const BLOCK_SIZE: usize = 512;

/// Sector size of a DOS 3.3 formatted 5.25" disk
pub const SECTOR_SIZE: usize = 256;

/// Sectors per track on a 16-sector 5.25" disk
pub const SECTORS_PER_TRACK: usize = 16;

/// ProDOS blocks per 5.25" track
pub const BLOCKS_PER_TRACK: usize = SECTORS_PER_TRACK * SECTOR_SIZE / BLOCK_SIZE;

/// Tracks on a standard 5.25" disk
pub const TRACKS_525: usize = 35;

/// Blocks on a 140K 5.25" disk
pub const BLOCKS_525: usize = TRACKS_525 * BLOCKS_PER_TRACK;

/// Blocks on an 800K 3.5" disk
pub const BLOCKS_35: usize = 1600;

/// Largest ProDOS volume in blocks
pub const MAX_BLOCKS: usize = 65535;

/// Maps a ProDOS logical sector (half block) within a track to its position
/// in a DOS 3.3 ordered image.
pub const PRODOS_TO_DOS_SECTOR: [usize; SECTORS_PER_TRACK] =
    [0, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 15];

/// 2IMG container signature
pub const TWO_IMG_SIGNATURE: &[u8] = b"2IMG";

/// Minimum 2IMG header length
pub const TWO_IMG_HEADER_SIZE: usize = 64;

/// Offset of the header length field in a 2IMG header
pub const TWO_IMG_HEADER_LEN_OFFSET: usize = 0x08;

/// Offset of the image format field in a 2IMG header
pub const TWO_IMG_FORMAT_OFFSET: usize = 0x0C;

/// Offset of the ProDOS block count field in a 2IMG header
pub const TWO_IMG_BLOCKS_OFFSET: usize = 0x14;

/// Offset of the data offset field in a 2IMG header
pub const TWO_IMG_DATA_OFFSET_OFFSET: usize = 0x18;

/// Offset of the data length field in a 2IMG header
pub const TWO_IMG_DATA_LEN_OFFSET: usize = 0x1C;

/// Creator signature written into 2IMG headers by this library
pub const CREATOR_SIGNATURE: &[u8; 4] = b"A2DK";

/// Size of one directory entry slot
pub const ENTRY_LENGTH: usize = 0x27;

/// Directory entry slots per block (including the header slot in a key block)
pub const ENTRIES_PER_BLOCK: usize = 13;

/// Offset of the first entry slot in a directory block
pub const DIR_ENTRIES_OFFSET: usize = 4;

/// Key block of the volume directory
pub const VOLUME_DIR_BLOCK: u16 = 2;

/// Number of blocks in a freshly formatted volume directory
pub const VOLUME_DIR_BLOCKS: u16 = 4;

/// First bitmap block of a freshly formatted volume
pub const BITMAP_BLOCK: u16 = 6;

/// Blocks tracked by one bitmap block
pub const BLOCKS_PER_BITMAP_BLOCK: usize = BLOCK_SIZE * 8;

/// Block pointers held by one index block
pub const POINTERS_PER_INDEX_BLOCK: usize = BLOCK_SIZE / 2;

/// Marker byte ProDOS stores at the start of a subdirectory header's reserved area
pub const SUBDIR_HEADER_MARKER: u8 = 0x75;

/// Longest ProDOS file name
pub const MAX_NAME_LENGTH: usize = 15;

/// ProDOS file type for directories
pub const DIRECTORY_FILE_TYPE: u8 = 0x0F;

/// Convert a block count to the number of bitmap blocks that track it
#[inline]
pub fn bitmap_blocks_for(total_blocks: usize) -> usize {
    (total_blocks + BLOCKS_PER_BITMAP_BLOCK - 1) / BLOCKS_PER_BITMAP_BLOCK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_geometry() {
        assert_eq!(BLOCKS_PER_TRACK, 8);
        assert_eq!(BLOCKS_525, 280);
    }

    #[test]
    fn test_bitmap_blocks_for() {
        assert_eq!(bitmap_blocks_for(280), 1);
        assert_eq!(bitmap_blocks_for(4096), 1);
        assert_eq!(bitmap_blocks_for(4097), 2);
        assert_eq!(bitmap_blocks_for(MAX_BLOCKS), 16);
    }

    #[test]
    fn test_skew_table_is_permutation() {
        let mut seen = [false; SECTORS_PER_TRACK];
        for &s in PRODOS_TO_DOS_SECTOR.iter() {
            assert!(!seen[s]);
            seen[s] = true;
        }
    }
}
