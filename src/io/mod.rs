/// I/O operations for disk image files

/// Byte-addressed backing stores
pub mod backing;
/// Reader for existing image files
pub mod reader;
/// Writer for image copies
pub mod writer;

pub use backing::{Backing, FileBacking, MemoryBacking};
pub use reader::read_image;
pub use writer::write_image;
