/// Disk image writer

use crate::error::Result;
use crate::image::BlockStorage;
use log::info;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Write a complete copy of an open image, header and uncommitted blocks included
///
/// The source storage is not changed; its dirty blocks stay dirty.
pub fn write_image<P: AsRef<Path>>(storage: &BlockStorage, path: P) -> Result<()> {
    let path = path.as_ref();
    let image = storage.physical_image()?;
    let mut file = File::create(path)?;
    file.write_all(&image)?;
    file.sync_all()?;
    info!("saved {} bytes to {}", image.len(), path.display());
    Ok(())
}
