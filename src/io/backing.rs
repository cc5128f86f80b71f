/// Byte-addressed backing stores for block storage

use crate::error::{DiskError, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Byte-addressed device holding a complete image (header included)
///
/// Offsets are absolute within the image. Implementations never grow the
/// image; writes past the end fail.
pub trait Backing: std::fmt::Debug + Send {
    /// Total length in bytes
    fn len(&self) -> Result<u64>;

    /// Read exactly `buf.len()` bytes from `offset`
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all of `data` at `offset`
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Flush pending writes to stable storage
    fn flush(&mut self) -> Result<()>;

    /// Whether writes are accepted
    fn is_writable(&self) -> bool;
}

fn out_of_bounds(offset: u64, len: usize, total: u64) -> DiskError {
    DiskError::Io(std::io::Error::new(
        ErrorKind::UnexpectedEof,
        format!(
            "access of {} bytes at offset {} beyond image end {}",
            len, offset, total
        ),
    ))
}

/// File-backed image
#[derive(Debug)]
pub struct FileBacking {
    file: File,
    len: u64,
    writable: bool,
}

impl FileBacking {
    /// Open an existing image file
    pub fn open<P: AsRef<Path>>(path: P, writable: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::PermissionDenied if writable => {
                    DiskError::access(format!("{} is not writable: {}", path.display(), e))
                }
                _ => DiskError::Io(e),
            })?;
        if writable && file.metadata()?.permissions().readonly() {
            return Err(DiskError::access(format!(
                "{} is read-only",
                path.display()
            )));
        }
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            writable,
        })
    }

    /// Create a zero-filled image file of `len` bytes, replacing any existing file
    pub fn create<P: AsRef<Path>>(path: P, len: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len)?;
        Ok(Self {
            file,
            len,
            writable: true,
        })
    }
}

impl Backing for FileBacking {
    fn len(&self) -> Result<u64> {
        Ok(self.len)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if offset + buf.len() as u64 > self.len {
            return Err(out_of_bounds(offset, buf.len(), self.len));
        }
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(DiskError::access("image was opened read-only"));
        }
        if offset + data.len() as u64 > self.len {
            return Err(out_of_bounds(offset, data.len(), self.len));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

/// In-memory image
#[derive(Debug, Clone, Default)]
pub struct MemoryBacking {
    data: Vec<u8>,
}

impl MemoryBacking {
    /// Wrap existing image bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Zero-filled image of `len` bytes
    pub fn zeroed(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    /// Image bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume and return the image bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Backing for MemoryBacking {
    fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(out_of_bounds(offset, buf.len(), self.data.len() as u64));
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            return Err(out_of_bounds(offset, data.len(), self.data.len() as u64));
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_write() {
        let mut backing = MemoryBacking::zeroed(1024);
        backing.write_at(512, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 4];
        backing.read_at(511, &mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
    }

    #[test]
    fn test_memory_rejects_out_of_bounds() {
        let mut backing = MemoryBacking::zeroed(512);
        assert!(backing.write_at(510, &[0; 4]).is_err());
        let mut buf = [0u8; 1];
        assert!(backing.read_at(512, &mut buf).is_err());
    }

    #[test]
    fn test_file_backing_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.po");

        let mut backing = FileBacking::create(&path, 2048).unwrap();
        backing.write_at(1024, b"PRODOS").unwrap();
        backing.flush().unwrap();
        drop(backing);

        let mut backing = FileBacking::open(&path, false).unwrap();
        assert_eq!(backing.len().unwrap(), 2048);
        assert!(!backing.is_writable());
        let mut buf = [0u8; 6];
        backing.read_at(1024, &mut buf).unwrap();
        assert_eq!(&buf, b"PRODOS");
        assert!(matches!(
            backing.write_at(0, &[1]),
            Err(DiskError::Access(_))
        ));
    }
}
