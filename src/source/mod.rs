//! Random-access byte sources that firmware is parsed from.
//!
//! A [`ByteSource`] knows its total size and can hand out any in-range slice.
//! Sources are shared as [`SharedSource`] so that a parsed image can keep a
//! bounded view of its input without copying it.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};

mod partial;

pub use partial::PartialSource;

pub type SharedSource = Arc<dyn ByteSource>;

pub trait ByteSource: Send + Sync + fmt::Debug {
    /// Total number of bytes available.
    fn size(&self) -> Result<u64>;

    /// Reads exactly `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes>;

    fn read_all(&self) -> Result<Bytes> {
        let size = self.size()?;
        self.read_at(0, to_usize(size)?)
    }

    fn read_u8(&self, offset: u64) -> Result<u8> {
        Ok(self.read_at(offset, 1)?.get_u8())
    }

    fn read_u16_le(&self, offset: u64) -> Result<u16> {
        Ok(self.read_at(offset, 2)?.get_u16_le())
    }

    fn read_u32_le(&self, offset: u64) -> Result<u32> {
        Ok(self.read_at(offset, 4)?.get_u32_le())
    }
}

pub(crate) fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::Internal(format!("0x{value:x} does not fit in memory")))
}

pub(crate) fn check_range(offset: u64, len: u64, size: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::InvalidData(format!(
            "cannot read 0x{len:x} bytes @0x{offset:x} as source only 0x{size:x} bytes in size"
        ))),
    }
}

impl ByteSource for Bytes {
    fn size(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        check_range(offset, len as u64, self.len() as u64)?;
        let start = to_usize(offset)?;
        Ok(self.slice(start..start + len))
    }

    fn read_all(&self) -> Result<Bytes> {
        Ok(self.clone())
    }
}

/// A source backed by an open file, read on demand.
pub struct FileSource {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        log::debug!("opened {} of size 0x{:x}", path.display(), size);
        Ok(Self {
            path,
            file: Mutex::new(file),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish()
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        check_range(offset, len as u64, self.size)?;
        let mut file = self
            .file
            .lock()
            .map_err(|e| Error::Internal(format!("file lock poisoned: {e}")))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn bytes_read_at_bounds() {
        let src = Bytes::from_static(b"0123456789");
        assert_eq!(src.size().unwrap(), 10);
        assert_eq!(&src.read_at(2, 3).unwrap()[..], b"234");
        assert_eq!(&src.read_at(10, 0).unwrap()[..], b"");
        assert!(matches!(src.read_at(8, 3), Err(Error::InvalidData(_))));
        assert!(matches!(src.read_at(u64::MAX, 2), Err(Error::InvalidData(_))));
    }

    #[test]
    fn integer_helpers_are_little_endian() {
        let src = Bytes::from_static(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(src.read_u8(4).unwrap(), 0x05);
        assert_eq!(src.read_u16_le(0).unwrap(), 0x0201);
        assert_eq!(src.read_u32_le(1).unwrap(), 0x0504_0302);
    }

    #[test]
    fn file_source_reads_ranges() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello firmware").unwrap();
        let src = FileSource::open(tmp.path()).unwrap();
        assert_eq!(src.size().unwrap(), 14);
        assert_eq!(&src.read_at(6, 8).unwrap()[..], b"firmware");
        assert_eq!(&src.read_all().unwrap()[..], b"hello firmware");
        assert!(src.read_at(10, 8).is_err());
    }
}
