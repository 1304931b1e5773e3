use bytes::Bytes;

use super::{check_range, ByteSource, SharedSource};
use crate::error::{Error, Result};

/// A bounded window `[offset, offset + size)` into another source.
#[derive(Debug, Clone)]
pub struct PartialSource {
    parent: SharedSource,
    offset: u64,
    size: u64,
}

impl PartialSource {
    pub fn new(parent: SharedSource, offset: u64, size: u64) -> Result<Self> {
        let parent_size = parent.size()?;
        match offset.checked_add(size) {
            Some(end) if end <= parent_size => Ok(Self {
                parent,
                offset,
                size,
            }),
            _ => Err(Error::InvalidData(format!(
                "cannot create partial source @0x{offset:x} for 0x{size:x} \
                 as parent only 0x{parent_size:x} bytes in size"
            ))),
        }
    }

    /// Window from `offset` to the end of `parent`.
    pub fn to_end(parent: SharedSource, offset: u64) -> Result<Self> {
        let parent_size = parent.size()?;
        let size = parent_size.checked_sub(offset).ok_or_else(|| {
            Error::InvalidData(format!(
                "offset 0x{offset:x} beyond parent size 0x{parent_size:x}"
            ))
        })?;
        Self::new(parent, offset, size)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl ByteSource for PartialSource {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        check_range(offset, len as u64, self.size)?;
        self.parent.read_at(self.offset + offset, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn parent() -> SharedSource {
        Arc::new(Bytes::from_static(b"abcdefghij"))
    }

    #[test]
    fn window_is_bounded() {
        let part = PartialSource::new(parent(), 2, 5).unwrap();
        assert_eq!(part.size().unwrap(), 5);
        assert_eq!(&part.read_all().unwrap()[..], b"cdefg");
        assert_eq!(&part.read_at(3, 2).unwrap()[..], b"fg");
        assert!(part.read_at(3, 3).is_err());
    }

    #[test]
    fn window_must_fit_parent() {
        assert!(PartialSource::new(parent(), 8, 3).is_err());
        let tail = PartialSource::to_end(parent(), 7).unwrap();
        assert_eq!(&tail.read_all().unwrap()[..], b"hij");
        assert!(PartialSource::to_end(parent(), 11).is_err());
    }

    #[test]
    fn nested_windows() {
        let outer: SharedSource = Arc::new(PartialSource::new(parent(), 1, 8).unwrap());
        let inner = PartialSource::new(outer, 2, 3).unwrap();
        assert_eq!(&inner.read_all().unwrap()[..], b"def");
    }
}
