use bytes::Bytes;

use super::types::{ExportFlags, EXPORT_DATA_PREVIEW_MAX};
use crate::common;
use crate::error::{Error, Result, ResultExt};
use crate::xml::XmlNode;

/// An addressed slice of a payload, as handed to a device for writing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    idx: u32,
    page: u32,
    address: u64,
    data: Bytes,
}

impl Chunk {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn with_idx(mut self, idx: u32) -> Self {
        self.idx = idx;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_address(mut self, address: u64) -> Self {
        self.address = address;
        self
    }

    pub fn idx(&self) -> u32 {
        self.idx
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Splits `data` into consecutive chunks of at most `max_len` bytes.
    pub fn split(data: &Bytes, address: u64, max_len: usize) -> Vec<Chunk> {
        if max_len == 0 {
            return vec![Chunk::new(data.clone()).with_address(address)];
        }
        (0..data.len())
            .step_by(max_len)
            .enumerate()
            .map(|(idx, offset)| {
                let end = (offset + max_len).min(data.len());
                Chunk::new(data.slice(offset..end))
                    .with_idx(idx as u32)
                    .with_address(address + offset as u64)
            })
            .collect()
    }

    pub(crate) fn build(node: &XmlNode, idx: u32) -> Result<Self> {
        let mut chunk = Chunk::default().with_idx(idx);
        if let Some(value) = node.query_text_as_uint("idx")? {
            chunk.idx = field_u32("idx", value)?;
        }
        if let Some(value) = node.query_text_as_uint("page")? {
            chunk.page = field_u32("page", value)?;
        }
        if let Some(addr) = node.query_text_as_uint("addr")? {
            chunk.address = addr;
        }
        if let Some(text) = node.query_text("data") {
            chunk.data = common::base64_decode(text).prefix_err(format!("chunk 0x{idx:x}: "))?;
        }
        Ok(chunk)
    }

    pub(crate) fn export(&self, flags: ExportFlags, node: &mut XmlNode) {
        node.insert_kx("idx", u64::from(self.idx));
        node.insert_kx("page", u64::from(self.page));
        node.insert_kx("addr", self.address);
        if self.data.is_empty() {
            return;
        }
        let text = if flags.contains(ExportFlags::ASCII_DATA) {
            common::ascii_preview(&self.data, EXPORT_DATA_PREVIEW_MAX)
        } else {
            common::base64_encode(&self.data)
        };
        node.insert_text("data", text)
            .set_attr("size", format!("0x{:x}", self.data.len()));
    }
}

/// Narrows a manifest or image field to the 32 bits a chunk stores.
pub(crate) fn field_u32(name: &str, value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::InvalidData(format!("chunk {name} 0x{value:x} too large")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_addresses_follow_offsets() {
        let data = Bytes::from_static(&[0u8; 10]);
        let chunks = Chunk::split(&data, 0x1000, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].address(), 0x1004);
        assert_eq!(chunks[2].idx(), 2);
        assert_eq!(chunks[2].len(), 2);
    }

    #[test]
    fn split_empty_and_unbounded() {
        assert!(Chunk::split(&Bytes::new(), 0, 4).is_empty());
        let whole = Chunk::split(&Bytes::from_static(b"abc"), 8, 0);
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].address(), 8);
    }

    #[test]
    fn export_then_build() {
        let chunk = Chunk::new(Bytes::from_static(b"\x01\x02\x03"))
            .with_idx(3)
            .with_page(1)
            .with_address(0x8000);
        let mut node = XmlNode::new("chunk");
        chunk.export(ExportFlags::empty(), &mut node);
        assert_eq!(Chunk::build(&node, 0).unwrap(), chunk);
    }

    #[test]
    fn build_rejects_wide_fields() {
        let mut node = XmlNode::new("chunk");
        node.insert_kx("idx", 0x1_0000_0000);
        let err = Chunk::build(&node, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        assert!(err.to_string().contains("idx"), "{err}");

        let mut node = XmlNode::new("chunk");
        node.insert_kx("page", u64::MAX);
        assert!(matches!(Chunk::build(&node, 0), Err(Error::InvalidData(_))));
    }
}
