//! Byte helpers shared by the firmware model and formats.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

/// Pads `data` with `fill` up to `size`; longer buffers are returned as-is.
pub fn pad(data: &Bytes, size: usize, fill: u8) -> Bytes {
    if data.len() >= size {
        return data.clone();
    }
    let mut buf = BytesMut::with_capacity(size);
    buf.extend_from_slice(data);
    buf.resize(size, fill);
    buf.freeze()
}

pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes base64, ignoring embedded whitespace from pretty-printed manifests.
pub fn base64_decode(text: &str) -> Result<Bytes> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map(Bytes::from)
        .map_err(|e| Error::InvalidData(format!("invalid base64 data: {e}")))
}

/// Printable rendering of at most `max` bytes, non-printables shown as `.`.
pub fn ascii_preview(data: &[u8], max: usize) -> String {
    data.iter()
        .take(max)
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                '.'
            }
        })
        .collect()
}

/// Copies `src` into `dst` at `offset`, refusing any write past the end.
pub fn overlay(dst: &mut [u8], offset: usize, src: &[u8]) -> Result<()> {
    let end = offset
        .checked_add(src.len())
        .filter(|end| *end <= dst.len())
        .ok_or_else(|| {
            Error::Internal(format!(
                "cannot write 0x{:x} bytes @0x{:x} as buffer only 0x{:x} bytes in size",
                src.len(),
                offset,
                dst.len()
            ))
        })?;
    dst[offset..end].copy_from_slice(src);
    Ok(())
}
