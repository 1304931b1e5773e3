use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::{Bytes, BytesMut};
use glob::Pattern;
use log::debug;

use super::chunk::{self, Chunk};
use super::format::FirmwareFormat;
use super::payload::Payload;
use super::types::{FirmwareFlags, VersionFormat, ALIGNMENT_MAX, IMAGE_DEPTH_MAX};
use super::Firmware;
use crate::checksum::ChecksumKind;
use crate::common;
use crate::error::{Error, Result, ResultExt};
use crate::source::{to_usize, SharedSource};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identity of one image, stable for the lifetime of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FirmwareHandle(u64);

#[derive(Debug)]
struct Token(FirmwareHandle);

/// Byte overlay applied by [`FirmwareBase::bytes_with_patches`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    offset: usize,
    blob: Bytes,
}

impl Patch {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn blob(&self) -> &Bytes {
        &self.blob
    }
}

/// State shared by every firmware image regardless of its format.
///
/// Format hooks receive this directly; users normally reach it through
/// [`Firmware`], which dereferences to it.
#[derive(Debug)]
pub struct FirmwareBase {
    token: Arc<Token>,
    parent: Option<Weak<Token>>,
    pub(super) flags: FirmwareFlags,
    pub(super) id: Option<String>,
    pub(super) idx: u64,
    pub(super) version: Option<String>,
    pub(super) version_raw: u64,
    pub(super) version_format: VersionFormat,
    pub(super) filename: Option<String>,
    pub(super) addr: u64,
    pub(super) offset: u64,
    pub(super) size: u64,
    pub(super) size_max: u64,
    pub(super) alignment: u8,
    pub(super) images_max: usize,
    pub(super) depth: u32,
    pub(super) images: Vec<Firmware>,
    pub(super) chunks: Option<Vec<Chunk>>,
    pub(super) patches: Vec<Patch>,
    pub(super) payload: Payload,
}

impl Default for FirmwareBase {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareBase {
    pub fn new() -> Self {
        let handle = FirmwareHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed));
        Self {
            token: Arc::new(Token(handle)),
            parent: None,
            flags: FirmwareFlags::empty(),
            id: None,
            idx: 0,
            version: None,
            version_raw: 0,
            version_format: VersionFormat::Unknown,
            filename: None,
            addr: 0,
            offset: 0,
            size: 0,
            size_max: 0,
            alignment: 0,
            images_max: 0,
            depth: 0,
            images: Vec::new(),
            chunks: None,
            patches: Vec::new(),
            payload: Payload::Unset,
        }
    }

    pub fn handle(&self) -> FirmwareHandle {
        self.token.0
    }

    /// Handle of the image that currently owns this one, if it is still alive.
    pub fn parent(&self) -> Option<FirmwareHandle> {
        self.parent.as_ref()?.upgrade().map(|token| token.0)
    }

    pub fn flags(&self) -> FirmwareFlags {
        self.flags
    }

    pub fn add_flag(&mut self, flag: FirmwareFlags) {
        self.flags |= flag;
    }

    pub fn remove_flag(&mut self, flag: FirmwareFlags) {
        self.flags.remove(flag);
    }

    pub fn has_flag(&self, flag: FirmwareFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn unset_id(&mut self) {
        self.id = None;
    }

    pub fn idx(&self) -> u64 {
        self.idx
    }

    pub fn set_idx(&mut self, idx: u64) {
        self.idx = idx;
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }

    pub fn version_raw(&self) -> u64 {
        self.version_raw
    }

    pub fn version_format(&self) -> VersionFormat {
        self.version_format
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = Some(filename.into());
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn set_addr(&mut self, addr: u64) {
        self.addr = addr;
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Explicit size, else the stream length, else the buffer length, else 0.
    pub fn size(&self) -> u64 {
        if self.size != 0 {
            return self.size;
        }
        if let Some(size) = self.payload.stream_size().filter(|size| *size != 0) {
            return size;
        }
        self.payload
            .cached_bytes()
            .map_or(0, |bytes| bytes.len() as u64)
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn size_max(&self) -> u64 {
        self.size_max
    }

    /// Largest source accepted by the parse pipeline, 0 for no limit.
    pub fn set_size_max(&mut self, size_max: u64) {
        self.size_max = size_max;
    }

    pub fn alignment(&self) -> u8 {
        self.alignment
    }

    /// Sets the alignment as a power-of-two bit position.
    pub fn set_alignment(&mut self, alignment: u8) -> Result<()> {
        if alignment > ALIGNMENT_MAX {
            return Err(Error::InvalidData(format!(
                "0x{alignment:x} invalid, maximum is 0x{ALIGNMENT_MAX:x}"
            )));
        }
        self.alignment = alignment;
        Ok(())
    }

    pub fn images_max(&self) -> usize {
        self.images_max
    }

    /// Maximum number of child images, 0 for no limit.
    pub fn set_images_max(&mut self, images_max: usize) {
        self.images_max = images_max;
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn bytes(&self) -> Result<Bytes> {
        self.payload.bytes()
    }

    pub fn set_bytes(&mut self, bytes: Bytes) {
        self.payload.set_bytes(bytes);
    }

    pub fn stream(&self) -> Result<SharedSource> {
        self.payload.stream()
    }

    pub fn set_stream(&mut self, source: SharedSource) -> Result<()> {
        self.payload.set_stream(source)
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Adds an overlay, replacing an earlier patch with the same offset and length.
    pub fn add_patch(&mut self, offset: usize, blob: Bytes) {
        if let Some(patch) = self
            .patches
            .iter_mut()
            .find(|p| p.offset == offset && p.blob.len() == blob.len())
        {
            patch.blob = blob;
            return;
        }
        self.patches.push(Patch { offset, blob });
    }

    /// The cached buffer with every patch applied in insertion order.
    ///
    /// Streams are never patched in place, so a stream payload is returned as read.
    pub fn bytes_with_patches(&self) -> Result<Bytes> {
        let Some(bytes) = self.payload.cached_bytes() else {
            return self.payload.bytes();
        };
        if self.patches.is_empty() {
            return Ok(bytes.clone());
        }
        let mut buf = BytesMut::from(&bytes[..]);
        for patch in &self.patches {
            common::overlay(&mut buf, patch.offset, &patch.blob)
                .prefix_err(format!("failed to apply patch @0x{:x}: ", patch.offset))?;
        }
        Ok(buf.freeze())
    }

    /// Explicit chunks, else a single chunk spanning the buffer.
    pub fn chunks(&self) -> Result<Vec<Chunk>> {
        if let Some(chunks) = &self.chunks {
            return Ok(chunks.clone());
        }
        if let Some(bytes) = self.payload.cached_bytes() {
            let chunk = Chunk::new(bytes.clone())
                .with_idx(chunk::field_u32("idx", self.idx)?)
                .with_address(self.addr);
            return Ok(vec![chunk]);
        }
        Err(Error::NotFound("no bytes or chunks found in firmware".into()))
    }

    pub fn add_chunk(&mut self, chunk: Chunk) {
        self.chunks.get_or_insert_with(Vec::new).push(chunk);
    }

    /// The patched payload split into chunks of at most `max_len` bytes from `addr`.
    pub fn chunks_sized(&self, max_len: usize) -> Result<Vec<Chunk>> {
        let bytes = self.bytes_with_patches()?;
        Ok(Chunk::split(&bytes, self.addr, max_len))
    }

    /// Returns up to `max_len` bytes of the payload starting at device `address`.
    pub fn write_chunk(&self, address: u64, max_len: usize) -> Result<Bytes> {
        if address < self.addr {
            return Err(Error::Internal(format!(
                "requested address 0x{address:x} less than base address 0x{:x}",
                self.addr
            )));
        }
        let bytes = self.payload.bytes()?;
        let offset = to_usize(address - self.addr)?;
        if offset > bytes.len() {
            return Err(Error::NotFound(format!(
                "offset 0x{offset:x} larger than data size 0x{:x}",
                bytes.len()
            )));
        }
        let len = max_len.min(bytes.len() - offset);
        Ok(bytes.slice(offset..offset + len))
    }

    pub fn images(&self) -> &[Firmware] {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut [Firmware] {
        &mut self.images
    }

    /// Height of the subtree below this image, 0 for a leaf.
    fn subtree_height(&self) -> u32 {
        self.images
            .iter()
            .map(|img| img.subtree_height() + 1)
            .max()
            .unwrap_or(0)
    }

    fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
        for img in &mut self.images {
            img.base.set_depth(depth + 1);
        }
    }

    pub(super) fn check_child_depth(&self, height: u32) -> Result<()> {
        if self.depth >= IMAGE_DEPTH_MAX || self.depth + 1 + height > IMAGE_DEPTH_MAX {
            return Err(Error::InvalidData(format!(
                "images are nested too deep, limit is {IMAGE_DEPTH_MAX}"
            )));
        }
        Ok(())
    }

    /// Attaches `img` as the last child, applying the dedupe and count limits.
    pub fn add_image(&mut self, mut img: Firmware) -> Result<()> {
        self.check_child_depth(img.subtree_height())?;

        if self.has_flag(FirmwareFlags::DEDUPE_ID) {
            if let Some(pos) = self.images.iter().position(|i| i.id() == img.id()) {
                let old = self.images.remove(pos);
                debug!("replacing image with id {:?}", old.id());
            }
        }
        if self.has_flag(FirmwareFlags::DEDUPE_IDX) {
            if let Some(pos) = self.images.iter().position(|i| i.idx() == img.idx()) {
                let old = self.images.remove(pos);
                debug!("replacing image with idx 0x{:x}", old.idx());
            }
        }
        if self.images_max > 0 && self.images.len() >= self.images_max {
            return Err(Error::InvalidData(format!(
                "too many images, limit is {}",
                self.images_max
            )));
        }

        img.base.parent = Some(Arc::downgrade(&self.token));
        img.base.set_depth(self.depth + 1);
        self.images.push(img);
        Ok(())
    }

    fn position_by_id(&self, id: Option<&str>) -> Result<usize> {
        let found = match id {
            None => self.images.iter().position(|img| img.id().is_none()),
            Some(pattern) => {
                let alts = pattern
                    .split('|')
                    .map(id_pattern)
                    .collect::<Result<Vec<_>>>()?;
                self.images.iter().position(|img| {
                    img.id()
                        .is_some_and(|id| alts.iter().any(|alt| alt.matches(id)))
                })
            }
        };
        found.ok_or_else(|| match id {
            Some(id) => Error::NotFound(format!("no image id {id} found in firmware")),
            None => Error::NotFound("no NULL image id found in firmware".into()),
        })
    }

    fn position_by_idx(&self, idx: u64) -> Result<usize> {
        self.images
            .iter()
            .position(|img| img.idx() == idx)
            .ok_or_else(|| Error::NotFound(format!("no image idx {idx} found in firmware")))
    }

    /// First child whose id glob-matches `id`, which may list alternatives
    /// separated by `|`; `None` selects the first child without an id.
    pub fn image_by_id(&self, id: Option<&str>) -> Result<&Firmware> {
        let pos = self.position_by_id(id)?;
        Ok(&self.images[pos])
    }

    pub fn image_by_id_mut(&mut self, id: Option<&str>) -> Result<&mut Firmware> {
        let pos = self.position_by_id(id)?;
        Ok(&mut self.images[pos])
    }

    pub fn image_by_id_bytes(&self, id: Option<&str>) -> Result<Bytes> {
        self.image_by_id(id)?.write()
    }

    pub fn image_by_id_stream(&self, id: Option<&str>) -> Result<SharedSource> {
        self.image_by_id(id)?.stream()
    }

    pub fn image_by_idx(&self, idx: u64) -> Result<&Firmware> {
        let pos = self.position_by_idx(idx)?;
        Ok(&self.images[pos])
    }

    pub fn image_by_idx_mut(&mut self, idx: u64) -> Result<&mut Firmware> {
        let pos = self.position_by_idx(idx)?;
        Ok(&mut self.images[pos])
    }

    pub fn image_by_idx_bytes(&self, idx: u64) -> Result<Bytes> {
        self.image_by_idx(idx)?.write()
    }

    pub fn image_by_idx_stream(&self, idx: u64) -> Result<SharedSource> {
        self.image_by_idx(idx)?.stream()
    }

    /// First child whose checksum equals `checksum`, the kind guessed from its length.
    pub fn image_by_checksum(&self, checksum: &str) -> Result<&Firmware> {
        let kind = ChecksumKind::guess(checksum);
        for img in &self.images {
            if img.checksum(kind)? == checksum {
                return Ok(img);
            }
        }
        Err(Error::NotFound(format!(
            "no image with checksum {checksum} found in firmware"
        )))
    }

    pub fn image_by_type<T: FirmwareFormat>(&self) -> Result<&Firmware> {
        self.images
            .iter()
            .find(|img| img.format::<T>().is_some())
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no image of type {} found in firmware",
                    std::any::type_name::<T>()
                ))
            })
    }

    pub fn image_by_type_mut<T: FirmwareFormat>(&mut self) -> Result<&mut Firmware> {
        self.images
            .iter_mut()
            .find(|img| img.format::<T>().is_some())
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no image of type {} found in firmware",
                    std::any::type_name::<T>()
                ))
            })
    }

    pub fn image_by_type_name(&self, type_name: &str) -> Result<&Firmware> {
        self.images
            .iter()
            .find(|img| img.type_name() == type_name)
            .ok_or_else(|| {
                Error::NotFound(format!("no image of type {type_name} found in firmware"))
            })
    }

    fn detach(&mut self, pos: usize) -> Firmware {
        let mut img = self.images.remove(pos);
        img.base.parent = None;
        img.base.set_depth(0);
        img
    }

    /// Detaches the child with `handle` and returns it as a new root.
    pub fn remove_image(&mut self, handle: FirmwareHandle) -> Result<Firmware> {
        let pos = self
            .images
            .iter()
            .position(|img| img.handle() == handle)
            .ok_or_else(|| Error::NotFound("image not found in firmware".into()))?;
        Ok(self.detach(pos))
    }

    pub fn remove_image_by_id(&mut self, id: Option<&str>) -> Result<Firmware> {
        let pos = self.position_by_id(id)?;
        Ok(self.detach(pos))
    }

    pub fn remove_image_by_idx(&mut self, idx: u64) -> Result<Firmware> {
        let pos = self.position_by_idx(idx)?;
        Ok(self.detach(pos))
    }
}

/// Compiles one id alternative where only `*` and `?` are wildcards.
fn id_pattern(alt: &str) -> Result<Pattern> {
    let mut escaped = String::with_capacity(alt.len());
    for c in alt.chars() {
        match c {
            '[' => escaped.push_str("[[]"),
            ']' => escaped.push_str("[]]"),
            // glob only accepts `**` as a whole path component
            '*' if escaped.ends_with('*') => {}
            c => escaped.push(c),
        }
    }
    Pattern::new(&escaped)
        .map_err(|e| Error::InvalidData(format!("invalid id pattern {alt}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: Option<&str>, idx: u64) -> Firmware {
        let mut img = Firmware::new();
        if let Some(id) = id {
            img.set_id(id);
        }
        img.set_idx(idx);
        img
    }

    fn id_matches(pattern: &str, id: &str) -> bool {
        id_pattern(pattern).unwrap().matches(id)
    }

    #[test]
    fn id_patterns() {
        assert!(id_matches("*", ""));
        assert!(id_matches("ec*", "ec-main"));
        assert!(id_matches("e?-*n", "ec-main"));
        assert!(id_matches("*main", "ec-main"));
        assert!(!id_matches("ec", "ec-main"));
        assert!(!id_matches("?", ""));
        assert!(id_matches("a*b*c", "aXbYbc"));
        assert!(id_matches("a**", "a/b"));
        assert!(id_matches("[ab]", "[ab]"));
        assert!(!id_matches("[ab]", "a"));
        assert!(id_matches("x]*", "x]y"));
    }

    #[test]
    fn size_resolution_order() {
        let mut base = FirmwareBase::new();
        assert_eq!(base.size(), 0);
        base.set_bytes(Bytes::from_static(&[0; 5]));
        assert_eq!(base.size(), 5);
        base.set_stream(Arc::new(Bytes::from_static(&[0; 7]))).unwrap();
        assert_eq!(base.size(), 7);
        base.set_size(3);
        assert_eq!(base.size(), 3);
    }

    #[test]
    fn alignment_limit() {
        let mut base = FirmwareBase::new();
        base.set_alignment(31).unwrap();
        assert!(matches!(base.set_alignment(32), Err(Error::InvalidData(_))));
        assert_eq!(base.alignment(), 31);
    }

    #[test]
    fn patches_replace_same_range() {
        let mut base = FirmwareBase::new();
        base.add_patch(4, Bytes::from_static(b"XXX"));
        base.add_patch(4, Bytes::from_static(b"YYY"));
        assert_eq!(base.patches().len(), 1);
        assert_eq!(&base.patches()[0].blob()[..], b"YYY");
        base.add_patch(4, Bytes::from_static(b"ZZZZ"));
        assert_eq!(base.patches().len(), 2);
    }

    #[test]
    fn patch_out_of_range_is_internal() {
        let mut base = FirmwareBase::new();
        base.set_bytes(Bytes::from_static(&[0; 4]));
        base.add_patch(3, Bytes::from_static(&[1, 1]));
        let err = base.bytes_with_patches().unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(err.to_string().starts_with("failed to apply patch @0x3: "));
    }

    #[test]
    fn stream_payload_ignores_patches() {
        let mut base = FirmwareBase::new();
        base.set_stream(Arc::new(Bytes::from_static(b"abcd"))).unwrap();
        base.add_patch(0, Bytes::from_static(b"Z"));
        assert_eq!(&base.bytes_with_patches().unwrap()[..], b"abcd");
    }

    #[test]
    fn chunks_fallbacks() {
        let mut base = FirmwareBase::new();
        assert!(matches!(base.chunks(), Err(Error::NotFound(_))));
        base.set_bytes(Bytes::from_static(b"abcdef"));
        base.set_addr(0x100);
        base.set_idx(2);
        let chunks = base.chunks().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].address(), 0x100);
        assert_eq!(chunks[0].idx(), 2);

        base.add_chunk(Chunk::new(Bytes::from_static(b"zz")));
        assert_eq!(base.chunks().unwrap().len(), 1);
        assert_eq!(&base.chunks().unwrap()[0].data()[..], b"zz");

        let sized = base.chunks_sized(4).unwrap();
        assert_eq!(sized.len(), 2);
        assert_eq!(sized[1].address(), 0x104);
    }

    #[test]
    fn write_chunk_bounds() {
        let mut base = FirmwareBase::new();
        base.set_bytes(Bytes::from_static(b"0123456789"));
        base.set_addr(0x10);
        assert_eq!(base.write_chunk(0x10, 1000).unwrap().len(), 10);
        assert_eq!(&base.write_chunk(0x18, 1000).unwrap()[..], b"89");
        assert_eq!(&base.write_chunk(0x12, 3).unwrap()[..], b"234");
        assert!(base.write_chunk(0x1a, 4).unwrap().is_empty());
        assert!(matches!(base.write_chunk(0xf, 1000), Err(Error::Internal(_))));
        assert!(matches!(base.write_chunk(0x1b, 1), Err(Error::NotFound(_))));
    }

    #[test]
    fn write_chunk_checks_address_before_payload() {
        let mut base = FirmwareBase::new();
        base.set_addr(0x10);
        assert!(matches!(base.write_chunk(0xf, 4), Err(Error::Internal(_))));
        assert!(matches!(base.write_chunk(0x10, 4), Err(Error::NotFound(_))));
    }

    #[test]
    fn implicit_chunk_rejects_wide_idx() {
        let mut base = FirmwareBase::new();
        base.set_bytes(Bytes::from_static(b"abc"));
        base.set_idx(u64::from(u32::MAX) + 1);
        assert!(matches!(base.chunks(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn lookup_by_id_and_idx() {
        let mut base = FirmwareBase::new();
        base.add_image(image(Some("primary"), 1)).unwrap();
        base.add_image(image(None, 2)).unwrap();
        base.add_image(image(Some("backup"), 3)).unwrap();

        assert_eq!(base.image_by_id(None).unwrap().idx(), 2);
        assert_eq!(base.image_by_id(Some("back*|prim*")).unwrap().idx(), 1);
        assert_eq!(base.image_by_id(Some("nope|back?p")).unwrap().idx(), 3);
        assert!(matches!(base.image_by_id(Some("nope")), Err(Error::NotFound(_))));
        assert_eq!(base.image_by_idx(3).unwrap().id(), Some("backup"));
        assert!(base.image_by_idx(9).is_err());

        base.image_by_idx_mut(2).unwrap().set_id("middle");
        assert!(base.image_by_id(None).is_err());
    }

    #[test]
    fn missing_null_id_is_not_found() {
        let mut base = FirmwareBase::new();
        base.add_image(image(Some("a"), 0)).unwrap();
        assert!(matches!(base.image_by_id(None), Err(Error::NotFound(_))));
    }

    #[test]
    fn dedupe_removes_per_flag() {
        let mut base = FirmwareBase::new();
        base.add_flag(FirmwareFlags::DEDUPE_ID | FirmwareFlags::DEDUPE_IDX);
        base.add_image(image(Some("a"), 1)).unwrap();
        base.add_image(image(Some("b"), 2)).unwrap();
        base.add_image(image(Some("a"), 2)).unwrap();
        assert_eq!(base.images().len(), 1);
        assert_eq!(base.images()[0].id(), Some("a"));
        assert_eq!(base.images()[0].idx(), 2);
    }

    #[test]
    fn images_max_enforced() {
        let mut base = FirmwareBase::new();
        base.set_images_max(1);
        base.add_image(image(None, 0)).unwrap();
        assert!(matches!(base.add_image(image(None, 1)), Err(Error::InvalidData(_))));
    }

    #[test]
    fn parent_link_and_removal() {
        let mut root = FirmwareBase::new();
        let mut child = image(Some("child"), 0);
        child.add_image(image(Some("grandchild"), 0)).unwrap();
        let handle = child.handle();
        root.add_image(child).unwrap();

        let child = root.image_by_id(Some("child")).unwrap();
        assert_eq!(child.parent(), Some(root.handle()));
        assert_eq!(child.depth(), 1);
        assert_eq!(child.images()[0].depth(), 2);
        assert_eq!(child.images()[0].parent(), Some(handle));

        let removed = root.remove_image(handle).unwrap();
        assert_eq!(removed.parent(), None);
        assert_eq!(removed.depth(), 0);
        assert_eq!(removed.images()[0].depth(), 1);
        assert!(root.images().is_empty());
        assert!(root.remove_image(handle).is_err());
    }

    #[test]
    fn parent_link_invalidated_when_parent_dropped() {
        let mut root = FirmwareBase::new();
        root.add_image(image(Some("child"), 0)).unwrap();
        let images = std::mem::take(&mut root.images);
        assert!(images[0].parent().is_some());
        drop(root);
        assert!(images[0].parent().is_none());
    }

    #[test]
    fn depth_limit() {
        let mut base = FirmwareBase::new();
        base.depth = IMAGE_DEPTH_MAX - 1;
        base.add_image(image(None, 0)).unwrap();
        assert_eq!(base.images()[0].depth(), IMAGE_DEPTH_MAX);

        let mut deep = image(None, 0);
        deep.add_image(image(None, 1)).unwrap();
        let mut base = FirmwareBase::new();
        base.depth = IMAGE_DEPTH_MAX - 1;
        assert!(matches!(base.add_image(deep), Err(Error::InvalidData(_))));

        let mut base = FirmwareBase::new();
        base.depth = IMAGE_DEPTH_MAX;
        assert!(matches!(base.add_image(image(None, 0)), Err(Error::InvalidData(_))));
    }
}
