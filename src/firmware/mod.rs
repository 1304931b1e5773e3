//! The firmware object model.
//!
//! A [`Firmware`] is one image: common state in a [`FirmwareBase`] plus a
//! boxed [`FirmwareFormat`] providing the format-specific hooks. Images own
//! their children, forming a tree that can be parsed from a byte source,
//! patched, chunked, checksummed, and round-tripped through an XML manifest.

mod base;
mod chunk;
mod config;
mod format;
mod manifest;
mod payload;
mod registry;
mod types;

use std::fmt;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info};

pub use base::{FirmwareBase, FirmwareHandle, Patch};
pub use chunk::Chunk;
pub use config::ParseConfig;
pub use format::{AsAny, FirmwareFormat, Hooks, RawFirmware};
pub use payload::Payload;
pub use registry::{construct, lookup_format, register_format, registered_formats, FormatConstructor};
pub use types::*;

use crate::checksum::{self, ChecksumKind};
use crate::error::{Error, Result, ResultExt};
use crate::source::{to_usize, ByteSource, FileSource, PartialSource, SharedSource};

/// A firmware image of some format.
pub struct Firmware {
    base: FirmwareBase,
    format: Box<dyn FirmwareFormat>,
}

impl Default for Firmware {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Firmware {
    type Target = FirmwareBase;

    fn deref(&self) -> &FirmwareBase {
        &self.base
    }
}

impl DerefMut for Firmware {
    fn deref_mut(&mut self) -> &mut FirmwareBase {
        &mut self.base
    }
}

impl fmt::Debug for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Firmware")
            .field("format", &self.format)
            .field("base", &self.base)
            .finish()
    }
}

impl Firmware {
    /// An empty raw firmware.
    pub fn new() -> Self {
        Self::with_format(RawFirmware)
    }

    /// A raw firmware holding `bytes` as its payload.
    pub fn from_bytes(bytes: Bytes) -> Self {
        let mut firmware = Self::new();
        firmware.set_bytes(bytes);
        firmware
    }

    pub fn with_format(format: impl FirmwareFormat) -> Self {
        Self::from_boxed(Box::new(format))
    }

    pub fn from_boxed(mut format: Box<dyn FirmwareFormat>) -> Self {
        let mut base = FirmwareBase::new();
        format.init(&mut base);
        Self { base, format }
    }

    /// Creates an empty image of a registered format.
    pub fn from_type_name(type_name: &str) -> Result<Self> {
        let ctor = lookup_format(type_name)?;
        Ok(Self::from_boxed(ctor()))
    }

    pub fn type_name(&self) -> &'static str {
        self.format.type_name()
    }

    pub fn base(&self) -> &FirmwareBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut FirmwareBase {
        &mut self.base
    }

    /// The format object, if it is a `T`.
    pub fn format<T: FirmwareFormat>(&self) -> Option<&T> {
        AsAny::as_any(&*self.format).downcast_ref::<T>()
    }

    pub fn format_mut<T: FirmwareFormat>(&mut self) -> Option<&mut T> {
        AsAny::as_any_mut(&mut *self.format).downcast_mut::<T>()
    }

    /// Sets the raw version, deriving the version string when the format can.
    pub fn set_version_raw(&mut self, version_raw: u64) {
        self.base.version_raw = version_raw;
        if let Some(version) = self.format.convert_version(&self.base, version_raw) {
            self.base.version = Some(version);
        }
    }

    /// Sets the version format, re-deriving the version string from the raw version.
    pub fn set_version_format(&mut self, version_format: VersionFormat) {
        if self.base.version_format == version_format {
            return;
        }
        self.base.version_format = version_format;
        if self.base.version_raw == 0 {
            return;
        }
        if let Some(version) = self.format.convert_version(&self.base, self.base.version_raw) {
            self.base.version = Some(version);
        }
    }

    pub fn parse_stream(
        &mut self,
        source: &SharedSource,
        offset: u64,
        flags: ParseFlags,
    ) -> Result<()> {
        let config = ParseConfig::new().with_offset(offset).with_flags(flags);
        self.parse_with_config(source, &config)
    }

    pub fn parse_bytes(&mut self, bytes: Bytes, offset: u64, flags: ParseFlags) -> Result<()> {
        let source: SharedSource = Arc::new(bytes);
        self.parse_stream(&source, offset, flags)
    }

    pub fn parse_file(&mut self, path: impl AsRef<Path>, flags: ParseFlags) -> Result<()> {
        let path = path.as_ref();
        let source: SharedSource = Arc::new(FileSource::open(path)?);
        self.set_filename(path.display().to_string());
        self.parse_stream(&source, 0, flags)
    }

    /// Parses `source` from `config.offset`.
    ///
    /// An image can only be parsed once; the format's `validate` hook locates
    /// the magic, `tokenize` then `parse` consume the bounded view, and images
    /// without a `parse` hook must be a multiple of the alignment in size.
    pub fn parse_with_config(&mut self, source: &SharedSource, config: &ParseConfig) -> Result<()> {
        config.validate()?;
        if self.has_flag(FirmwareFlags::DONE_PARSE) {
            return Err(Error::NotSupported(
                "firmware object cannot be reused".into(),
            ));
        }

        let source_size = source.size()?;
        if source_size <= config.offset {
            return Err(Error::NotSupported(format!(
                "stream size 0x{source_size:x} is smaller than offset 0x{:x}",
                config.offset
            )));
        }

        let hooks = self.format.hooks();
        let offset = if hooks.contains(Hooks::VALIDATE) {
            self.search_magic(source.as_ref(), source_size, config)?
        } else {
            config.offset
        };

        let remaining = source_size - offset;
        if remaining == 0 {
            return Err(Error::NotSupported("invalid firmware as zero sized".into()));
        }
        if self.size_max > 0 && remaining > self.size_max {
            return Err(Error::InvalidFile(format!(
                "firmware is too large (0x{remaining:x}, limit 0x{:x})",
                self.size_max
            )));
        }

        self.add_flag(FirmwareFlags::DONE_PARSE);
        if hooks.contains(Hooks::CHECK_COMPATIBLE) {
            self.add_flag(FirmwareFlags::HAS_CHECK_COMPATIBLE);
        }

        let view: SharedSource = if offset == 0 {
            source.clone()
        } else {
            let partial = PartialSource::new(source.clone(), offset, remaining)
                .prefix_err("failed to cut firmware: ")?;
            Arc::new(partial)
        };

        let flags = config.flags;
        if flags.contains(ParseFlags::CACHE_BLOB) {
            let blob = view.read_at(0, to_usize(remaining)?)?;
            self.set_bytes(blob);
        } else if flags.contains(ParseFlags::CACHE_STREAM) {
            self.set_stream(view.clone())?;
        }

        self.format.tokenize(&mut self.base, &view, flags)?;
        if hooks.contains(Hooks::PARSE) {
            return self.format.parse(&mut self.base, &view, flags);
        }

        let align = 1u64 << self.alignment;
        if remaining % align != 0 {
            return Err(Error::InvalidFile(format!(
                "raw firmware is not aligned to 0x{align:x}"
            )));
        }
        Ok(())
    }

    /// Returns the offset parsing should start at.
    fn search_magic(
        &mut self,
        source: &dyn ByteSource,
        source_size: u64,
        config: &ParseConfig,
    ) -> Result<u64> {
        let offset = config.offset;
        if !self.has_flag(FirmwareFlags::ALWAYS_SEARCH)
            && config.flags.contains(ParseFlags::NO_SEARCH)
        {
            self.format.validate(source, offset)?;
            return Ok(offset);
        }
        if source_size > config.search_limit {
            self.format.validate(source, offset).prefix_err(format!(
                "failed to search for magic as firmware size was 0x{source_size:x} and limit was 0x{:x}: ",
                config.search_limit
            ))?;
            return Ok(offset);
        }
        for candidate in offset..source_size {
            if self.format.validate(source, candidate).is_ok() {
                if candidate != offset {
                    debug!("found {} magic @0x{candidate:x}", self.type_name());
                }
                self.base.offset = candidate;
                return Ok(candidate);
            }
        }
        Err(Error::InvalidFile("did not find magic".into()))
    }

    /// Tries each format in turn and returns the first that parses `source`.
    pub fn parse_with_formats(
        source: &SharedSource,
        offset: u64,
        flags: ParseFlags,
        formats: &[FormatConstructor],
    ) -> Result<Firmware> {
        let mut failure: Option<Error> = None;
        for ctor in formats {
            let mut firmware = Firmware::from_boxed(ctor());
            match firmware.parse_stream(source, offset, flags) {
                Ok(()) => {
                    info!("detected {} firmware", firmware.type_name());
                    return Ok(firmware);
                }
                Err(e) => {
                    debug!("{} did not parse: {e}", firmware.type_name());
                    failure = Some(match failure {
                        None => e,
                        Some(all) => all.prefix(format!("{e}: ")),
                    });
                }
            }
        }
        Err(failure.unwrap_or_else(|| Error::InvalidData("no firmware formats to try".into())))
    }

    /// Checks that `other` can be installed over this image.
    pub fn check_compatible(&self, other: &Firmware, flags: ParseFlags) -> Result<()> {
        self.format.check_compatible(&self.base, other, flags)
    }

    /// Serializes the image; formats without a `write` hook return the
    /// payload with patches applied.
    pub fn write(&self) -> Result<Bytes> {
        if self.format.hooks().contains(Hooks::WRITE) {
            return self.format.write(&self.base);
        }
        self.bytes_with_patches()
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let blob = self.write()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &blob)
            .map_err(Error::from)
            .prefix_err(format!("failed to write {}: ", path.display()))?;
        debug!("wrote 0x{:x} bytes to {}", blob.len(), path.display());
        Ok(())
    }

    /// Lower-case hex digest of the image.
    pub fn checksum(&self, kind: ChecksumKind) -> Result<String> {
        match self.format.checksum(&self.base, kind) {
            Err(e) if e.is_not_supported() => {}
            other => return other,
        }
        match &self.base.payload {
            Payload::Bytes(bytes) => Ok(checksum::compute(kind, bytes)),
            Payload::Stream { source, .. } => checksum::compute_source(kind, source.as_ref()),
            Payload::Unset => Ok(checksum::compute(kind, &self.write()?)),
        }
    }
}
