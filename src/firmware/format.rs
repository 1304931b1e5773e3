use std::any::Any;
use std::fmt;

use bitflags::bitflags;
use bytes::Bytes;

use super::base::FirmwareBase;
use super::types::{ExportFlags, ParseFlags};
use super::Firmware;
use crate::checksum::ChecksumKind;
use crate::error::{Error, Result};
use crate::source::{ByteSource, SharedSource};
use crate::xml::XmlNode;

bitflags! {
    /// Optional hooks a format overrides, consulted where "not implemented"
    /// changes the behavior of the parsing pipeline or the write fallback.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Hooks: u32 {
        const VALIDATE = 1 << 0;
        const PARSE = 1 << 1;
        const WRITE = 1 << 2;
        const CHECK_COMPATIBLE = 1 << 3;
    }
}

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Format-specific behavior plugged into a [`Firmware`].
///
/// Every hook has a default. Hooks listed in [`Hooks`] are only called when
/// [`FirmwareFormat::hooks`] advertises them; the rest are always called and
/// default to doing nothing.
///
/// Hooks receive the [`FirmwareBase`] of the image they belong to, so a
/// `parse` implementation sets ids, payloads and child images through it.
pub trait FirmwareFormat: Any + AsAny + Send + fmt::Debug {
    /// Name used for the `gtype` attribute and the format registry.
    fn type_name(&self) -> &'static str;

    fn hooks(&self) -> Hooks {
        Hooks::empty()
    }

    /// Called once when the owning image is constructed.
    fn init(&mut self, _base: &mut FirmwareBase) {}

    /// Checks for the format magic at `offset`.
    fn validate(&self, _source: &dyn ByteSource, _offset: u64) -> Result<()> {
        Ok(())
    }

    fn tokenize(
        &mut self,
        _base: &mut FirmwareBase,
        _source: &SharedSource,
        _flags: ParseFlags,
    ) -> Result<()> {
        Ok(())
    }

    fn parse(
        &mut self,
        _base: &mut FirmwareBase,
        _source: &SharedSource,
        _flags: ParseFlags,
    ) -> Result<()> {
        Ok(())
    }

    fn write(&self, _base: &FirmwareBase) -> Result<Bytes> {
        Err(Error::NotSupported("write not supported".into()))
    }

    /// Reads format-specific elements from a manifest node.
    fn build(&mut self, _base: &mut FirmwareBase, _node: &XmlNode) -> Result<()> {
        Ok(())
    }

    fn export(&self, _base: &FirmwareBase, _flags: ExportFlags, _node: &mut XmlNode) {}

    /// Returning [`Error::NotSupported`] falls back to hashing the payload.
    fn checksum(&self, _base: &FirmwareBase, _kind: ChecksumKind) -> Result<String> {
        Err(Error::NotSupported("checksum not supported".into()))
    }

    fn check_compatible(
        &self,
        _base: &FirmwareBase,
        _other: &Firmware,
        _flags: ParseFlags,
    ) -> Result<()> {
        Ok(())
    }

    fn convert_version(&self, _base: &FirmwareBase, _version_raw: u64) -> Option<String> {
        None
    }
}

/// Firmware with no structure: the payload is whatever was parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFirmware;

impl RawFirmware {
    pub const TYPE_NAME: &'static str = "FuFirmware";
}

impl FirmwareFormat for RawFirmware {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }
}
