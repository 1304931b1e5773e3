//! Firmware Container Library
//!
//! This library provides a generic object model for firmware images: a tree
//! of nested images that can be parsed from a byte source, patched, chunked
//! for transfer, checksummed and round-tripped through an XML build manifest.
//!
//! # Features
//! - Buffer or stream backed payloads, read lazily
//! - Bounded parsing with magic-byte search
//! - Nested images with id, index, checksum and type lookups
//! - Byte patches and address-based chunking
//! - CRC-32 and SHA-1/256/384/512 checksums
//! - XML manifest build and export
//!
//! # Formats
//! - Raw firmware (`FuFirmware`)
//! - ACPI tables (`FuAcpiTable`)
//! - Intel HEX (`FuIhexFirmware`)
//!
//! # Examples
//!
//! ## Parsing Raw Bytes
//! ```rust
//! use bytes::Bytes;
//! use fwupd_firmware::{ChecksumKind, Firmware, ParseFlags};
//!
//! fn main() -> fwupd_firmware::Result<()> {
//!     let mut firmware = Firmware::new();
//!     firmware.parse_bytes(Bytes::from_static(b"123456789"), 0, ParseFlags::CACHE_BLOB)?;
//!     assert_eq!(firmware.checksum(ChecksumKind::Crc32)?, "cbf43926");
//!     Ok(())
//! }
//! ```
//!
//! ## Building From a Manifest
//! ```rust
//! use fwupd_firmware::{ExportFlags, Firmware};
//!
//! fn main() -> fwupd_firmware::Result<()> {
//!     let firmware = Firmware::from_manifest(
//!         r#"<firmware>
//!              <firmware><id>bootloader</id><data>AAEC</data></firmware>
//!              <firmware><id>app</id><addr>0x8000</addr><data>AwQF</data></firmware>
//!            </firmware>"#,
//!     )?;
//!     let app = firmware.image_by_id(Some("app|main"))?;
//!     assert_eq!(&app.write_chunk(0x8001, 16)?[..], &[4u8, 5]);
//!     println!("{}", firmware.export_to_xml(ExportFlags::empty())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Probing Formats
//! ```rust
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use fwupd_firmware::{construct, AcpiTable, Firmware, IhexFirmware, ParseFlags, SharedSource};
//!
//! let source: SharedSource = Arc::new(Bytes::from_static(b":0100000042BD\n:00000001FF\n"));
//! let formats = [construct::<AcpiTable>, construct::<IhexFirmware>];
//! let firmware = Firmware::parse_with_formats(&source, 0, ParseFlags::empty(), &formats).unwrap();
//! assert_eq!(firmware.type_name(), "FuIhexFirmware");
//! ```

pub mod checksum;
pub mod common;
mod error;
pub mod firmware;
pub mod formats;
pub mod source;
pub mod xml;

pub use checksum::ChecksumKind;
pub use error::{Error, Result, ResultExt};
pub use firmware::{
    construct, lookup_format, register_format, registered_formats, Chunk, ExportFlags, Firmware,
    FirmwareBase, FirmwareFlags, FirmwareFormat, FirmwareHandle, FormatConstructor, Hooks,
    ParseConfig, ParseFlags, Patch, Payload, RawFirmware, VersionFormat,
};
pub use formats::{AcpiTable, IhexFirmware};
pub use source::{ByteSource, FileSource, PartialSource, SharedSource};
pub use xml::XmlNode;

/// Parses a file, trying each format in turn
pub fn parse_firmware_file(
    path: impl AsRef<std::path::Path>,
    flags: ParseFlags,
    formats: &[FormatConstructor],
) -> Result<Firmware> {
    let source: SharedSource = std::sync::Arc::new(FileSource::open(path)?);
    Firmware::parse_with_formats(&source, 0, flags, formats)
}

/// Creates a new parse configuration with default settings
pub fn new_config() -> ParseConfig {
    ParseConfig::new()
}
