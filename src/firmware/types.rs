use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::{Error, Result};

/// Deepest nesting level an image may sit at; the root is depth 0.
pub const IMAGE_DEPTH_MAX: u32 = 50;

/// Largest alignment bit position, i.e. 2 GiB.
pub const ALIGNMENT_MAX: u8 = 31;

/// Sources larger than this are not scanned for magic.
pub const SEARCH_MAGIC_SIZE_MAX: u64 = 32 * 1024 * 1024;

/// Largest payload rendered inline for stream-backed exports and ASCII previews.
pub const EXPORT_DATA_PREVIEW_MAX: usize = 0x100;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FirmwareFlags: u32 {
        const DEDUPE_ID = 1 << 0;
        const DEDUPE_IDX = 1 << 1;
        const HAS_CHECKSUM = 1 << 2;
        const HAS_VID_PID = 1 << 3;
        const DONE_PARSE = 1 << 4;
        const HAS_STORED_SIZE = 1 << 5;
        const ALWAYS_SEARCH = 1 << 6;
        const NO_AUTO_DETECTION = 1 << 7;
        const HAS_CHECK_COMPATIBLE = 1 << 8;
        const IS_LAST_IMAGE = 1 << 9;
    }
}

const FLAG_NAMES: &[(FirmwareFlags, &str)] = &[
    (FirmwareFlags::DEDUPE_ID, "dedupe-id"),
    (FirmwareFlags::DEDUPE_IDX, "dedupe-idx"),
    (FirmwareFlags::HAS_CHECKSUM, "has-checksum"),
    (FirmwareFlags::HAS_VID_PID, "has-vid-pid"),
    (FirmwareFlags::DONE_PARSE, "done-parse"),
    (FirmwareFlags::HAS_STORED_SIZE, "has-stored-size"),
    (FirmwareFlags::ALWAYS_SEARCH, "always-search"),
    (FirmwareFlags::NO_AUTO_DETECTION, "no-auto-detection"),
    (FirmwareFlags::HAS_CHECK_COMPATIBLE, "has-check-compatible"),
    (FirmwareFlags::IS_LAST_IMAGE, "is-last-image"),
];

impl fmt::Display for FirmwareFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = FLAG_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&names.join("|"))
    }
}

impl FromStr for FirmwareFlags {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut flags = FirmwareFlags::empty();
        for name in s.split('|').map(str::trim).filter(|n| !n.is_empty() && *n != "none") {
            let (flag, _) = FLAG_NAMES
                .iter()
                .find(|(_, known)| *known == name)
                .ok_or_else(|| Error::InvalidData(format!("{name} is not a valid firmware flag")))?;
            flags |= *flag;
        }
        Ok(flags)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParseFlags: u32 {
        /// Validate only at the given offset instead of scanning for magic.
        const NO_SEARCH = 1 << 0;
        const IGNORE_CHECKSUM = 1 << 1;
        const IGNORE_VID_PID = 1 << 2;
        /// Keep a copy of the parsed bytes as the payload.
        const CACHE_BLOB = 1 << 3;
        /// Keep the bounded source as the payload.
        const CACHE_STREAM = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExportFlags: u32 {
        const INCLUDE_DEBUG = 1 << 0;
        /// Render payloads as a printable preview rather than base64.
        const ASCII_DATA = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VersionFormat {
    #[default]
    Unknown,
    Plain,
    Number,
    Pair,
    Triplet,
    Quad,
    Bcd,
    IntelMe,
    IntelMe2,
    SurfaceLegacy,
    Surface,
    DellBios,
    Hex,
    DellBiosMsb,
    IntelCsme19,
}

const VERSION_FORMAT_NAMES: &[(VersionFormat, &str)] = &[
    (VersionFormat::Unknown, "unknown"),
    (VersionFormat::Plain, "plain"),
    (VersionFormat::Number, "number"),
    (VersionFormat::Pair, "pair"),
    (VersionFormat::Triplet, "triplet"),
    (VersionFormat::Quad, "quad"),
    (VersionFormat::Bcd, "bcd"),
    (VersionFormat::IntelMe, "intel-me"),
    (VersionFormat::IntelMe2, "intel-me2"),
    (VersionFormat::SurfaceLegacy, "surface-legacy"),
    (VersionFormat::Surface, "surface"),
    (VersionFormat::DellBios, "dell-bios"),
    (VersionFormat::Hex, "hex"),
    (VersionFormat::DellBiosMsb, "dell-bios-msb"),
    (VersionFormat::IntelCsme19, "intel-csme19"),
];

impl VersionFormat {
    pub fn as_str(&self) -> &'static str {
        VERSION_FORMAT_NAMES
            .iter()
            .find(|(fmt, _)| fmt == self)
            .map_or("unknown", |(_, name)| *name)
    }
}

impl fmt::Display for VersionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionFormat {
    type Err = Error;

    /// `unknown` is the unset value and is rejected.
    fn from_str(s: &str) -> Result<Self> {
        VERSION_FORMAT_NAMES
            .iter()
            .find(|(fmt, name)| *name == s && *fmt != VersionFormat::Unknown)
            .map(|(fmt, _)| *fmt)
            .ok_or_else(|| Error::InvalidData(format!("{s} is not a valid version format")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_to_string_and_back() {
        let flags = FirmwareFlags::DEDUPE_ID | FirmwareFlags::HAS_CHECKSUM;
        assert_eq!(flags.to_string(), "dedupe-id|has-checksum");
        assert_eq!("dedupe-id|has-checksum".parse::<FirmwareFlags>().unwrap(), flags);
        assert_eq!(FirmwareFlags::empty().to_string(), "none");
        assert!("dedupe-everything".parse::<FirmwareFlags>().is_err());
    }

    #[test]
    fn version_format_names() {
        assert_eq!("triplet".parse::<VersionFormat>().unwrap(), VersionFormat::Triplet);
        assert_eq!(VersionFormat::IntelMe2.to_string(), "intel-me2");
        assert!("unknown".parse::<VersionFormat>().is_err());
        assert!("semver".parse::<VersionFormat>().is_err());
    }
}
