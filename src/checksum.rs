use std::fmt;
use std::str::FromStr;

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};
use crate::source::ByteSource;

const STREAM_BLOCK_SIZE: usize = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumKind {
    Crc32,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumKind {
    /// Infers the digest kind from the length of a hex string.
    pub fn guess(checksum: &str) -> Self {
        match checksum.len() {
            8 => ChecksumKind::Crc32,
            64 => ChecksumKind::Sha256,
            96 => ChecksumKind::Sha384,
            128 => ChecksumKind::Sha512,
            _ => ChecksumKind::Sha1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumKind::Crc32 => "crc32",
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Sha256 => "sha256",
            ChecksumKind::Sha384 => "sha384",
            ChecksumKind::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "crc32" => Ok(ChecksumKind::Crc32),
            "sha1" => Ok(ChecksumKind::Sha1),
            "sha256" => Ok(ChecksumKind::Sha256),
            "sha384" => Ok(ChecksumKind::Sha384),
            "sha512" => Ok(ChecksumKind::Sha512),
            _ => Err(Error::InvalidData(format!("{s} is not a valid checksum kind"))),
        }
    }
}

enum Hasher {
    Crc32(crc32fast::Hasher),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    fn new(kind: ChecksumKind) -> Self {
        match kind {
            ChecksumKind::Crc32 => Hasher::Crc32(crc32fast::Hasher::new()),
            ChecksumKind::Sha1 => Hasher::Sha1(Sha1::new()),
            ChecksumKind::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumKind::Sha384 => Hasher::Sha384(Sha384::new()),
            ChecksumKind::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Crc32(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    fn finish(self) -> String {
        match self {
            Hasher::Crc32(h) => format!("{:08x}", h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha384(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Lower-case hex digest of `data`.
pub fn compute(kind: ChecksumKind, data: &[u8]) -> String {
    let mut hasher = Hasher::new(kind);
    hasher.update(data);
    hasher.finish()
}

/// Digest of a whole source, read in fixed-size blocks.
pub fn compute_source(kind: ChecksumKind, source: &dyn ByteSource) -> Result<String> {
    let size = source.size()?;
    let mut hasher = Hasher::new(kind);
    let mut offset = 0u64;
    while offset < size {
        let len = (size - offset).min(STREAM_BLOCK_SIZE as u64) as usize;
        let block = source.read_at(offset, len)?;
        hasher.update(&block);
        offset += len as u64;
    }
    Ok(hasher.finish())
}
