use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::source::{to_usize, SharedSource};

/// The payload of an image: nothing, an in-memory buffer, or a source.
///
/// Only one representation is ever live; setting one drops the other.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Unset,
    Bytes(Bytes),
    Stream { source: SharedSource, size: u64 },
}

impl Payload {
    pub fn bytes(&self) -> Result<Bytes> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            Payload::Stream { size: 0, .. } => {
                Err(Error::InvalidData("stream size unknown".into()))
            }
            Payload::Stream { source, size } => source.read_at(0, to_usize(*size)?),
            Payload::Unset => Err(Error::NotFound("no payload set".into())),
        }
    }

    pub fn set_bytes(&mut self, bytes: Bytes) {
        *self = Payload::Bytes(bytes);
    }

    /// Caches `source` together with its size; fails if the size is unavailable.
    pub fn set_stream(&mut self, source: SharedSource) -> Result<()> {
        let size = source.size()?;
        *self = Payload::Stream { source, size };
        Ok(())
    }

    pub fn stream(&self) -> Result<SharedSource> {
        match self {
            Payload::Stream { source, .. } => Ok(source.clone()),
            Payload::Bytes(bytes) => Ok(Arc::new(bytes.clone())),
            Payload::Unset => Err(Error::NotFound("no stream or bytes set".into())),
        }
    }

    pub fn cached_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn stream_size(&self) -> Option<u64> {
        match self {
            Payload::Stream { size, .. } => Some(*size),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Payload::Unset)
    }
}
