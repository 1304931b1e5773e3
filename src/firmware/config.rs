use super::types::{ParseFlags, SEARCH_MAGIC_SIZE_MAX};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConfig {
    pub offset: u64,
    pub flags: ParseFlags,
    pub search_limit: u64,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            offset: 0,
            flags: ParseFlags::empty(),
            search_limit: SEARCH_MAGIC_SIZE_MAX,
        }
    }
}

impl ParseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_flags(mut self, flags: ParseFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sources larger than `limit` are validated at the offset only.
    pub fn with_search_limit(mut self, limit: u64) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn no_search(mut self) -> Self {
        self.flags |= ParseFlags::NO_SEARCH;
        self
    }

    pub fn cache_blob(mut self) -> Self {
        self.flags |= ParseFlags::CACHE_BLOB;
        self
    }

    pub fn cache_stream(mut self) -> Self {
        self.flags |= ParseFlags::CACHE_STREAM;
        self
    }

    pub fn ignore_checksum(mut self) -> Self {
        self.flags |= ParseFlags::IGNORE_CHECKSUM;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_limit == 0 && !self.flags.contains(ParseFlags::NO_SEARCH) {
            return Err(Error::InvalidData(
                "search limit must be non-zero unless searching is disabled".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_flags() {
        let config = ParseConfig::new().with_offset(0x20).no_search().cache_blob();
        assert_eq!(config.offset, 0x20);
        assert!(config.flags.contains(ParseFlags::NO_SEARCH | ParseFlags::CACHE_BLOB));
        assert_eq!(config.search_limit, SEARCH_MAGIC_SIZE_MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_search_limit_needs_no_search() {
        assert!(ParseConfig::new().with_search_limit(0).validate().is_err());
        assert!(ParseConfig::new().with_search_limit(0).no_search().validate().is_ok());
    }
}
