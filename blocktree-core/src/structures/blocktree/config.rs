use serde::{Deserialize, Serialize};

use super::{DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MIN_BLOCK_SIZE, VERSION_CHECKSUM, VERSION_META_ARRAY};
use crate::error::{Error, Result};

/// Block sizing and output format for [`BlockTreeTermsWriter`](super::BlockTreeTermsWriter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTreeConfig {
    /// Smallest entry count for a block cut below the root.
    pub min_items_in_block: usize,
    /// Largest entry count before a block is split into a floor chain.
    pub max_items_in_block: usize,
    /// On-disk format version to write.
    pub format_version: u32,
}

impl Default for BlockTreeConfig {
    fn default() -> Self {
        Self {
            min_items_in_block: DEFAULT_MIN_BLOCK_SIZE,
            max_items_in_block: DEFAULT_MAX_BLOCK_SIZE,
            format_version: VERSION_CHECKSUM,
        }
    }
}

impl BlockTreeConfig {
    pub fn new(min_items_in_block: usize, max_items_in_block: usize) -> Result<Self> {
        let config = Self {
            min_items_in_block,
            max_items_in_block,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_format_version(mut self, format_version: u32) -> Result<Self> {
        self.format_version = format_version;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let (min, max) = (self.min_items_in_block, self.max_items_in_block);
        if min <= 1 {
            return Err(Error::InvalidArgument(format!(
                "min_items_in_block must be >= 2; got {}",
                min
            )));
        }
        if max == 0 {
            return Err(Error::InvalidArgument(format!(
                "max_items_in_block must be >= 1; got {}",
                max
            )));
        }
        if min > max {
            return Err(Error::InvalidArgument(format!(
                "min_items_in_block must be <= max_items_in_block; got min={} max={}",
                min, max
            )));
        }
        if 2 * (min - 1) > max {
            return Err(Error::InvalidArgument(format!(
                "max_items_in_block must be >= 2*(min_items_in_block-1); got min={} max={}",
                min, max
            )));
        }
        if !(VERSION_META_ARRAY..=VERSION_CHECKSUM).contains(&self.format_version) {
            return Err(Error::InvalidArgument(format!(
                "cannot write format version {} (supported {}..={})",
                self.format_version, VERSION_META_ARRAY, VERSION_CHECKSUM
            )));
        }
        Ok(())
    }
}

/// Options for [`SegmentDictionary::open_with_options`](super::SegmentDictionary::open_with_options).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Hash the whole index file on open. When off, only the footer
    /// structure is validated.
    ///
    /// Turning this off assumes the index bytes are trusted: the FST is
    /// decoded without bounds validation, so a damaged index may panic
    /// during seeks instead of returning [`Error::Corruption`](crate::Error::Corruption).
    pub verify_index_checksum: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_index_checksum: true,
        }
    }
}
