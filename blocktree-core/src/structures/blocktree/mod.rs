//! Block-tree term dictionary
//!
//! Terms of a field are grouped into blocks of lexicographically adjacent
//! entries sharing a prefix. A block holds terms and references to child
//! blocks (longer prefixes); blocks too large for one unit are split into a
//! floor chain keyed by the first suffix byte. An FST ([`PrefixIndex`]) maps
//! each block prefix to its file pointer so lookups go straight to the right
//! block without scanning.
//!
//! Terms file (`.tim`):
//! ```text
//! Header | [dir offset, version 0] | postings header | Block* | FieldDirectory | dir offset | Footer
//! Block  = (entCount<<1 | isLastInFloor): vint
//!          (suffixBytes<<1 | isLeaf): vint, suffixes
//!          statsBytes: vint, stats
//!          metaBytes: vint, meta
//! ```
//! Index file (`.tip`): `Header | PrefixIndex per field | indexStartFP: vint per field | dir offset | Footer`.

mod config;
mod cursor;
mod frame;
mod index;
mod intersect;
mod reader;
mod stats;
mod writer;

pub use config::{BlockTreeConfig, ReadOptions};
pub use cursor::{DictionaryCursor, SeekStatus, TermCursor};
pub use index::{IndexArc, PrefixIndex};
pub use intersect::AutomatonIntersector;
pub use reader::{FieldDictionary, SegmentDictionary};
pub use stats::BlockStats;
pub use writer::{BlockTreeTermsWriter, FieldSummary, FieldWriter};

pub const TERMS_CODEC_NAME: &str = "BLOCK_TREE_TERMS_DICT";
pub const TERMS_INDEX_CODEC_NAME: &str = "BLOCK_TREE_TERMS_INDEX";

/// Directory offset stored right after the header.
pub const VERSION_START: u32 = 0;
/// Directory offset stored in the last 8 bytes.
pub const VERSION_APPEND_ONLY: u32 = 1;
/// Per-field metadata long count stored in the directory.
pub const VERSION_META_ARRAY: u32 = 2;
/// Checksummed footer.
pub const VERSION_CHECKSUM: u32 = 3;
pub const VERSION_CURRENT: u32 = VERSION_CHECKSUM;

pub const DEFAULT_MIN_BLOCK_SIZE: usize = 25;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 48;

pub(crate) const OUTPUT_FLAGS_NUM_BITS: u32 = 2;
pub(crate) const OUTPUT_FLAG_IS_FLOOR: u64 = 0x1;
pub(crate) const OUTPUT_FLAG_HAS_TERMS: u64 = 0x2;

pub(crate) fn encode_output(fp: u64, has_terms: bool, is_floor: bool) -> u64 {
    debug_assert!(fp < 1 << 62);
    (fp << OUTPUT_FLAGS_NUM_BITS)
        | if has_terms { OUTPUT_FLAG_HAS_TERMS } else { 0 }
        | if is_floor { OUTPUT_FLAG_IS_FLOOR } else { 0 }
}
