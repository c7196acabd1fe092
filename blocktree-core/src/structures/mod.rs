//! On-disk data structures

pub mod blocktree;

pub use blocktree::{
    AutomatonIntersector, BlockStats, BlockTreeConfig, BlockTreeTermsWriter, DictionaryCursor,
    FieldDictionary, FieldSummary, FieldWriter, PrefixIndex, ReadOptions, SeekStatus,
    SegmentDictionary, TermCursor,
};
