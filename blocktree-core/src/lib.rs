//! Blocktree - a block-tree term dictionary
//!
//! Stores the sorted terms of each field of a segment in two files:
//! - a terms file of prefix-sharing blocks, each holding term suffixes,
//!   per-term stats and opaque postings metadata
//! - an index file with one FST per field mapping block prefixes to blocks
//!
//! Readers seek to an exact term or its ceiling by walking the index to the
//! deepest matching block and scanning only that block, enumerate terms in
//! byte order, and intersect a field with a byte automaton.

pub mod automaton;
pub mod directories;
pub mod error;
pub mod field;
pub mod postings;
pub mod store;
pub mod structures;

pub use automaton::{Automaton, CompiledAutomaton};
pub use directories::OwnedBytes;
pub use error::{Error, Result};
pub use field::{FieldInfo, FieldInfos, IndexOptions};
pub use postings::{
    BlockTermState, FilePointerPostingsReader, FilePointerPostingsWriter, FilePointerState,
    PostingsReaderBase, PostingsWriterBase, TermStats,
};
pub use structures::{
    AutomatonIntersector, BlockStats, BlockTreeConfig, BlockTreeTermsWriter, DictionaryCursor,
    FieldDictionary, FieldSummary, FieldWriter, PrefixIndex, ReadOptions, SeekStatus,
    SegmentDictionary, TermCursor,
};
