//! Postings collaborator interface
//!
//! The dictionary never interprets per-term postings metadata. It hands each
//! term's state to a [`PostingsWriterBase`] which fills an array of
//! monotonically increasing "longs" plus an opaque byte blob, and hands the
//! same data back to a [`PostingsReaderBase`] on decode.

mod file_pointer;

use std::fmt::Debug;
use std::io::Write;

pub use file_pointer::{FilePointerPostingsReader, FilePointerPostingsWriter, FilePointerState};

use crate::error::Result;
use crate::field::FieldInfo;
use crate::store::ByteCursor;

/// Per-term statistics supplied on the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermStats {
    pub doc_freq: u32,
    /// -1 when the field does not track frequencies.
    pub total_term_freq: i64,
}

impl TermStats {
    pub fn new(doc_freq: u32, total_term_freq: i64) -> Self {
        Self {
            doc_freq,
            total_term_freq,
        }
    }
}

/// Decoded per-term state: dictionary stats plus the collaborator's own part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTermState<S> {
    pub doc_freq: u32,
    pub total_term_freq: i64,
    /// Ordinal of the term inside its block; metadata is decoded up to here.
    pub term_block_ord: usize,
    pub postings: S,
}

impl<S> BlockTermState<S> {
    pub fn stats(&self) -> TermStats {
        TermStats::new(self.doc_freq, self.total_term_freq)
    }
}

pub trait PostingsWriterBase {
    type TermState: Clone + Debug + Default;

    /// Write the collaborator's header into the terms file.
    fn init(&mut self, terms_out: &mut dyn Write) -> Result<()>;

    fn new_term_state(&self) -> BlockTermState<Self::TermState> {
        BlockTermState::default()
    }

    /// Start encoding terms of `field`; returns the number of longs per term.
    fn set_field(&mut self, field: &FieldInfo) -> usize;

    /// Fill `longs` and append opaque bytes to `out` for one term. With
    /// `absolute == false` the encoding may be relative to the previous call.
    fn encode_term(
        &mut self,
        longs: &mut [u64],
        out: &mut Vec<u8>,
        field: &FieldInfo,
        state: &BlockTermState<Self::TermState>,
        absolute: bool,
    ) -> Result<()>;
}

pub trait PostingsReaderBase: Send + Sync {
    type TermState: Clone + Debug + Default + Send;

    /// Read the collaborator's header from the terms file.
    fn init(&mut self, terms_in: &mut ByteCursor) -> Result<()>;

    fn new_term_state(&self) -> BlockTermState<Self::TermState> {
        BlockTermState::default()
    }

    /// Inverse of [`PostingsWriterBase::encode_term`]. `state` holds the
    /// previous term's decoded state when `absolute == false`.
    fn decode_term(
        &self,
        longs: &[u64],
        input: &mut ByteCursor,
        field: &FieldInfo,
        state: &mut BlockTermState<Self::TermState>,
        absolute: bool,
    ) -> Result<()>;

    fn ram_bytes_used(&self) -> usize;

    fn check_integrity(&self) -> Result<()>;
}
