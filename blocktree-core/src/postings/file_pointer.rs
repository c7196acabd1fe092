//! Minimal postings metadata codec: file pointers into doc/position streams
//! plus an inlined doc id for singleton terms.

use std::io::Write;

use super::{BlockTermState, PostingsReaderBase, PostingsWriterBase};
use crate::error::{Error, Result};
use crate::field::FieldInfo;
use crate::store::{ByteCursor, check_header, write_header, write_vint};

const CODEC: &str = "FILE_POINTER_POSTINGS";
const VERSION_CURRENT: u32 = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePointerState {
    pub doc_start_fp: u64,
    pub pos_start_fp: u64,
    /// Set iff docFreq == 1.
    pub singleton_doc: Option<u32>,
}

#[derive(Debug, Default)]
pub struct FilePointerPostingsWriter {
    has_positions: bool,
    last: FilePointerState,
}

impl FilePointerPostingsWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

fn delta(current: u64, last: u64, what: &str) -> Result<u64> {
    current.checked_sub(last).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "{} went backwards: {} after {}",
            what, current, last
        ))
    })
}

impl PostingsWriterBase for FilePointerPostingsWriter {
    type TermState = FilePointerState;

    fn init(&mut self, terms_out: &mut dyn Write) -> Result<()> {
        write_header(terms_out, CODEC, VERSION_CURRENT)
    }

    fn set_field(&mut self, field: &FieldInfo) -> usize {
        self.has_positions = field.index_options.has_positions();
        self.last = FilePointerState::default();
        if self.has_positions { 2 } else { 1 }
    }

    fn encode_term(
        &mut self,
        longs: &mut [u64],
        out: &mut Vec<u8>,
        _field: &FieldInfo,
        state: &BlockTermState<FilePointerState>,
        absolute: bool,
    ) -> Result<()> {
        if absolute {
            self.last = FilePointerState::default();
        }
        let current = &state.postings;
        longs[0] = delta(current.doc_start_fp, self.last.doc_start_fp, "doc file pointer")?;
        if self.has_positions {
            longs[1] = delta(current.pos_start_fp, self.last.pos_start_fp, "pos file pointer")?;
        }
        match (state.doc_freq == 1, current.singleton_doc) {
            (true, Some(doc)) => write_vint(out, doc as u64)?,
            (false, None) => {}
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "singleton doc must be set iff docFreq == 1 (docFreq={})",
                    state.doc_freq
                )));
            }
        }
        self.last = current.clone();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FilePointerPostingsReader {
    version: Option<u32>,
}

impl FilePointerPostingsReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PostingsReaderBase for FilePointerPostingsReader {
    type TermState = FilePointerState;

    fn init(&mut self, terms_in: &mut ByteCursor) -> Result<()> {
        self.version = Some(check_header(terms_in, CODEC, VERSION_CURRENT, VERSION_CURRENT)?);
        Ok(())
    }

    fn decode_term(
        &self,
        longs: &[u64],
        input: &mut ByteCursor,
        field: &FieldInfo,
        state: &mut BlockTermState<FilePointerState>,
        absolute: bool,
    ) -> Result<()> {
        let postings = &mut state.postings;
        if absolute {
            postings.doc_start_fp = 0;
            postings.pos_start_fp = 0;
        }
        let needed = if field.index_options.has_positions() { 2 } else { 1 };
        if longs.len() < needed {
            return Err(Error::Corruption(format!(
                "field {:?} stores {} metadata longs, need {}",
                field.name,
                longs.len(),
                needed
            )));
        }
        postings.doc_start_fp += longs[0];
        if needed == 2 {
            postings.pos_start_fp += longs[1];
        }
        postings.singleton_doc = if state.doc_freq == 1 {
            Some(input.read_vint_u32()?)
        } else {
            None
        };
        Ok(())
    }

    fn ram_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>()
    }

    fn check_integrity(&self) -> Result<()> {
        Ok(())
    }
}
