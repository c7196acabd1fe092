//! Per-depth decoding state for the term cursor.
//!
//! A frame is one block (or one floor chain) on the path from the root block
//! to the current term. Frames are recycled: the cursor keeps a stack of
//! them, one per depth, and reloads or rewinds them as seeks move around.

use std::cmp::Ordering;

use super::cursor::SeekStatus;
use super::index::IndexArc;
use super::reader::FieldDictionary;
use crate::directories::OwnedBytes;
use crate::error::{Error, Result};
use crate::postings::{BlockTermState, PostingsReaderBase};
use crate::store::ByteCursor;

/// Past every byte label.
pub(crate) const NO_FLOOR_LABEL: u16 = 256;

/// Term bytes with a buffer that only grows.
///
/// Bytes past `len` stay valid, so a cursor can compare a new target
/// against the tail of a previous, longer term.
#[derive(Debug, Clone, Default)]
pub(crate) struct TermBuffer {
    bytes: Vec<u8>,
    len: usize,
}

impl TermBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn byte(&self, pos: usize) -> u8 {
        self.bytes.get(pos).copied().unwrap_or(0)
    }

    fn ensure(&mut self, len: usize) {
        if self.bytes.len() < len {
            self.bytes.resize(len, 0);
        }
    }

    pub fn set_byte(&mut self, pos: usize, byte: u8) {
        self.ensure(pos + 1);
        self.bytes[pos] = byte;
    }

    pub fn set_len(&mut self, len: usize) {
        self.ensure(len);
        self.len = len;
    }

    /// Overwrite from `pos` and truncate to the end of `src`.
    pub fn write_at(&mut self, pos: usize, src: &[u8]) {
        self.ensure(pos + src.len());
        self.bytes[pos..pos + src.len()].copy_from_slice(src);
        self.len = pos + src.len();
    }

    pub fn copy_from(&mut self, src: &[u8]) {
        self.write_at(0, src);
    }
}

/// The three sections of one on-disk block.
#[derive(Debug, Clone, Default)]
pub(crate) struct BlockData {
    pub ent_count: usize,
    pub is_last_in_floor: bool,
    pub is_leaf_block: bool,
    pub suffixes: ByteCursor,
    pub stats: ByteCursor,
    pub meta: ByteCursor,
    /// File pointer just past the block; the next floor block starts here.
    pub fp_end: u64,
}

impl BlockData {
    pub fn read(input: &mut ByteCursor, fp: u64) -> Result<Self> {
        input.seek(fp)?;
        let code = input.read_vint_u32()?;
        let ent_count = (code >> 1) as usize;
        if ent_count == 0 {
            return Err(Error::Corruption(format!("block at fp={} has no entries", fp)));
        }
        let is_last_in_floor = code & 1 != 0;

        let code = input.read_vint_u32()?;
        let is_leaf_block = code & 1 != 0;
        let suffixes = ByteCursor::new(input.read_bytes((code >> 1) as usize)?);
        let len = input.read_vint_u32()? as usize;
        let stats = ByteCursor::new(input.read_bytes(len)?);
        let len = input.read_vint_u32()? as usize;
        let meta = ByteCursor::new(input.read_bytes(len)?);

        Ok(Self {
            ent_count,
            is_last_in_floor,
            is_leaf_block,
            suffixes,
            stats,
            meta,
            fp_end: input.position() as u64,
        })
    }

    /// Decode stats and postings metadata of terms `metadata_upto..limit`.
    pub fn decode_metadata<P: PostingsReaderBase>(
        &mut self,
        dict: &FieldDictionary<P>,
        state: &mut BlockTermState<P::TermState>,
        metadata_upto: &mut usize,
        longs: &mut [u64],
        limit: usize,
    ) -> Result<()> {
        let mut absolute = *metadata_upto == 0;
        while *metadata_upto < limit {
            state.doc_freq = self.stats.read_vint_u32()?;
            if dict.has_freqs() {
                state.total_term_freq = state.doc_freq as i64 + self.stats.read_vint()? as i64;
            }
            for long in longs.iter_mut() {
                *long = self.meta.read_vint()?;
            }
            dict.postings()
                .decode_term(longs, &mut self.meta, dict.field_info(), state, absolute)?;
            *metadata_upto += 1;
            absolute = false;
        }
        state.term_block_ord = *metadata_upto;
        Ok(())
    }
}

pub(crate) fn sub_block_fp(fp: u64, sub_code: u64) -> Result<u64> {
    fp.checked_sub(sub_code).ok_or_else(|| {
        Error::Corruption(format!("sub-block delta {} points before fp={}", sub_code, fp))
    })
}

pub(crate) struct Frame<S> {
    /// Position in the cursor's frame stack; 0 is the static frame.
    pub ord: usize,

    pub has_terms: bool,
    pub has_terms_orig: bool,
    pub is_floor: bool,
    pub arc: Option<IndexArc>,

    /// File pointer of the loaded block.
    pub fp: u64,
    /// File pointer of the first block of the floor chain.
    pub fp_orig: u64,

    /// Length of the prefix shared by all entries of this block.
    pub prefix: usize,
    pub loaded: bool,
    pub next_ent: usize,
    pub block: BlockData,

    /// File pointer of the last sub-block entry crossed.
    pub last_sub_fp: Option<u64>,

    floor_data: ByteCursor,
    pub next_floor_label: u16,
    num_follow_floor_blocks: usize,

    pub metadata_upto: usize,
    pub state: BlockTermState<S>,
    longs: Vec<u64>,

    start_byte_pos: usize,
    suffix: usize,
    sub_code: u64,
}

impl<S> Frame<S> {
    /// Number of terms before the current entry.
    pub fn term_block_ord(&self) -> usize {
        if self.block.is_leaf_block {
            self.next_ent
        } else {
            self.state.term_block_ord
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.loaded && self.next_ent == self.block.ent_count
    }

    pub fn suffix_bytes_len(&self) -> usize {
        self.block.suffixes.len()
    }

    pub fn stats_bytes_len(&self) -> usize {
        self.block.stats.len()
    }
}

impl<S: Clone + Default> Frame<S> {
    pub fn new(ord: usize, mut state: BlockTermState<S>, longs_size: usize) -> Self {
        state.total_term_freq = -1;
        Self {
            ord,
            has_terms: false,
            has_terms_orig: false,
            is_floor: false,
            arc: None,
            fp: 0,
            fp_orig: 0,
            prefix: 0,
            loaded: false,
            next_ent: 0,
            block: BlockData::default(),
            last_sub_fp: None,
            floor_data: ByteCursor::default(),
            next_floor_label: NO_FLOOR_LABEL,
            num_follow_floor_blocks: 0,
            metadata_upto: 0,
            state,
            longs: vec![0; longs_size],
            start_byte_pos: 0,
            suffix: 0,
            sub_code: 0,
        }
    }

    /// `floor_data` is the output code after the leading file pointer.
    pub fn set_floor_data(&mut self, floor_data: OwnedBytes) -> Result<()> {
        self.floor_data = ByteCursor::new(floor_data);
        self.read_floor_header()
    }

    fn read_floor_header(&mut self) -> Result<()> {
        self.num_follow_floor_blocks = self.floor_data.read_vint()? as usize;
        if self.num_follow_floor_blocks == 0 {
            return Err(Error::Corruption("floor block without follow-on blocks".into()));
        }
        self.next_floor_label = self.floor_data.read_u8()? as u16;
        Ok(())
    }

    pub fn load_next_floor_block(&mut self, input: &mut ByteCursor) -> Result<()> {
        debug_assert!(self.loaded && !self.block.is_last_in_floor);
        self.fp = self.block.fp_end;
        self.loaded = false;
        self.load_block(input)
    }

    /// Read the block at `fp` unless it is already loaded.
    pub fn load_block(&mut self, input: &mut ByteCursor) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.block = BlockData::read(input, self.fp)?;
        self.metadata_upto = 0;
        self.state.term_block_ord = 0;
        self.next_ent = 0;
        self.last_sub_fp = None;
        self.loaded = true;
        Ok(())
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.fp = self.fp_orig;
        self.loaded = false;
        self.has_terms = self.has_terms_orig;
        if self.is_floor {
            self.floor_data.seek(0)?;
            self.read_floor_header()?;
        }
        Ok(())
    }

    /// Decode the next entry into `term`. Returns true if it is a sub-block.
    pub fn next(&mut self, term: &mut TermBuffer) -> Result<bool> {
        if self.block.is_leaf_block {
            self.next_leaf(term)
        } else {
            self.next_non_leaf(term)
        }
    }

    fn next_leaf(&mut self, term: &mut TermBuffer) -> Result<bool> {
        debug_assert!(self.next_ent < self.block.ent_count);
        self.next_ent += 1;
        self.suffix = self.block.suffixes.read_vint()? as usize;
        self.start_byte_pos = self.block.suffixes.position();
        term.write_at(self.prefix, self.block.suffixes.read_slice(self.suffix)?);
        Ok(false)
    }

    fn next_non_leaf(&mut self, term: &mut TermBuffer) -> Result<bool> {
        debug_assert!(self.next_ent < self.block.ent_count);
        self.next_ent += 1;
        let code = self.block.suffixes.read_vint()?;
        self.suffix = (code >> 1) as usize;
        self.start_byte_pos = self.block.suffixes.position();
        term.write_at(self.prefix, self.block.suffixes.read_slice(self.suffix)?);
        if code & 1 == 0 {
            self.sub_code = 0;
            self.state.term_block_ord += 1;
            Ok(false)
        } else {
            self.sub_code = self.block.suffixes.read_vint()?;
            self.last_sub_fp = Some(sub_block_fp(self.fp, self.sub_code)?);
            Ok(true)
        }
    }

    /// Pick the block of the floor chain that may hold `target`.
    pub fn scan_to_floor_frame(&mut self, target: &[u8]) -> Result<()> {
        if !self.is_floor || target.len() <= self.prefix {
            return Ok(());
        }
        let target_label = target[self.prefix] as u16;
        if target_label < self.next_floor_label {
            return Ok(());
        }

        let new_fp = loop {
            if self.num_follow_floor_blocks == 0 {
                return Err(Error::Corruption(format!(
                    "floor data of block at fp={} ran out",
                    self.fp_orig
                )));
            }
            let code = self.floor_data.read_vint()?;
            let new_fp = self.fp_orig + (code >> 1);
            self.has_terms = code & 1 != 0;
            self.num_follow_floor_blocks -= 1;
            if self.num_follow_floor_blocks == 0 {
                self.next_floor_label = NO_FLOOR_LABEL;
                break new_fp;
            }
            self.next_floor_label = self.floor_data.read_u8()? as u16;
            if target_label < self.next_floor_label {
                break new_fp;
            }
        };

        if new_fp != self.fp {
            self.loaded = false;
            self.fp = new_fp;
        }
        Ok(())
    }

    pub fn decode_metadata<P>(&mut self, dict: &FieldDictionary<P>) -> Result<()>
    where
        P: PostingsReaderBase<TermState = S>,
    {
        let limit = self.term_block_ord();
        self.block.decode_metadata(
            dict,
            &mut self.state,
            &mut self.metadata_upto,
            &mut self.longs,
            limit,
        )
    }

    /// Advance until the sub-block entry pointing at `sub_fp` was consumed.
    pub fn scan_to_sub_block(&mut self, sub_fp: u64) -> Result<()> {
        debug_assert!(!self.block.is_leaf_block);
        if self.last_sub_fp == Some(sub_fp) {
            return Ok(());
        }
        let target_sub_code = sub_block_fp(self.fp, sub_fp)?;
        loop {
            if self.next_ent == self.block.ent_count {
                return Err(Error::Corruption(format!(
                    "block at fp={} has no sub-block entry for fp={}",
                    self.fp, sub_fp
                )));
            }
            self.next_ent += 1;
            let code = self.block.suffixes.read_vint()?;
            self.block.suffixes.skip((code >> 1) as usize)?;
            if code & 1 != 0 {
                let sub_code = self.block.suffixes.read_vint()?;
                if sub_code == target_sub_code {
                    self.last_sub_fp = Some(sub_fp);
                    return Ok(());
                }
            } else {
                self.state.term_block_ord += 1;
            }
        }
    }

    /// Scan forward for `target`, leaving the frame on the first entry >= it.
    ///
    /// On `End` with `exact_only`, the term buffer holds the last entry.
    /// `term_exists` reports whether the entry landed on is a term; a
    /// `NotFound` on a sub-block entry means the ceiling lies inside it.
    pub fn scan_to_term(
        &mut self,
        target: &[u8],
        exact_only: bool,
        term: &mut TermBuffer,
        term_exists: &mut bool,
    ) -> Result<SeekStatus> {
        if self.block.is_leaf_block {
            self.scan_to_term_leaf(target, exact_only, term, term_exists)
        } else {
            self.scan_to_term_non_leaf(target, exact_only, term, term_exists)
        }
    }

    fn scan_to_term_leaf(
        &mut self,
        target: &[u8],
        exact_only: bool,
        term: &mut TermBuffer,
        term_exists: &mut bool,
    ) -> Result<SeekStatus> {
        *term_exists = true;
        self.sub_code = 0;
        if self.next_ent == self.block.ent_count {
            if exact_only {
                self.fill_term(term);
            }
            return Ok(SeekStatus::End);
        }

        loop {
            self.next_ent += 1;
            self.suffix = self.block.suffixes.read_vint()? as usize;
            self.start_byte_pos = self.block.suffixes.position();
            self.block.suffixes.skip(self.suffix)?;

            match self.compare_entry(target) {
                Ordering::Less => {
                    if self.next_ent == self.block.ent_count {
                        if exact_only {
                            self.fill_term(term);
                        }
                        return Ok(SeekStatus::End);
                    }
                }
                Ordering::Greater => {
                    self.fill_term(term);
                    return Ok(SeekStatus::NotFound);
                }
                Ordering::Equal => {
                    self.fill_term(term);
                    return Ok(SeekStatus::Found);
                }
            }
        }
    }

    fn scan_to_term_non_leaf(
        &mut self,
        target: &[u8],
        exact_only: bool,
        term: &mut TermBuffer,
        term_exists: &mut bool,
    ) -> Result<SeekStatus> {
        if self.next_ent == self.block.ent_count {
            if exact_only {
                self.fill_term(term);
                *term_exists = self.sub_code == 0;
            }
            return Ok(SeekStatus::End);
        }

        loop {
            self.next_ent += 1;
            let code = self.block.suffixes.read_vint()?;
            self.suffix = (code >> 1) as usize;
            *term_exists = code & 1 == 0;
            self.start_byte_pos = self.block.suffixes.position();
            self.block.suffixes.skip(self.suffix)?;
            if *term_exists {
                self.state.term_block_ord += 1;
                self.sub_code = 0;
            } else {
                self.sub_code = self.block.suffixes.read_vint()?;
                self.last_sub_fp = Some(sub_block_fp(self.fp, self.sub_code)?);
            }

            match self.compare_entry(target) {
                Ordering::Less => {
                    if self.next_ent == self.block.ent_count {
                        if exact_only {
                            self.fill_term(term);
                        }
                        return Ok(SeekStatus::End);
                    }
                }
                Ordering::Greater => {
                    self.fill_term(term);
                    return Ok(SeekStatus::NotFound);
                }
                Ordering::Equal => {
                    self.fill_term(term);
                    return Ok(SeekStatus::Found);
                }
            }
        }
    }

    /// Compare the entry just scanned with `target`, whose first `prefix`
    /// bytes are known to match.
    fn compare_entry(&self, target: &[u8]) -> Ordering {
        let term_len = self.prefix + self.suffix;
        let limit = target.len().min(term_len);
        if limit > self.prefix {
            let suffix = &self.block.suffixes.bytes().as_slice()[self.start_byte_pos..];
            let ord = suffix[..limit - self.prefix].cmp(&target[self.prefix..limit]);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        term_len.cmp(&target.len())
    }

    fn fill_term(&self, term: &mut TermBuffer) {
        let suffix = &self.block.suffixes.bytes().as_slice()
            [self.start_byte_pos..self.start_byte_pos + self.suffix];
        term.write_at(self.prefix, suffix);
    }
}
