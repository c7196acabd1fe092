//! Seekable term cursor over one field.

use super::frame::{Frame, TermBuffer};
use super::index::{IndexArc, PrefixIndex};
use super::reader::FieldDictionary;
use super::stats::BlockStats;
use crate::directories::OwnedBytes;
use crate::error::{Error, Result};
use crate::postings::{BlockTermState, PostingsReaderBase};
use crate::store::ByteCursor;

/// Outcome of a ceiling seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// The target term exists; the cursor is on it.
    Found,
    /// The cursor is on the smallest term greater than the target.
    NotFound,
    /// Every term is smaller than the target.
    End,
}

/// Common surface of the dictionary cursors.
///
/// `next` returns the term bytes borrowed from the cursor; copy them before
/// calling anything else that takes `&mut self`.
pub trait TermCursor {
    type TermState;

    /// Advance to the next term in byte order.
    fn next(&mut self) -> Result<Option<&[u8]>>;

    /// Current term. Only meaningful after `next` returned a term or a seek
    /// positioned the cursor.
    fn term(&self) -> &[u8];

    fn doc_freq(&mut self) -> Result<u32>;

    /// -1 if the field does not track frequencies.
    fn total_term_freq(&mut self) -> Result<i64>;

    /// Decoded stats and postings metadata of the current term.
    fn term_state(&mut self) -> Result<BlockTermState<Self::TermState>>;

    fn seek_exact(&mut self, target: &[u8]) -> Result<bool>;

    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus>;

    /// Terms carry no ordinals in this format.
    fn ord(&self) -> Result<u64> {
        Err(Error::Unsupported("term ordinals".into()))
    }

    fn seek_exact_ord(&mut self, _ord: u64) -> Result<()> {
        Err(Error::Unsupported("seek by term ordinal".into()))
    }
}

const STATIC_FRAME: usize = 0;

/// Cursor over all terms of a field with exact and ceiling seeks.
///
/// Frames are indexed by depth: `frames[0]` is a static frame holding state
/// installed by [`seek_exact_with_state`](Self::seek_exact_with_state), the
/// root block lives at `frames[1]`. `arcs[i]` is the index arc reached after
/// the first `i` bytes of the current term, valid up to `valid_index_prefix`.
pub struct DictionaryCursor<'a, P: PostingsReaderBase> {
    dict: &'a FieldDictionary<P>,
    input: ByteCursor,
    frames: Vec<Frame<P::TermState>>,
    cur: usize,
    arcs: Vec<IndexArc>,
    term: TermBuffer,
    term_exists: bool,
    /// Frames whose prefix is longer than this must be rewound when reused.
    target_before_current_length: isize,
    valid_index_prefix: usize,
    eof: bool,
    /// Set after a failed exact seek or a seek by state; the next call to
    /// `next` re-seeks to it first.
    pending_target: Option<Vec<u8>>,
}

impl<'a, P: PostingsReaderBase> DictionaryCursor<'a, P> {
    pub(crate) fn new(dict: &'a FieldDictionary<P>) -> Self {
        let static_frame = Frame::new(STATIC_FRAME, dict.postings().new_term_state(), dict.longs_size());
        Self {
            dict,
            input: ByteCursor::new(dict.terms_bytes().clone()),
            frames: vec![static_frame],
            cur: STATIC_FRAME,
            arcs: vec![IndexArc::default()],
            term: TermBuffer::default(),
            term_exists: false,
            target_before_current_length: -1,
            valid_index_prefix: 0,
            eof: false,
            pending_target: None,
        }
    }

    fn index(&self) -> Result<&'a PrefixIndex> {
        let dict: &'a FieldDictionary<P> = self.dict;
        dict.index()
            .ok_or_else(|| Error::Unsupported("seek on a dictionary opened without its index".into()))
    }

    fn ensure_frame(&mut self, ord: usize) {
        while self.frames.len() <= ord {
            let frame = Frame::new(
                self.frames.len(),
                self.dict.postings().new_term_state(),
                self.dict.longs_size(),
            );
            self.frames.push(frame);
        }
    }

    fn set_arc(&mut self, idx: usize, arc: IndexArc) {
        if self.arcs.len() <= idx {
            self.arcs.resize(idx + 1, IndexArc::default());
        }
        self.arcs[idx] = arc;
    }

    /// Prepare the frame below the current one from an output code.
    fn push_frame_code(&mut self, arc: Option<IndexArc>, code: &OwnedBytes, length: usize) -> Result<usize> {
        let mut reader = ByteCursor::new(code.clone());
        let value = reader.read_vint()?;
        let ord = self.cur + 1;
        self.ensure_frame(ord);
        let frame = &mut self.frames[ord];
        frame.has_terms = value & super::OUTPUT_FLAG_HAS_TERMS != 0;
        frame.has_terms_orig = frame.has_terms;
        frame.is_floor = value & super::OUTPUT_FLAG_IS_FLOOR != 0;
        if frame.is_floor {
            frame.set_floor_data(code.slice(reader.position()..code.len()))?;
        }
        self.push_frame_fp(arc, value >> super::OUTPUT_FLAGS_NUM_BITS, length)
    }

    /// Prepare the frame below the current one for the block at `fp`,
    /// reusing its loaded state when it already points there.
    fn push_frame_fp(&mut self, arc: Option<IndexArc>, fp: u64, length: usize) -> Result<usize> {
        let ord = self.cur + 1;
        self.ensure_frame(ord);
        let target_before_current_length = self.target_before_current_length;
        let frame = &mut self.frames[ord];
        frame.arc = arc;
        if frame.fp_orig == fp && frame.loaded {
            if frame.prefix as isize > target_before_current_length {
                frame.rewind()?;
            }
            debug_assert_eq!(length, frame.prefix);
        } else {
            frame.loaded = false;
            frame.prefix = length;
            frame.state.term_block_ord = 0;
            frame.fp_orig = fp;
            frame.fp = fp;
            frame.last_sub_fp = None;
        }
        Ok(ord)
    }

    /// Push the root block onto an empty stack.
    fn push_root(&mut self) -> Result<()> {
        let arc = self.dict.index().map(PrefixIndex::root);
        if let Some(arc) = arc {
            self.set_arc(0, arc);
        }
        self.cur = STATIC_FRAME;
        let root_code = self.dict.root_code().clone();
        self.cur = self.push_frame_code(arc, &root_code, 0)?;
        Ok(())
    }

    /// Descend from the sub-block entry just scanned to its first term.
    fn descend_to_first_term(&mut self) -> Result<()> {
        loop {
            let sub_fp = self.frames[self.cur]
                .last_sub_fp
                .ok_or_else(|| Error::Internal("descending without a sub-block".into()))?;
            let length = self.term.len();
            self.cur = self.push_frame_fp(None, sub_fp, length)?;
            let frame = &mut self.frames[self.cur];
            frame.is_floor = false;
            frame.load_block(&mut self.input)?;
            if !frame.next(&mut self.term)? {
                self.term_exists = true;
                return Ok(());
            }
        }
    }

    /// Step to the next term; false once the field is exhausted.
    fn advance(&mut self) -> Result<bool> {
        if self.cur == STATIC_FRAME {
            self.push_root()?;
            self.frames[self.cur].load_block(&mut self.input)?;
        }
        self.target_before_current_length = self.cur as isize - 1;
        self.frames[self.cur].load_block(&mut self.input)?;

        while self.frames[self.cur].is_exhausted() {
            let frame = &mut self.frames[self.cur];
            if !frame.block.is_last_in_floor {
                frame.load_next_floor_block(&mut self.input)?;
                continue;
            }
            if self.cur == 1 {
                self.term.set_len(0);
                self.valid_index_prefix = 0;
                self.frames[1].rewind()?;
                self.term_exists = false;
                return Ok(false);
            }
            let last_fp = frame.fp_orig;
            self.cur -= 1;
            let parent = &mut self.frames[self.cur];
            if !parent.loaded || parent.last_sub_fp != Some(last_fp) {
                // parent was pushed by a seek and never scanned
                parent.scan_to_floor_frame(self.term.as_slice())?;
                parent.load_block(&mut self.input)?;
                parent.scan_to_sub_block(last_fp)?;
            }
            self.valid_index_prefix = self.valid_index_prefix.min(parent.prefix);
        }

        if self.frames[self.cur].next(&mut self.term)? {
            self.descend_to_first_term()?;
        } else {
            self.term_exists = true;
        }
        Ok(true)
    }

    /// Replay the cached index path shared by the current term and `target`.
    ///
    /// Returns `None` if the cursor already sits on `target`; otherwise the
    /// arc and target offset from which the index walk continues, with the
    /// current frame set to the deepest reusable one.
    fn seek_prefix(&mut self, index: &PrefixIndex, target: &[u8]) -> Result<Option<(IndexArc, usize)>> {
        self.target_before_current_length = self.cur as isize - 1;

        if self.cur == STATIC_FRAME {
            self.target_before_current_length = -1;
            self.push_root()?;
            return Ok(Some((index.root(), 0)));
        }

        let mut arc = self.arcs[0];
        let mut target_upto = 0;
        let mut last_frame = 1;
        let target_limit = target.len().min(self.valid_index_prefix);
        let mut cmp = std::cmp::Ordering::Equal;
        while target_upto < target_limit {
            cmp = self.term.byte(target_upto).cmp(&target[target_upto]);
            if cmp.is_ne() {
                break;
            }
            arc = *self
                .arcs
                .get(1 + target_upto)
                .ok_or_else(|| Error::Internal("cached index path shorter than its valid prefix".into()))?;
            if arc.is_final() {
                last_frame += 1;
            }
            target_upto += 1;
        }

        if cmp.is_eq() {
            let target_upto_mid = target_upto;
            let target_limit = target.len().min(self.term.len());
            while target_upto < target_limit {
                cmp = self.term.byte(target_upto).cmp(&target[target_upto]);
                if cmp.is_ne() {
                    break;
                }
                target_upto += 1;
            }
            if cmp.is_eq() {
                cmp = self.term.len().cmp(&target.len());
            }
            target_upto = target_upto_mid;
        }

        match cmp {
            std::cmp::Ordering::Less => {
                // target is after the current term: frames up to last_frame stay positioned
                self.cur = last_frame;
            }
            std::cmp::Ordering::Greater => {
                self.target_before_current_length = 0;
                self.cur = last_frame;
                self.frames[self.cur].rewind()?;
            }
            std::cmp::Ordering::Equal => {
                if self.term_exists {
                    return Ok(None);
                }
            }
        }
        Ok(Some((arc, target_upto)))
    }

    fn seek_exact_inner(&mut self, index: &PrefixIndex, target: &[u8]) -> Result<bool> {
        let Some((mut arc, mut target_upto)) = self.seek_prefix(index, target)? else {
            return Ok(true);
        };

        while target_upto < target.len() {
            let label = target[target_upto];
            match index.find_target_arc(label, &arc) {
                Some(next) => {
                    arc = next;
                    self.set_arc(1 + target_upto, arc);
                    self.term.set_byte(target_upto, label);
                    target_upto += 1;
                    if arc.is_final() {
                        let code = index.output(&arc)?;
                        self.cur = self.push_frame_code(Some(arc), &code, target_upto)?;
                    }
                }
                None => {
                    self.valid_index_prefix = self.frames[self.cur].prefix;
                    let frame = &mut self.frames[self.cur];
                    frame.scan_to_floor_frame(target)?;
                    if !frame.has_terms {
                        self.term_exists = false;
                        self.term.set_byte(target_upto, label);
                        self.term.set_len(target_upto + 1);
                        return Ok(false);
                    }
                    frame.load_block(&mut self.input)?;
                    let status = frame.scan_to_term(target, true, &mut self.term, &mut self.term_exists)?;
                    return Ok(status == SeekStatus::Found);
                }
            }
        }

        self.valid_index_prefix = self.frames[self.cur].prefix;
        let frame = &mut self.frames[self.cur];
        frame.scan_to_floor_frame(target)?;
        if !frame.has_terms {
            self.term_exists = false;
            self.term.set_len(target_upto);
            return Ok(false);
        }
        frame.load_block(&mut self.input)?;
        let status = frame.scan_to_term(target, true, &mut self.term, &mut self.term_exists)?;
        Ok(status == SeekStatus::Found)
    }

    fn seek_ceil_inner(&mut self, index: &PrefixIndex, target: &[u8]) -> Result<SeekStatus> {
        let Some((mut arc, mut target_upto)) = self.seek_prefix(index, target)? else {
            return Ok(SeekStatus::Found);
        };

        while target_upto < target.len() {
            let label = target[target_upto];
            match index.find_target_arc(label, &arc) {
                Some(next) => {
                    arc = next;
                    self.set_arc(1 + target_upto, arc);
                    self.term.set_byte(target_upto, label);
                    target_upto += 1;
                    if arc.is_final() {
                        let code = index.output(&arc)?;
                        self.cur = self.push_frame_code(Some(arc), &code, target_upto)?;
                    }
                }
                None => return self.scan_ceil(target),
            }
        }
        self.scan_ceil(target)
    }

    fn scan_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        self.valid_index_prefix = self.frames[self.cur].prefix;
        let frame = &mut self.frames[self.cur];
        frame.scan_to_floor_frame(target)?;
        frame.load_block(&mut self.input)?;
        match frame.scan_to_term(target, false, &mut self.term, &mut self.term_exists)? {
            SeekStatus::End => {
                self.term.copy_from(target);
                self.term_exists = false;
                if self.advance()? {
                    Ok(SeekStatus::NotFound)
                } else {
                    Ok(SeekStatus::End)
                }
            }
            SeekStatus::NotFound if !self.term_exists => {
                self.descend_to_first_term()?;
                Ok(SeekStatus::NotFound)
            }
            status => Ok(status),
        }
    }

    fn ensure_positioned(&self) -> Result<()> {
        let positioned = if self.cur == STATIC_FRAME {
            self.pending_target.is_some()
        } else {
            !self.eof && self.pending_target.is_none()
        };
        if !positioned {
            return Err(Error::InvalidArgument("cursor is not positioned on a term".into()));
        }
        Ok(())
    }

    /// Decode stats and postings metadata up to the current term.
    ///
    /// Idempotent: repeated calls at the same position decode nothing more.
    pub fn decode_metadata(&mut self) -> Result<()> {
        self.ensure_positioned()?;
        let dict = self.dict;
        self.frames[self.cur].decode_metadata(dict)
    }

    /// Position on `target` using a state previously returned by
    /// [`TermCursor::term_state`], without touching the terms file.
    ///
    /// A following `next` re-seeks to `target` and continues after it.
    pub fn seek_exact_with_state(&mut self, target: &[u8], state: &BlockTermState<P::TermState>) {
        // a failed seek_exact leaves a scanned entry in `term` with a target still pending
        if target == self.term.as_slice() && self.term_exists && !self.eof && self.pending_target.is_none() {
            return;
        }
        self.cur = STATIC_FRAME;
        let frame = &mut self.frames[STATIC_FRAME];
        frame.state = state.clone();
        frame.metadata_upto = frame.term_block_ord();
        self.term.copy_from(target);
        self.term_exists = true;
        self.valid_index_prefix = 0;
        self.eof = false;
        self.pending_target = Some(target.to_vec());
    }

    /// Walk every block of the field. Consumes the cursor.
    pub(crate) fn compute_stats(mut self) -> Result<BlockStats> {
        let mut stats = BlockStats::new(&self.dict.field_info().name);
        if let Some(index) = self.dict.index() {
            let (nodes, arcs) = index.node_and_arc_count();
            stats.index_node_count = nodes;
            stats.index_arc_count = arcs;
            stats.index_num_bytes = index.fst_size();
        }

        self.target_before_current_length = -1;
        self.push_root()?;
        let root = &mut self.frames[self.cur];
        root.load_block(&mut self.input)?;
        stats.start_block(root, !root.block.is_last_in_floor);

        loop {
            while self.frames[self.cur].is_exhausted() {
                let frame = &mut self.frames[self.cur];
                stats.end_block(frame)?;
                if !frame.block.is_last_in_floor {
                    frame.load_next_floor_block(&mut self.input)?;
                    stats.start_block(frame, true);
                } else if self.cur == 1 {
                    stats.finish();
                    return Ok(stats);
                } else {
                    self.cur -= 1;
                }
            }

            loop {
                let cur = self.cur;
                if self.frames[cur].next(&mut self.term)? {
                    let sub_fp = self.frames[cur]
                        .last_sub_fp
                        .ok_or_else(|| Error::Internal("sub-block entry without a pointer".into()))?;
                    let length = self.term.len();
                    self.cur = self.push_frame_fp(None, sub_fp, length)?;
                    let frame = &mut self.frames[self.cur];
                    frame.is_floor = false;
                    frame.load_block(&mut self.input)?;
                    stats.start_block(frame, !frame.block.is_last_in_floor);
                } else {
                    stats.term(self.term.as_slice());
                    break;
                }
            }
        }
    }
}

impl<P: PostingsReaderBase> TermCursor for DictionaryCursor<'_, P> {
    type TermState = P::TermState;

    fn next(&mut self) -> Result<Option<&[u8]>> {
        if let Some(target) = self.pending_target.take() {
            self.cur = STATIC_FRAME;
            match self.seek_ceil(&target)? {
                SeekStatus::Found => {}
                SeekStatus::NotFound => return Ok(Some(self.term.as_slice())),
                SeekStatus::End => return Ok(None),
            }
        }
        if self.eof {
            return Ok(None);
        }
        if self.advance()? {
            Ok(Some(self.term.as_slice()))
        } else {
            self.eof = true;
            Ok(None)
        }
    }

    fn term(&self) -> &[u8] {
        self.term.as_slice()
    }

    fn doc_freq(&mut self) -> Result<u32> {
        self.decode_metadata()?;
        Ok(self.frames[self.cur].state.doc_freq)
    }

    fn total_term_freq(&mut self) -> Result<i64> {
        self.decode_metadata()?;
        Ok(self.frames[self.cur].state.total_term_freq)
    }

    fn term_state(&mut self) -> Result<BlockTermState<P::TermState>> {
        self.decode_metadata()?;
        Ok(self.frames[self.cur].state.clone())
    }

    fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        let index = self.index()?;
        self.pending_target = None;
        self.eof = false;
        let found = self.seek_exact_inner(index, target)?;
        if !found {
            self.pending_target = Some(target.to_vec());
        }
        Ok(found)
    }

    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let index = self.index()?;
        self.pending_target = None;
        self.eof = false;
        let status = self.seek_ceil_inner(index, target)?;
        if status == SeekStatus::End {
            self.eof = true;
        }
        Ok(status)
    }
}
