//! Forward-only enumeration of the terms accepted by an automaton.
//!
//! Walks the block tree depth-first like a plain cursor, but runs the
//! automaton alongside: a sub-block is only entered when the automaton
//! survives its prefix, and within a block the sorted transitions of the
//! frame's state let whole runs of entries (and whole floor blocks) be
//! skipped without stepping.

use super::cursor::{SeekStatus, TermCursor};
use super::frame::{BlockData, NO_FLOOR_LABEL, TermBuffer, sub_block_fp};
use super::index::{IndexArc, PrefixIndex};
use super::reader::FieldDictionary;
use super::{OUTPUT_FLAG_IS_FLOOR, OUTPUT_FLAGS_NUM_BITS};
use crate::automaton::CompiledAutomaton;
use crate::directories::OwnedBytes;
use crate::error::{Error, Result};
use crate::postings::{BlockTermState, PostingsReaderBase};
use crate::store::ByteCursor;

struct IntersectFrame<S> {
    ord: usize,
    fp: u64,
    fp_orig: u64,
    last_sub_fp: u64,
    prefix: usize,
    arc: IndexArc,

    block: BlockData,
    next_ent: usize,

    floor_data: ByteCursor,
    num_follow_floor_blocks: usize,
    next_floor_label: u16,

    /// Automaton state after the block prefix.
    state: usize,
    transition_index: usize,
    /// Upper bound of the current transition; -1 when the state has none.
    cur_transition_max: i32,

    metadata_upto: usize,
    term_state: BlockTermState<S>,
    longs: Vec<u64>,

    start_byte_pos: usize,
    suffix: usize,
}

/// Verdict on the entry just read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryMatch {
    /// A term the automaton accepts, or a sub-block it may match inside;
    /// carries the automaton state after the entry.
    Matched(usize),
    Rejected,
    /// No later entry of this frame can match.
    ExhaustBlock,
}

/// Scan position inside a loaded block, for stepping back one entry.
struct EntryMark {
    next_ent: usize,
    suffixes_pos: usize,
    start_byte_pos: usize,
    suffix: usize,
    last_sub_fp: u64,
    term_block_ord: usize,
}

impl<S: Clone + Default> IntersectFrame<S> {
    fn new(ord: usize, mut term_state: BlockTermState<S>, longs_size: usize) -> Self {
        term_state.total_term_freq = -1;
        Self {
            ord,
            fp: 0,
            fp_orig: 0,
            last_sub_fp: 0,
            prefix: 0,
            arc: IndexArc::default(),
            block: BlockData::default(),
            next_ent: 0,
            floor_data: ByteCursor::default(),
            num_follow_floor_blocks: 0,
            next_floor_label: NO_FLOOR_LABEL,
            state: 0,
            transition_index: 0,
            cur_transition_max: -1,
            metadata_upto: 0,
            term_state,
            longs: vec![0; longs_size],
            start_byte_pos: 0,
            suffix: 0,
        }
    }

    fn set_state(&mut self, automaton: &CompiledAutomaton, state: usize) {
        self.state = state;
        self.transition_index = 0;
        self.cur_transition_max = automaton
            .sorted_transitions(state)
            .first()
            .map_or(-1, |t| t.max as i32);
    }

    /// Load the block at `fp_orig`. With the block's output code, floor
    /// blocks whose labels all sort below the first transition are skipped.
    fn load(
        &mut self,
        input: &mut ByteCursor,
        automaton: &CompiledAutomaton,
        code: &OwnedBytes,
    ) -> Result<()> {
        self.num_follow_floor_blocks = 0;
        self.next_floor_label = NO_FLOOR_LABEL;
        self.floor_data = ByteCursor::new(code.clone());
        let value = self.floor_data.read_vint()?;
        if value >> OUTPUT_FLAGS_NUM_BITS != self.fp_orig {
            return Err(Error::Corruption(format!(
                "index code points at fp={} but the sub-block entry at fp={}",
                value >> OUTPUT_FLAGS_NUM_BITS,
                self.fp_orig
            )));
        }

        if let Some(first) = automaton.sorted_transitions(self.state).first()
            && value & OUTPUT_FLAG_IS_FLOOR != 0
        {
            self.num_follow_floor_blocks = self.floor_data.read_vint()? as usize;
            if self.num_follow_floor_blocks == 0 {
                return Err(Error::Corruption("floor block without follow-on blocks".into()));
            }
            self.next_floor_label = self.floor_data.read_u8()? as u16;
            // an accepting state still needs the prefix term from the first block
            if !automaton.is_accept(self.state) {
                while self.num_follow_floor_blocks != 0 && self.next_floor_label <= first.min as u16 {
                    self.advance_floor()?;
                }
            }
        }
        self.read_block(input, automaton)
    }

    fn advance_floor(&mut self) -> Result<()> {
        if self.num_follow_floor_blocks == 0 {
            return Err(Error::Corruption(format!(
                "floor data of block at fp={} ran out",
                self.fp_orig
            )));
        }
        let code = self.floor_data.read_vint()?;
        self.fp = self.fp_orig + (code >> 1);
        self.num_follow_floor_blocks -= 1;
        self.next_floor_label = if self.num_follow_floor_blocks != 0 {
            self.floor_data.read_u8()? as u16
        } else {
            NO_FLOOR_LABEL
        };
        Ok(())
    }

    fn load_next_floor_block(&mut self, input: &mut ByteCursor, automaton: &CompiledAutomaton) -> Result<()> {
        let min = automaton
            .sorted_transitions(self.state)
            .get(self.transition_index)
            .map_or(0, |t| t.min as u16);
        loop {
            self.advance_floor()?;
            if self.num_follow_floor_blocks == 0 || self.next_floor_label > min {
                break;
            }
        }
        self.read_block(input, automaton)
    }

    fn read_block(&mut self, input: &mut ByteCursor, automaton: &CompiledAutomaton) -> Result<()> {
        self.block = BlockData::read(input, self.fp)?;
        self.metadata_upto = 0;
        self.term_state.term_block_ord = 0;
        self.next_ent = 0;
        if automaton.sorted_transitions(self.state).is_empty() {
            // only an empty suffix can match; later floor blocks have none
            self.block.is_last_in_floor = true;
        }
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.next_ent == self.block.ent_count
    }

    /// Step over the next entry. Returns true if it is a sub-block.
    fn next(&mut self) -> Result<bool> {
        self.next_ent += 1;
        let code = self.block.suffixes.read_vint()?;
        if self.block.is_leaf_block {
            self.suffix = code as usize;
            self.start_byte_pos = self.block.suffixes.position();
            self.block.suffixes.skip(self.suffix)?;
            return Ok(false);
        }
        self.suffix = (code >> 1) as usize;
        self.start_byte_pos = self.block.suffixes.position();
        self.block.suffixes.skip(self.suffix)?;
        if code & 1 == 0 {
            self.term_state.term_block_ord += 1;
            Ok(false)
        } else {
            let sub_code = self.block.suffixes.read_vint()?;
            self.last_sub_fp = sub_block_fp(self.fp, sub_code)?;
            Ok(true)
        }
    }

    fn suffix_bytes(&self) -> &[u8] {
        &self.block.suffixes.bytes().as_slice()[self.start_byte_pos..self.start_byte_pos + self.suffix]
    }

    fn copy_term(&self, term: &mut TermBuffer) {
        term.write_at(self.prefix, self.suffix_bytes());
    }

    /// Run the automaton from the frame state over the current suffix.
    fn state_after_suffix(&self, automaton: &CompiledAutomaton) -> Option<usize> {
        self.suffix_bytes()
            .iter()
            .try_fold(self.state, |state, &b| automaton.step(state, b))
    }

    /// Test the entry just read against the automaton, cheapest checks first.
    fn check_entry(&mut self, automaton: &CompiledAutomaton, term: &TermBuffer, is_sub_block: bool) -> EntryMatch {
        if self.suffix != 0 {
            let label = self.suffix_bytes()[0] as i32;
            let transitions = automaton.sorted_transitions(self.state);
            while label > self.cur_transition_max {
                if self.transition_index + 1 >= transitions.len() {
                    return EntryMatch::ExhaustBlock;
                }
                self.transition_index += 1;
                self.cur_transition_max = transitions[self.transition_index].max as i32;
            }
        }

        if !is_sub_block
            && let Some(common) = automaton.common_suffix()
            && !ends_with(term, self.prefix, self.suffix_bytes(), common)
        {
            return EntryMatch::Rejected;
        }

        match self.state_after_suffix(automaton) {
            Some(state) if is_sub_block || automaton.is_accept(state) => EntryMatch::Matched(state),
            _ => EntryMatch::Rejected,
        }
    }

    fn mark(&self) -> EntryMark {
        EntryMark {
            next_ent: self.next_ent,
            suffixes_pos: self.block.suffixes.position(),
            start_byte_pos: self.start_byte_pos,
            suffix: self.suffix,
            last_sub_fp: self.last_sub_fp,
            term_block_ord: self.term_state.term_block_ord,
        }
    }

    fn reset_to(&mut self, mark: EntryMark) -> Result<()> {
        self.next_ent = mark.next_ent;
        self.block.suffixes.seek(mark.suffixes_pos as u64)?;
        self.start_byte_pos = mark.start_byte_pos;
        self.suffix = mark.suffix;
        self.last_sub_fp = mark.last_sub_fp;
        self.term_state.term_block_ord = mark.term_block_ord;
        Ok(())
    }

    fn decode_metadata<P>(&mut self, dict: &FieldDictionary<P>) -> Result<()>
    where
        P: PostingsReaderBase<TermState = S>,
    {
        let limit = if self.block.is_leaf_block {
            self.next_ent
        } else {
            self.term_state.term_block_ord
        };
        self.block.decode_metadata(
            dict,
            &mut self.term_state,
            &mut self.metadata_upto,
            &mut self.longs,
            limit,
        )
    }
}

/// True if `prefix` bytes of `term` followed by `suffix` end with `common`.
fn ends_with(term: &TermBuffer, prefix: usize, suffix: &[u8], common: &[u8]) -> bool {
    if prefix + suffix.len() < common.len() {
        return false;
    }
    match common.len().checked_sub(suffix.len()) {
        Some(in_prefix) if in_prefix > 0 => {
            let start = prefix - in_prefix;
            (0..in_prefix).all(|i| term.byte(start + i) == common[i]) && suffix == &common[in_prefix..]
        }
        _ => suffix.ends_with(common),
    }
}

/// Terms of one field accepted by a [`CompiledAutomaton`].
///
/// Enumeration only: seeks and ordinals are unsupported. Requires the
/// field's prefix index.
pub struct AutomatonIntersector<'a, P: PostingsReaderBase> {
    dict: &'a FieldDictionary<P>,
    index: &'a PrefixIndex,
    automaton: &'a CompiledAutomaton,
    input: ByteCursor,
    frames: Vec<IntersectFrame<P::TermState>>,
    cur: usize,
    term: TermBuffer,
    positioned: bool,
    eof: bool,
}

impl<'a, P: PostingsReaderBase> AutomatonIntersector<'a, P> {
    /// Start before the first accepted term, or right after `start_term`.
    pub fn new(
        dict: &'a FieldDictionary<P>,
        automaton: &'a CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<Self> {
        let index = dict
            .index()
            .ok_or_else(|| Error::Unsupported("intersect on a dictionary opened without its index".into()))?;
        let mut intersector = Self {
            dict,
            index,
            automaton,
            input: ByteCursor::new(dict.terms_bytes().clone()),
            frames: Vec::new(),
            cur: 0,
            term: TermBuffer::default(),
            positioned: false,
            eof: false,
        };
        intersector.ensure_frame(0);

        let root = &mut intersector.frames[0];
        root.fp = dict.root_block_fp();
        root.fp_orig = root.fp;
        root.prefix = 0;
        root.set_state(automaton, automaton.initial_state());
        root.arc = index.root();
        root.load(&mut intersector.input, automaton, dict.root_code())?;

        log::trace!(
            "intersecting field {:?} with a {}-state automaton",
            dict.field_info().name,
            automaton.num_states()
        );

        if let Some(start_term) = start_term {
            intersector.seek_to_start_term(start_term)?;
        }
        Ok(intersector)
    }

    fn ensure_frame(&mut self, ord: usize) {
        while self.frames.len() <= ord {
            let frame = IntersectFrame::new(
                self.frames.len(),
                self.dict.postings().new_term_state(),
                self.dict.longs_size(),
            );
            self.frames.push(frame);
        }
    }

    /// Enter the sub-block whose entry was just read, with the automaton in
    /// `state` after its prefix.
    fn push_frame(&mut self, state: usize) -> Result<()> {
        let parent = &self.frames[self.cur];
        let fp = parent.last_sub_fp;
        let prefix = parent.prefix + parent.suffix;
        let mut arc = parent.arc;
        for idx in parent.prefix..prefix {
            arc = self.index.find_target_arc(self.term.byte(idx), &arc).ok_or_else(|| {
                Error::Corruption(format!("sub-block at fp={} is missing from the index", fp))
            })?;
        }
        if !arc.is_final() {
            return Err(Error::Corruption(format!(
                "sub-block at fp={} is not indexed under its prefix",
                fp
            )));
        }
        let code = self.index.output(&arc)?;

        let ord = self.cur + 1;
        self.ensure_frame(ord);
        let frame = &mut self.frames[ord];
        debug_assert_eq!(frame.ord, ord);
        frame.fp = fp;
        frame.fp_orig = fp;
        frame.prefix = prefix;
        frame.arc = arc;
        frame.set_state(self.automaton, state);
        frame.load(&mut self.input, self.automaton, &code)?;
        self.cur = ord;
        Ok(())
    }

    /// Position so that enumeration continues with the first term after
    /// `target`.
    fn seek_to_start_term(&mut self, target: &[u8]) -> Result<()> {
        let automaton = self.automaton;
        for _ in 0..=target.len() {
            loop {
                let frame = &mut self.frames[self.cur];
                let mark = frame.mark();
                let is_sub_block = frame.next()?;
                frame.copy_term(&mut self.term);

                if is_sub_block && target.starts_with(self.term.as_slice()) {
                    // a dead sub-block holds nothing to return; step past it
                    if let Some(state) = frame.state_after_suffix(automaton) {
                        self.push_frame(state)?;
                        break;
                    }
                }

                let frame = &mut self.frames[self.cur];
                match self.term.as_slice().cmp(target) {
                    std::cmp::Ordering::Less => {
                        if frame.is_exhausted() {
                            if frame.block.is_last_in_floor {
                                return Ok(());
                            }
                            frame.load_next_floor_block(&mut self.input, automaton)?;
                        }
                    }
                    std::cmp::Ordering::Equal => return Ok(()),
                    std::cmp::Ordering::Greater => {
                        frame.reset_to(mark)?;
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<bool> {
        let automaton = self.automaton;
        loop {
            loop {
                let frame = &mut self.frames[self.cur];
                if !frame.is_exhausted() {
                    break;
                }
                if !frame.block.is_last_in_floor {
                    frame.load_next_floor_block(&mut self.input, automaton)?;
                } else if self.cur == 0 {
                    return Ok(false);
                } else {
                    self.cur -= 1;
                }
            }

            let frame = &mut self.frames[self.cur];
            let is_sub_block = frame.next()?;
            match frame.check_entry(automaton, &self.term, is_sub_block) {
                EntryMatch::Rejected => {}
                EntryMatch::ExhaustBlock => {
                    // every remaining label of the chain sorts higher still
                    frame.block.is_last_in_floor = true;
                    frame.next_ent = frame.block.ent_count;
                }
                EntryMatch::Matched(state) => {
                    frame.copy_term(&mut self.term);
                    if !is_sub_block {
                        return Ok(true);
                    }
                    self.push_frame(state)?;
                }
            }
        }
    }

    fn ensure_positioned(&self) -> Result<()> {
        if !self.positioned {
            return Err(Error::InvalidArgument("intersector is not positioned on a term".into()));
        }
        Ok(())
    }

    fn decode_metadata(&mut self) -> Result<()> {
        self.ensure_positioned()?;
        let dict = self.dict;
        self.frames[self.cur].decode_metadata(dict)
    }
}

impl<P: PostingsReaderBase> TermCursor for AutomatonIntersector<'_, P> {
    type TermState = P::TermState;

    fn next(&mut self) -> Result<Option<&[u8]>> {
        if self.eof {
            return Ok(None);
        }
        if self.advance()? {
            self.positioned = true;
            Ok(Some(self.term.as_slice()))
        } else {
            self.positioned = false;
            self.eof = true;
            Ok(None)
        }
    }

    fn term(&self) -> &[u8] {
        self.term.as_slice()
    }

    fn doc_freq(&mut self) -> Result<u32> {
        self.decode_metadata()?;
        Ok(self.frames[self.cur].term_state.doc_freq)
    }

    fn total_term_freq(&mut self) -> Result<i64> {
        self.decode_metadata()?;
        Ok(self.frames[self.cur].term_state.total_term_freq)
    }

    fn term_state(&mut self) -> Result<BlockTermState<P::TermState>> {
        self.decode_metadata()?;
        Ok(self.frames[self.cur].term_state.clone())
    }

    fn seek_exact(&mut self, _target: &[u8]) -> Result<bool> {
        Err(Error::Unsupported("seek on an automaton intersection".into()))
    }

    fn seek_ceil(&mut self, _target: &[u8]) -> Result<SeekStatus> {
        Err(Error::Unsupported("seek on an automaton intersection".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(bytes: &[u8]) -> TermBuffer {
        let mut term = TermBuffer::default();
        term.copy_from(bytes);
        term
    }

    #[test]
    fn test_ends_with_inside_suffix() {
        let term = buffer(b"ap");
        assert!(ends_with(&term, 2, b"plication", b"tion"));
        assert!(!ends_with(&term, 2, b"ple", b"tion"));
    }

    #[test]
    fn test_ends_with_spanning_prefix() {
        let term = buffer(b"actio");
        assert!(ends_with(&term, 5, b"n", b"tion"));
        assert!(!ends_with(&term, 5, b"m", b"tion"));
        let term = buffer(b"acxio");
        assert!(!ends_with(&term, 5, b"n", b"tion"));
    }

    #[test]
    fn test_ends_with_short_term() {
        let term = buffer(b"o");
        assert!(!ends_with(&term, 1, b"n", b"tion"));
        assert!(ends_with(&term, 0, b"", b""));
    }
}
