//! Write path: assigns sorted terms to blocks and builds the prefix index.
//!
//! Block boundaries follow the trie of the term stream. Each trie node is
//! "frozen" once the incoming terms have moved past its prefix; a frozen
//! node whose subtree holds at least `min_items_in_block` pending entries
//! becomes a block (or a floor chain when it holds more than
//! `max_items_in_block`), and is replaced by a single sub-block entry in its
//! parent. Smaller subtrees are left pending and merge into an ancestor.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use super::index::{IndexFragment, PrefixIndex};
use super::{
    BlockTreeConfig, TERMS_CODEC_NAME, TERMS_INDEX_CODEC_NAME, VERSION_CHECKSUM, encode_output,
};
use crate::error::{Error, Result};
use crate::field::FieldInfo;
use crate::postings::{BlockTermState, PostingsWriterBase, TermStats};
use crate::store::{CountingWriter, common_prefix_len, write_footer, write_header, write_vint};

/// Directory entry for a finished field.
struct FieldMetaData {
    number: u32,
    has_freqs: bool,
    num_terms: u64,
    root_code: Vec<u8>,
    sum_total_term_freq: i64,
    sum_doc_freq: u64,
    doc_count: u32,
    longs_size: usize,
    index_start_fp: u64,
}

/// Aggregates returned when a field is finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSummary {
    pub num_terms: u64,
    pub sum_doc_freq: u64,
    /// -1 for docs-only fields.
    pub sum_total_term_freq: i64,
    pub doc_count: u32,
    /// Output code of the root block.
    pub root_code: Vec<u8>,
    pub block_count: usize,
    pub floor_block_count: usize,
}

/// Segment-level writer producing the terms and index files.
///
/// Fields are added one at a time in ascending name order through
/// [`add_field`](Self::add_field); [`finish`](Self::finish) writes the field
/// directory, trailers and footers and hands back both sinks.
pub struct BlockTreeTermsWriter<W: Write, P: PostingsWriterBase> {
    out: CountingWriter<W>,
    index_out: CountingWriter<W>,
    postings: P,
    config: BlockTreeConfig,
    fields: Vec<FieldMetaData>,
    last_field: Option<String>,
}

impl<W: Write, P: PostingsWriterBase> BlockTreeTermsWriter<W, P> {
    pub fn new(terms_out: W, index_out: W, mut postings: P, config: BlockTreeConfig) -> Result<Self> {
        config.validate()?;
        let mut out = CountingWriter::new(terms_out);
        let mut index_out = CountingWriter::new(index_out);
        write_header(&mut out, TERMS_CODEC_NAME, config.format_version)?;
        write_header(&mut index_out, TERMS_INDEX_CODEC_NAME, config.format_version)?;
        postings.init(&mut out)?;
        Ok(Self {
            out,
            index_out,
            postings,
            config,
            fields: Vec::new(),
            last_field: None,
        })
    }

    pub fn config(&self) -> &BlockTreeConfig {
        &self.config
    }

    /// Start writing terms for `field`.
    pub fn add_field(&mut self, field: &FieldInfo) -> Result<FieldWriter<'_, W, P>> {
        if let Some(last) = &self.last_field
            && last.as_str() >= field.name.as_str()
        {
            return Err(Error::InvalidArgument(format!(
                "fields must be added in ascending name order: {:?} after {:?}",
                field.name, last
            )));
        }
        self.last_field = Some(field.name.clone());
        let longs_size = self.postings.set_field(field);
        Ok(FieldWriter::new(self, field.clone(), longs_size))
    }

    /// Write the field directory and footers; returns the terms and index sinks.
    pub fn finish(mut self) -> Result<(W, W)> {
        let dir_start = self.out.position();
        let index_dir_start = self.index_out.position();

        write_vint(&mut self.out, self.fields.len() as u64)?;
        for field in &self.fields {
            write_vint(&mut self.out, field.number as u64)?;
            write_vint(&mut self.out, field.num_terms)?;
            write_vint(&mut self.out, field.root_code.len() as u64)?;
            self.out.write_all(&field.root_code)?;
            if field.has_freqs {
                write_vint(&mut self.out, field.sum_total_term_freq as u64)?;
            }
            write_vint(&mut self.out, field.sum_doc_freq)?;
            write_vint(&mut self.out, field.doc_count as u64)?;
            write_vint(&mut self.out, field.longs_size as u64)?;
            write_vint(&mut self.index_out, field.index_start_fp)?;
        }

        self.out.write_u64::<LittleEndian>(dir_start)?;
        self.index_out.write_u64::<LittleEndian>(index_dir_start)?;
        if self.config.format_version >= VERSION_CHECKSUM {
            write_footer(&mut self.out)?;
            write_footer(&mut self.index_out)?;
        }
        self.out.flush()?;
        self.index_out.flush()?;

        log::debug!(
            "block tree terms: wrote {} fields, terms={} bytes, index={} bytes",
            self.fields.len(),
            self.out.position(),
            self.index_out.position()
        );
        Ok((self.out.into_inner(), self.index_out.into_inner()))
    }
}

enum PendingEntry<S> {
    Term(PendingTerm<S>),
    Block(PendingBlock),
}

struct PendingTerm<S> {
    term: Vec<u8>,
    state: BlockTermState<S>,
}

struct PendingBlock {
    /// Index prefix: the shared prefix, plus the lead byte for follow-on
    /// floor blocks.
    prefix: Vec<u8>,
    fp: u64,
    has_terms: bool,
    is_floor: bool,
    floor_lead_byte: Option<u8>,
    /// Compiled index of this block and everything below it.
    index: Option<IndexFragment>,
    /// Compiled indexes of the sub-blocks referenced from this block.
    sub_indices: Vec<IndexFragment>,
}

impl PendingBlock {
    fn compile_index(&mut self, floor_blocks: &mut [PendingBlock]) -> Result<()> {
        debug_assert!(self.is_floor == !floor_blocks.is_empty());
        let mut code = Vec::new();
        write_vint(&mut code, encode_output(self.fp, self.has_terms, self.is_floor))?;
        if self.is_floor {
            write_vint(&mut code, floor_blocks.len() as u64)?;
            for sub in floor_blocks.iter() {
                debug_assert!(sub.floor_lead_byte.is_some());
                debug_assert!(sub.fp > self.fp);
                code.push(sub.floor_lead_byte.unwrap_or_default());
                write_vint(&mut code, ((sub.fp - self.fp) << 1) | sub.has_terms as u64)?;
            }
        }

        let mut fragment = vec![(self.prefix.clone(), code)];
        for sub in floor_blocks.iter_mut() {
            for sub_index in sub.sub_indices.drain(..) {
                fragment.extend(sub_index);
            }
        }
        for sub_index in self.sub_indices.drain(..) {
            fragment.extend(sub_index);
        }
        self.index = Some(fragment);
        Ok(())
    }
}

/// Per-depth state of the trie being frozen.
#[derive(Debug, Clone, Copy, Default)]
struct FrontierNode {
    is_final: bool,
    /// Pending-entry counts handed up by frozen children.
    child_count: usize,
}

/// Streams the terms of one field into blocks.
pub struct FieldWriter<'a, W: Write, P: PostingsWriterBase> {
    parent: &'a mut BlockTreeTermsWriter<W, P>,
    field: FieldInfo,
    has_freqs: bool,
    longs_size: usize,
    min_items: usize,
    max_items: usize,

    num_terms: u64,
    sum_doc_freq: u64,
    sum_total_term_freq: i64,
    block_count: usize,
    floor_block_count: usize,

    pending: Vec<PendingEntry<P::TermState>>,
    /// Index into `pending` of the most recent block, if any entry at or
    /// after it may still be a block.
    last_block_index: Option<usize>,
    frontier: Vec<FrontierNode>,
    last_term: Vec<u8>,

    suffix_writer: Vec<u8>,
    stats_writer: Vec<u8>,
    meta_writer: Vec<u8>,
    bytes_writer: Vec<u8>,
    longs: Vec<u64>,
}

impl<'a, W: Write, P: PostingsWriterBase> FieldWriter<'a, W, P> {
    fn new(parent: &'a mut BlockTreeTermsWriter<W, P>, field: FieldInfo, longs_size: usize) -> Self {
        let min_items = parent.config.min_items_in_block;
        let max_items = parent.config.max_items_in_block;
        Self {
            parent,
            has_freqs: field.has_freqs(),
            field,
            longs_size,
            min_items,
            max_items,
            num_terms: 0,
            sum_doc_freq: 0,
            sum_total_term_freq: 0,
            block_count: 0,
            floor_block_count: 0,
            pending: Vec::new(),
            last_block_index: None,
            frontier: vec![FrontierNode::default()],
            last_term: Vec::new(),
            suffix_writer: Vec::new(),
            stats_writer: Vec::new(),
            meta_writer: Vec::new(),
            bytes_writer: Vec::new(),
            longs: vec![0; longs_size],
        }
    }

    pub fn field(&self) -> &FieldInfo {
        &self.field
    }

    pub fn num_terms(&self) -> u64 {
        self.num_terms
    }

    /// Add the next term. Terms must arrive in strictly ascending byte order.
    pub fn add_term(&mut self, term: &[u8], stats: TermStats, postings: P::TermState) -> Result<()> {
        if self.num_terms > 0 && term <= self.last_term.as_slice() {
            return Err(Error::InvalidArgument(format!(
                "terms out of order in field {:?}: {:?} after {:?}",
                self.field.name,
                String::from_utf8_lossy(term),
                String::from_utf8_lossy(&self.last_term)
            )));
        }
        if stats.doc_freq == 0 {
            return Err(Error::InvalidArgument(format!(
                "docFreq must be > 0 for term {:?}",
                String::from_utf8_lossy(term)
            )));
        }
        if self.has_freqs {
            if stats.total_term_freq < stats.doc_freq as i64 {
                return Err(Error::InvalidArgument(format!(
                    "totalTermFreq {} < docFreq {}",
                    stats.total_term_freq, stats.doc_freq
                )));
            }
        } else if stats.total_term_freq != -1 {
            return Err(Error::InvalidArgument(format!(
                "field {:?} does not track frequencies; totalTermFreq must be -1",
                self.field.name
            )));
        }

        if self.num_terms > 0 {
            let lcp = common_prefix_len(&self.last_term, term);
            self.freeze_tail(lcp + 1)?;
        }

        if self.frontier.len() <= term.len() {
            self.frontier.resize(term.len() + 1, FrontierNode::default());
        }
        let lcp = common_prefix_len(&self.last_term, term);
        for node in &mut self.frontier[lcp + 1..=term.len()] {
            *node = FrontierNode::default();
        }
        self.frontier[term.len()].is_final = true;

        let mut state = self.parent.postings.new_term_state();
        state.doc_freq = stats.doc_freq;
        state.total_term_freq = stats.total_term_freq;
        state.postings = postings;
        self.pending.push(PendingEntry::Term(PendingTerm {
            term: term.to_vec(),
            state,
        }));

        self.sum_doc_freq += stats.doc_freq as u64;
        if self.has_freqs {
            self.sum_total_term_freq += stats.total_term_freq;
        }
        self.num_terms += 1;
        self.last_term.clear();
        self.last_term.extend_from_slice(term);
        Ok(())
    }

    /// Freeze trie nodes of the previous term deeper than `prefix_len_plus1 - 1`.
    fn freeze_tail(&mut self, prefix_len_plus1: usize) -> Result<()> {
        for idx in (prefix_len_plus1..=self.last_term.len()).rev() {
            let node = self.frontier[idx];
            let total = node.is_final as usize + node.child_count;
            let count_to_parent = if total >= self.min_items || idx == 0 {
                self.write_blocks(idx, total)?;
                1
            } else {
                total
            };
            self.frontier[idx] = FrontierNode::default();
            if idx > 0 {
                self.frontier[idx - 1].child_count += count_to_parent;
            }
        }
        Ok(())
    }

    /// Replace the last `count` pending entries, all sharing the first
    /// `prefix_length` bytes of the previous term, by one block entry.
    fn write_blocks(&mut self, prefix_length: usize, count: usize) -> Result<()> {
        debug_assert!(count > 0 && count <= self.pending.len());
        debug_assert!(prefix_length > 0 || count == self.pending.len());
        let prefix = self.last_term[..prefix_length].to_vec();

        if prefix_length == 0 || count <= self.max_items {
            let mut block = self.write_block(&prefix, prefix_length, count, count, false, None, true)?;
            block.compile_index(&mut [])?;
            self.pending.push(PendingEntry::Block(block));
        } else {
            // runs of entries sharing the first suffix byte; None = term equal to the prefix
            let mut runs: Vec<(Option<u8>, usize)> = Vec::new();
            for entry in &self.pending[self.pending.len() - count..] {
                let label = match entry {
                    PendingEntry::Term(t) => t.term.get(prefix_length).copied(),
                    PendingEntry::Block(b) => {
                        debug_assert!(b.prefix.len() > prefix_length);
                        b.prefix.get(prefix_length).copied()
                    }
                };
                match runs.last_mut() {
                    Some((last, n)) if *last == label => *n += 1,
                    _ => runs.push((label, 1)),
                }
            }

            // Greedy segmentation; the remainder may end up below min_items.
            let mut first_block: Option<PendingBlock> = None;
            let mut floor_blocks = Vec::new();
            let mut pending_count = 0;
            let mut cur_start = count;
            let mut sub_count = 0;
            let mut start_label: Option<u8> = None;
            for (sub, &(_, run_len)) in runs.iter().enumerate() {
                pending_count += run_len;
                sub_count += 1;
                if pending_count < self.min_items {
                    continue;
                }
                let mut index_prefix = prefix.clone();
                index_prefix.extend(start_label);
                let block = self.write_block(
                    &index_prefix,
                    prefix_length,
                    cur_start,
                    pending_count,
                    true,
                    start_label,
                    cur_start == pending_count,
                )?;
                match first_block {
                    None => first_block = Some(block),
                    Some(_) => floor_blocks.push(block),
                }
                cur_start -= pending_count;
                pending_count = 0;
                debug_assert!(
                    self.min_items == 1 || sub_count > 1,
                    "floor block from a single label run: min={} prefix_len={}",
                    self.min_items,
                    prefix_length
                );
                sub_count = 0;
                start_label = runs.get(sub + 1).and_then(|(label, _)| *label);

                if cur_start == 0 {
                    break;
                }
                if cur_start <= self.max_items {
                    debug_assert!(start_label.is_some());
                    let mut index_prefix = prefix.clone();
                    index_prefix.extend(start_label);
                    floor_blocks.push(self.write_block(
                        &index_prefix,
                        prefix_length,
                        cur_start,
                        cur_start,
                        true,
                        start_label,
                        true,
                    )?);
                    break;
                }
            }

            let Some(mut first_block) = first_block else {
                return Err(Error::Internal(format!(
                    "floor split of {} entries at prefix length {} wrote no block",
                    count, prefix_length
                )));
            };
            first_block.compile_index(&mut floor_blocks)?;
            self.floor_block_count += 1 + floor_blocks.len();
            self.pending.push(PendingEntry::Block(first_block));
        }

        self.last_block_index = Some(self.pending.len() - 1);
        Ok(())
    }

    /// Serialize `length` pending entries starting `start_backwards` from the
    /// end of the pending stack and remove them.
    #[allow(clippy::too_many_arguments)]
    fn write_block(
        &mut self,
        index_prefix: &[u8],
        prefix_length: usize,
        start_backwards: usize,
        length: usize,
        is_floor: bool,
        floor_lead_byte: Option<u8>,
        is_last_in_floor: bool,
    ) -> Result<PendingBlock> {
        debug_assert!(length > 0);
        let start = self.pending.len() - start_backwards;
        debug_assert!(start + length <= self.pending.len());
        let end = start + length;
        let start_fp = self.parent.out.position();

        let is_leaf_block = match self.last_block_index {
            Some(last) if last >= start => {
                is_floor
                    && !self.pending[start..end]
                        .iter()
                        .any(|e| matches!(e, PendingEntry::Block(_)))
            }
            _ => true,
        };

        write_vint(&mut self.parent.out, ((length as u64) << 1) | is_last_in_floor as u64)?;

        let mut sub_indices = Vec::new();
        let mut term_count = 0usize;
        let mut absolute = true;
        for entry in self.pending.drain(start..end) {
            match entry {
                PendingEntry::Term(t) => {
                    let suffix = &t.term[prefix_length..];
                    if is_leaf_block {
                        write_vint(&mut self.suffix_writer, suffix.len() as u64)?;
                    } else {
                        write_vint(&mut self.suffix_writer, (suffix.len() as u64) << 1)?;
                    }
                    self.suffix_writer.extend_from_slice(suffix);

                    write_vint(&mut self.stats_writer, t.state.doc_freq as u64)?;
                    if self.has_freqs {
                        let extra = t.state.total_term_freq - t.state.doc_freq as i64;
                        write_vint(&mut self.stats_writer, extra as u64)?;
                    }

                    self.longs.iter_mut().for_each(|l| *l = 0);
                    self.bytes_writer.clear();
                    self.parent.postings.encode_term(
                        &mut self.longs,
                        &mut self.bytes_writer,
                        &self.field,
                        &t.state,
                        absolute,
                    )?;
                    for &value in &self.longs {
                        write_vint(&mut self.meta_writer, value)?;
                    }
                    self.meta_writer.extend_from_slice(&self.bytes_writer);
                    absolute = false;
                    term_count += 1;
                }
                PendingEntry::Block(block) => {
                    debug_assert!(!is_leaf_block);
                    let suffix = &block.prefix[prefix_length..];
                    debug_assert!(!suffix.is_empty());
                    write_vint(&mut self.suffix_writer, ((suffix.len() as u64) << 1) | 1)?;
                    self.suffix_writer.extend_from_slice(suffix);
                    debug_assert!(block.fp < start_fp);
                    write_vint(&mut self.suffix_writer, start_fp - block.fp)?;
                    sub_indices.extend(block.index);
                }
            }
        }

        let out = &mut self.parent.out;
        write_vint(out, ((self.suffix_writer.len() as u64) << 1) | is_leaf_block as u64)?;
        out.write_all(&self.suffix_writer)?;
        write_vint(out, self.stats_writer.len() as u64)?;
        out.write_all(&self.stats_writer)?;
        write_vint(out, self.meta_writer.len() as u64)?;
        out.write_all(&self.meta_writer)?;
        self.suffix_writer.clear();
        self.stats_writer.clear();
        self.meta_writer.clear();

        if let Some(last) = self.last_block_index
            && last >= start
        {
            self.last_block_index = Some(if last < end { start } else { last - length });
        }
        self.block_count += 1;

        Ok(PendingBlock {
            prefix: index_prefix.to_vec(),
            fp: start_fp,
            has_terms: term_count != 0,
            is_floor,
            floor_lead_byte,
            index: None,
            sub_indices,
        })
    }

    /// Flush remaining blocks, write the prefix index and record the field.
    /// `doc_count` is the number of documents with at least one term.
    pub fn finish(mut self, doc_count: u32) -> Result<FieldSummary> {
        if self.num_terms == 0 {
            if doc_count != 0 {
                return Err(Error::InvalidArgument(format!(
                    "field {:?} has no terms but docCount={}",
                    self.field.name, doc_count
                )));
            }
            return Ok(FieldSummary {
                num_terms: 0,
                sum_doc_freq: 0,
                sum_total_term_freq: if self.has_freqs { 0 } else { -1 },
                doc_count: 0,
                root_code: Vec::new(),
                block_count: 0,
                floor_block_count: 0,
            });
        }
        if doc_count == 0 || doc_count as u64 > self.sum_doc_freq {
            return Err(Error::InvalidArgument(format!(
                "docCount {} must be in 1..={} (sumDocFreq) for field {:?}",
                doc_count, self.sum_doc_freq, self.field.name
            )));
        }

        self.freeze_tail(0)?;
        debug_assert_eq!(self.pending.len(), 1);
        let root = match self.pending.pop() {
            Some(PendingEntry::Block(root)) if self.pending.is_empty() => root,
            _ => {
                return Err(Error::Internal(format!(
                    "field {:?} did not reduce to a single root block",
                    self.field.name
                )));
            }
        };
        debug_assert!(root.prefix.is_empty());
        let fragment = root
            .index
            .ok_or_else(|| Error::Internal("root block index was not compiled".into()))?;
        let root_code = fragment[0].1.clone();
        let index_prefixes = fragment.len();

        let index_start_fp = self.parent.index_out.position();
        let index_bytes = PrefixIndex::build(fragment)?;
        self.parent.index_out.write_all(&index_bytes)?;

        let sum_total_term_freq = if self.has_freqs { self.sum_total_term_freq } else { -1 };
        log::debug!(
            "field {:?}: {} terms in {} blocks ({} floor), {} indexed prefixes, index {} bytes",
            self.field.name,
            self.num_terms,
            self.block_count,
            self.floor_block_count,
            index_prefixes,
            index_bytes.len()
        );

        self.parent.fields.push(FieldMetaData {
            number: self.field.number,
            has_freqs: self.has_freqs,
            num_terms: self.num_terms,
            root_code: root_code.clone(),
            sum_total_term_freq,
            sum_doc_freq: self.sum_doc_freq,
            doc_count,
            longs_size: self.longs_size,
            index_start_fp,
        });

        Ok(FieldSummary {
            num_terms: self.num_terms,
            sum_doc_freq: self.sum_doc_freq,
            sum_total_term_freq,
            doc_count,
            root_code,
            block_count: self.block_count,
            floor_block_count: self.floor_block_count,
        })
    }
}
