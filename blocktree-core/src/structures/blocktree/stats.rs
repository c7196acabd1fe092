//! Block statistics gathered by walking every block of a field.

use std::fmt;

use super::frame::Frame;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockStats {
    pub field: String,

    pub index_node_count: usize,
    pub index_arc_count: usize,
    pub index_num_bytes: usize,

    pub total_term_count: u64,
    pub total_term_bytes: u64,

    pub total_block_count: usize,
    pub non_floor_block_count: usize,
    /// Floor chains (counted once per chain).
    pub floor_block_count: usize,
    /// Blocks that are members of a floor chain.
    pub floor_sub_block_count: usize,
    pub leaf_block_count: usize,
    pub non_leaf_block_count: usize,
    pub mixed_block_count: usize,
    pub terms_only_block_count: usize,
    pub sub_blocks_only_block_count: usize,

    /// Blocks per prefix length.
    pub block_count_by_prefix_len: Vec<usize>,

    pub total_block_suffix_bytes: u64,
    pub total_block_stats_bytes: u64,
    /// Everything in a block besides suffixes and stats (headers, metadata).
    pub total_block_other_bytes: u64,

    start_block_count: usize,
    end_block_count: usize,
}

impl BlockStats {
    pub(crate) fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn start_block<S>(&mut self, frame: &Frame<S>, is_floor: bool) {
        self.total_block_count += 1;
        if is_floor {
            if frame.fp == frame.fp_orig {
                self.floor_block_count += 1;
            }
            self.floor_sub_block_count += 1;
        } else {
            self.non_floor_block_count += 1;
        }
        if frame.block.is_leaf_block {
            self.leaf_block_count += 1;
        } else {
            self.non_leaf_block_count += 1;
        }
        if self.block_count_by_prefix_len.len() <= frame.prefix {
            self.block_count_by_prefix_len.resize(frame.prefix + 1, 0);
        }
        self.block_count_by_prefix_len[frame.prefix] += 1;
        self.start_block_count += 1;
        self.total_block_suffix_bytes += frame.suffix_bytes_len() as u64;
        self.total_block_stats_bytes += frame.stats_bytes_len() as u64;
    }

    pub(crate) fn end_block<S>(&mut self, frame: &Frame<S>) -> Result<()> {
        let term_count = frame.term_block_ord();
        let sub_block_count = frame.block.ent_count.saturating_sub(term_count);
        self.total_term_count += term_count as u64;
        match (term_count != 0, sub_block_count != 0) {
            (true, true) => self.mixed_block_count += 1,
            (true, false) => self.terms_only_block_count += 1,
            (false, true) => self.sub_blocks_only_block_count += 1,
            (false, false) => {
                return Err(Error::Corruption(format!(
                    "empty block at fp={} in field {:?}",
                    frame.fp, self.field
                )));
            }
        }
        self.end_block_count += 1;
        let block_bytes = frame.block.fp_end - frame.fp;
        self.total_block_other_bytes += block_bytes
            - frame.suffix_bytes_len() as u64
            - frame.stats_bytes_len() as u64;
        Ok(())
    }

    pub(crate) fn term(&mut self, term: &[u8]) {
        self.total_term_bytes += term.len() as u64;
    }

    pub(crate) fn finish(&self) {
        debug_assert_eq!(self.start_block_count, self.end_block_count);
        debug_assert_eq!(self.total_block_count, self.floor_sub_block_count + self.non_floor_block_count);
    }
}

fn per(total: u64, count: u64) -> f64 {
    total as f64 / count as f64
}

impl fmt::Display for BlockStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "field {:?}:", self.field)?;
        writeln!(f, "  index FST:")?;
        writeln!(f, "    {} nodes", self.index_node_count)?;
        writeln!(f, "    {} arcs", self.index_arc_count)?;
        writeln!(f, "    {} bytes", self.index_num_bytes)?;
        writeln!(f, "  terms:")?;
        writeln!(f, "    {} terms", self.total_term_count)?;
        write!(f, "    {} bytes", self.total_term_bytes)?;
        if self.total_term_count != 0 {
            write!(f, " ({:.1} bytes/term)", per(self.total_term_bytes, self.total_term_count))?;
        }
        writeln!(f)?;

        let blocks = self.total_block_count as u64;
        writeln!(f, "  blocks:")?;
        writeln!(f, "    {} blocks", self.total_block_count)?;
        writeln!(f, "    {} terms-only blocks", self.terms_only_block_count)?;
        writeln!(f, "    {} sub-block-only blocks", self.sub_blocks_only_block_count)?;
        writeln!(f, "    {} mixed blocks", self.mixed_block_count)?;
        writeln!(f, "    {} leaf blocks", self.leaf_block_count)?;
        writeln!(f, "    {} non-leaf blocks", self.non_leaf_block_count)?;
        writeln!(f, "    {} floor blocks", self.floor_block_count)?;
        writeln!(f, "    {} non-floor blocks", self.total_block_count - self.floor_sub_block_count)?;
        writeln!(f, "    {} floor sub-blocks", self.floor_sub_block_count)?;
        for (total, what) in [
            (self.total_block_suffix_bytes, "term suffix"),
            (self.total_block_stats_bytes, "term stats"),
            (self.total_block_other_bytes, "other"),
        ] {
            write!(f, "    {} {} bytes", total, what)?;
            if blocks != 0 {
                write!(f, " ({:.1} bytes/block)", per(total, blocks))?;
            }
            writeln!(f)?;
        }
        if blocks != 0 {
            writeln!(f, "    by prefix length:")?;
            for (prefix, count) in self.block_count_by_prefix_len.iter().enumerate() {
                if *count != 0 {
                    writeln!(f, "      {:>2}: {}", prefix, count)?;
                }
            }
        }
        Ok(())
    }
}
