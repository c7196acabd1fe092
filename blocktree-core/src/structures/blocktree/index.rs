//! FST prefix index over block entry points
//!
//! Maps every indexed block prefix to the block's output code (file pointer,
//! flags and floor side-table). The FST itself maps prefix -> ordinal; codes
//! live in a table serialized right after the FST bytes:
//!
//! ```text
//! fst_len: vint | fst bytes | num_codes: vint | code_len: vint * num_codes | code bytes
//! ```
//!
//! The FST bytes are used in place, without parsing into heap structures.

use std::io::Write;

use fst::raw::{CompiledAddr, Fst};
use rustc_hash::FxHashSet;

use crate::directories::OwnedBytes;
use crate::error::{Error, Result};
use crate::store::{ByteCursor, write_vint};

/// Prefix -> output code pairs collected while blocks are written.
pub(crate) type IndexFragment = Vec<(Vec<u8>, Vec<u8>)>;

/// A position in the index reached by following labels from the root.
///
/// Holds no borrow of the FST, so cursors can cache one per depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexArc {
    addr: CompiledAddr,
    output: u64,
    is_final: bool,
    final_output: u64,
}

impl IndexArc {
    /// True if the prefix spelled by the path to this arc is indexed.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    fn ordinal(&self) -> u64 {
        self.output + self.final_output
    }
}

pub struct PrefixIndex {
    fst: Fst<OwnedBytes>,
    codes: OwnedBytes,
    offsets: Vec<u32>,
}

impl PrefixIndex {
    /// Serialize `entries` (any order, unique prefixes) and return the bytes.
    pub(crate) fn build(mut entries: IndexFragment) -> Result<Vec<u8>> {
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut fst_builder = fst::MapBuilder::memory();
        for (i, (prefix, _)) in entries.iter().enumerate() {
            fst_builder.insert(prefix, i as u64)?;
        }
        let fst_bytes = fst_builder.into_inner()?;

        let codes_len: usize = entries.iter().map(|(_, code)| code.len()).sum();
        let mut out = Vec::with_capacity(fst_bytes.len() + codes_len + 4 * entries.len() + 16);
        write_vint(&mut out, fst_bytes.len() as u64)?;
        out.write_all(&fst_bytes)?;
        write_vint(&mut out, entries.len() as u64)?;
        for (_, code) in &entries {
            write_vint(&mut out, code.len() as u64)?;
        }
        for (_, code) in &entries {
            out.write_all(code)?;
        }
        Ok(out)
    }

    /// Load an index whose serialized form starts at the cursor position.
    pub fn load(input: &mut ByteCursor) -> Result<Self> {
        let fst_len = input.read_vint()? as usize;
        let fst_bytes = input.read_bytes(fst_len)?;
        let fst = Fst::new(fst_bytes)?;

        let num_codes = input.read_vint()? as usize;
        if num_codes as u64 != fst.len() as u64 {
            return Err(Error::Corruption(format!(
                "prefix index has {} keys but {} output codes",
                fst.len(),
                num_codes
            )));
        }
        let mut offsets = Vec::with_capacity(num_codes + 1);
        let mut total = 0u32;
        offsets.push(0);
        for _ in 0..num_codes {
            let len = input.read_vint_u32()?;
            if len == 0 {
                return Err(Error::Corruption("empty output code in prefix index".into()));
            }
            total = total
                .checked_add(len)
                .ok_or_else(|| Error::Corruption("prefix index code table overflow".into()))?;
            offsets.push(total);
        }
        let codes = input.read_bytes(total as usize)?;
        Ok(Self {
            fst,
            codes,
            offsets,
        })
    }

    /// Arc for the empty prefix.
    pub fn root(&self) -> IndexArc {
        let node = self.fst.root();
        IndexArc {
            addr: node.addr(),
            output: 0,
            is_final: node.is_final(),
            final_output: node.final_output().value(),
        }
    }

    /// Follow `label` out of `from`, if the index has such an arc.
    pub fn find_target_arc(&self, label: u8, from: &IndexArc) -> Option<IndexArc> {
        let node = self.fst.node(from.addr);
        let idx = node.find_input(label)?;
        let trans = node.transition(idx);
        let next = self.fst.node(trans.addr);
        Some(IndexArc {
            addr: trans.addr,
            output: from.output + trans.out.value(),
            is_final: next.is_final(),
            final_output: next.final_output().value(),
        })
    }

    /// Output code of the block indexed at a final arc.
    pub fn output(&self, arc: &IndexArc) -> Result<OwnedBytes> {
        debug_assert!(arc.is_final);
        self.code(arc.ordinal())
    }

    fn code(&self, ordinal: u64) -> Result<OwnedBytes> {
        let idx = ordinal as usize;
        if idx + 1 >= self.offsets.len() {
            return Err(Error::Corruption(format!(
                "prefix index ordinal {} out of range",
                ordinal
            )));
        }
        Ok(self
            .codes
            .slice(self.offsets[idx] as usize..self.offsets[idx + 1] as usize))
    }

    /// Exact lookup of an indexed prefix.
    pub fn get(&self, prefix: &[u8]) -> Result<Option<OwnedBytes>> {
        match self.fst.get(prefix) {
            Some(output) => self.code(output.value()).map(Some),
            None => Ok(None),
        }
    }

    /// All indexed prefixes with their codes, in ascending prefix order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, OwnedBytes)>> {
        use fst::Streamer;

        let mut stream = self.fst.stream();
        let mut entries = Vec::with_capacity(self.len());
        while let Some((prefix, output)) = stream.next() {
            entries.push((prefix.to_vec(), self.code(output.value())?));
        }
        Ok(entries)
    }

    /// Number of indexed prefixes.
    pub fn len(&self) -> usize {
        self.fst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fst.len() == 0
    }

    /// Serialized FST size in bytes.
    pub fn fst_size(&self) -> usize {
        self.fst.size()
    }

    /// (nodes, arcs) reachable from the root.
    pub fn node_and_arc_count(&self) -> (usize, usize) {
        let mut seen = FxHashSet::default();
        let mut stack = vec![self.fst.root().addr()];
        let mut arcs = 0;
        while let Some(addr) = stack.pop() {
            if !seen.insert(addr) {
                continue;
            }
            let node = self.fst.node(addr);
            arcs += node.len();
            stack.extend(node.transitions().map(|t| t.addr));
        }
        (seen.len(), arcs)
    }

    pub fn ram_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.fst.size()
            + self.codes.len()
            + self.offsets.capacity() * std::mem::size_of::<u32>()
    }
}

impl std::fmt::Debug for PrefixIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixIndex")
            .field("prefixes", &self.len())
            .field("fst_bytes", &self.fst_size())
            .finish()
    }
}
