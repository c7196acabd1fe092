//! Read path: opens the terms and index files of a segment.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::config::ReadOptions;
use super::cursor::DictionaryCursor;
use super::index::PrefixIndex;
use super::intersect::AutomatonIntersector;
use super::stats::BlockStats;
use super::{
    OUTPUT_FLAGS_NUM_BITS, TERMS_CODEC_NAME, TERMS_INDEX_CODEC_NAME, VERSION_APPEND_ONLY,
    VERSION_CHECKSUM, VERSION_CURRENT, VERSION_META_ARRAY, VERSION_START,
};
use crate::automaton::CompiledAutomaton;
use crate::directories::OwnedBytes;
use crate::error::{Error, Result};
use crate::field::{FieldInfo, FieldInfos};
use crate::postings::PostingsReaderBase;
use crate::store::{ByteCursor, FOOTER_LENGTH, check_header, checksum_entire_file, retrieve_checksum};

/// All fields of one segment's term dictionary.
///
/// Immutable once opened; share it across threads and create one cursor
/// per thread.
pub struct SegmentDictionary<P: PostingsReaderBase> {
    terms: OwnedBytes,
    postings: Arc<P>,
    version: u32,
    fields: BTreeMap<String, FieldDictionary<P>>,
}

impl<P: PostingsReaderBase> SegmentDictionary<P> {
    /// Open a dictionary from its terms file and, optionally, its index file.
    ///
    /// Without the index the dictionary supports enumeration only. With a
    /// checksummed index, the whole index file is verified up front.
    pub fn open(
        terms: OwnedBytes,
        index: Option<OwnedBytes>,
        field_infos: &FieldInfos,
        max_doc: u32,
        postings: P,
    ) -> Result<Self> {
        Self::open_with_options(terms, index, field_infos, max_doc, postings, ReadOptions::default())
    }

    pub fn open_with_options(
        terms: OwnedBytes,
        index: Option<OwnedBytes>,
        field_infos: &FieldInfos,
        max_doc: u32,
        mut postings: P,
        options: ReadOptions,
    ) -> Result<Self> {
        let mut input = ByteCursor::new(terms.clone());
        let version = check_header(&mut input, TERMS_CODEC_NAME, VERSION_START, VERSION_CURRENT)?;
        let dir_offset = if version < VERSION_APPEND_ONLY {
            input.read_u64()?
        } else {
            0
        };

        let mut index_input = match &index {
            Some(bytes) => {
                let mut index_input = ByteCursor::new(bytes.clone());
                let index_version = check_header(
                    &mut index_input,
                    TERMS_INDEX_CODEC_NAME,
                    VERSION_START,
                    VERSION_CURRENT,
                )?;
                if index_version != version {
                    return Err(Error::Corruption(format!(
                        "mismatched versions: terms={} index={}",
                        version, index_version
                    )));
                }
                let index_dir_offset = if version < VERSION_APPEND_ONLY {
                    index_input.read_u64()?
                } else {
                    0
                };
                if version >= VERSION_CHECKSUM {
                    if options.verify_index_checksum {
                        let checksum = checksum_entire_file(bytes)?;
                        log::trace!("terms index checksum {:#010x} verified", checksum);
                    } else {
                        retrieve_checksum(bytes)?;
                    }
                }
                seek_dir(&mut index_input, version, index_dir_offset)?;
                Some(index_input)
            }
            None => None,
        };

        postings.init(&mut input)?;
        let postings = Arc::new(postings);
        seek_dir(&mut input, version, dir_offset)?;

        let num_fields = input.read_vint()?;
        if num_fields > i32::MAX as u64 {
            return Err(Error::Corruption(format!("invalid numFields: {}", num_fields)));
        }

        let mut fields = BTreeMap::new();
        for _ in 0..num_fields {
            let field_number = input.read_vint_u32()?;
            let num_terms = input.read_vint()?;
            if num_terms == 0 {
                return Err(Error::Corruption(format!(
                    "field number {} has no terms",
                    field_number
                )));
            }
            let root_code_len = input.read_vint_u32()? as usize;
            if root_code_len == 0 {
                return Err(Error::Corruption(format!(
                    "field number {} has an empty root code",
                    field_number
                )));
            }
            let root_code = input.read_bytes(root_code_len)?;
            let field_info = field_infos
                .by_number(field_number)
                .ok_or_else(|| Error::Corruption(format!("unknown field number {}", field_number)))?
                .clone();
            let sum_total_term_freq = if field_info.has_freqs() {
                input.read_vint()? as i64
            } else {
                -1
            };
            let sum_doc_freq = input.read_vint()?;
            let doc_count = input.read_vint_u32()?;
            let longs_size = if version >= VERSION_META_ARRAY {
                input.read_vint_u32()? as usize
            } else {
                0
            };

            if doc_count > max_doc {
                return Err(Error::Corruption(format!(
                    "invalid docCount {} for field {:?}: maxDoc={}",
                    doc_count, field_info.name, max_doc
                )));
            }
            if sum_doc_freq < doc_count as u64 {
                return Err(Error::Corruption(format!(
                    "invalid sumDocFreq {} for field {:?}: docCount={}",
                    sum_doc_freq, field_info.name, doc_count
                )));
            }
            if sum_total_term_freq != -1
                && (sum_total_term_freq < 0 || (sum_total_term_freq as u64) < sum_doc_freq)
            {
                return Err(Error::Corruption(format!(
                    "invalid sumTotalTermFreq {} for field {:?}: sumDocFreq={}",
                    sum_total_term_freq, field_info.name, sum_doc_freq
                )));
            }

            let index_start_fp = match index_input.as_mut() {
                Some(index_input) => index_input.read_vint()?,
                None => 0,
            };
            if fields.contains_key(&field_info.name) {
                return Err(Error::Corruption(format!("duplicate field {:?}", field_info.name)));
            }

            let prefix_index = match &index {
                Some(bytes) => {
                    let mut fst_input = ByteCursor::new(bytes.clone());
                    fst_input.seek(index_start_fp)?;
                    Some(PrefixIndex::load(&mut fst_input)?)
                }
                None => None,
            };
            let root_block_fp =
                ByteCursor::new(root_code.clone()).read_vint()? >> OUTPUT_FLAGS_NUM_BITS;

            fields.insert(
                field_info.name.clone(),
                FieldDictionary {
                    field_info,
                    num_terms,
                    sum_total_term_freq,
                    sum_doc_freq,
                    doc_count,
                    index_start_fp,
                    root_code,
                    root_block_fp,
                    longs_size,
                    index: prefix_index,
                    postings: Arc::clone(&postings),
                    terms: terms.clone(),
                },
            );
        }

        log::debug!(
            "opened block tree terms dictionary: version={} fields={} index={} terms={} bytes",
            version,
            fields.len(),
            index.is_some(),
            terms.len()
        );

        Ok(Self {
            terms,
            postings,
            version,
            fields,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Field names in ascending order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDictionary<P>> {
        self.fields.get(name)
    }

    /// Number of fields with terms.
    pub fn size(&self) -> usize {
        self.fields.len()
    }

    pub fn postings(&self) -> &P {
        &self.postings
    }

    /// Verify the terms file checksum and let the postings reader check its own files.
    pub fn check_integrity(&self) -> Result<()> {
        if self.version >= VERSION_CHECKSUM {
            let checksum = checksum_entire_file(&self.terms)?;
            log::trace!("terms file checksum {:#010x} verified", checksum);
            self.postings.check_integrity()?;
        }
        Ok(())
    }

    pub fn ram_bytes_used(&self) -> usize {
        self.postings.ram_bytes_used()
            + self
                .fields
                .values()
                .map(FieldDictionary::ram_bytes_used)
                .sum::<usize>()
    }
}

impl<P: PostingsReaderBase> std::fmt::Debug for SegmentDictionary<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentDictionary")
            .field("version", &self.version)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn seek_dir(input: &mut ByteCursor, version: u32, dir_offset: u64) -> Result<()> {
    let trailer = if version >= VERSION_CHECKSUM {
        FOOTER_LENGTH + 8
    } else if version >= VERSION_APPEND_ONLY {
        8
    } else {
        return input.seek(dir_offset);
    };
    let pos = input
        .len()
        .checked_sub(trailer)
        .ok_or_else(|| Error::Corruption(format!("file too short for trailer: {} bytes", input.len())))?;
    input.seek(pos as u64)?;
    let dir_offset = input.read_u64()?;
    input.seek(dir_offset)
}

/// Terms of a single field.
pub struct FieldDictionary<P: PostingsReaderBase> {
    field_info: FieldInfo,
    num_terms: u64,
    sum_total_term_freq: i64,
    sum_doc_freq: u64,
    doc_count: u32,
    index_start_fp: u64,
    root_code: OwnedBytes,
    root_block_fp: u64,
    longs_size: usize,
    index: Option<PrefixIndex>,
    postings: Arc<P>,
    terms: OwnedBytes,
}

impl<P: PostingsReaderBase> FieldDictionary<P> {
    /// A fresh cursor positioned before the first term.
    pub fn iterator(&self) -> DictionaryCursor<'_, P> {
        DictionaryCursor::new(self)
    }

    /// Terms accepted by `automaton`, strictly after `start_term` if given.
    pub fn intersect<'a>(
        &'a self,
        automaton: &'a CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<AutomatonIntersector<'a, P>> {
        AutomatonIntersector::new(self, automaton, start_term)
    }

    /// Walk every block and collect layout statistics.
    pub fn compute_stats(&self) -> Result<BlockStats> {
        DictionaryCursor::new(self).compute_stats()
    }

    pub fn field_info(&self) -> &FieldInfo {
        &self.field_info
    }

    /// Number of terms.
    pub fn size(&self) -> u64 {
        self.num_terms
    }

    pub fn sum_doc_freq(&self) -> u64 {
        self.sum_doc_freq
    }

    /// -1 if the field does not track frequencies.
    pub fn sum_total_term_freq(&self) -> i64 {
        self.sum_total_term_freq
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    pub fn has_freqs(&self) -> bool {
        self.field_info.index_options.has_freqs()
    }

    pub fn has_positions(&self) -> bool {
        self.field_info.index_options.has_positions()
    }

    pub fn has_offsets(&self) -> bool {
        self.field_info.index_options.has_offsets()
    }

    pub fn index(&self) -> Option<&PrefixIndex> {
        self.index.as_ref()
    }

    pub fn index_start_fp(&self) -> u64 {
        self.index_start_fp
    }

    pub fn root_code(&self) -> &OwnedBytes {
        &self.root_code
    }

    pub fn root_block_fp(&self) -> u64 {
        self.root_block_fp
    }

    pub fn longs_size(&self) -> usize {
        self.longs_size
    }

    pub fn postings(&self) -> &P {
        &self.postings
    }

    pub(crate) fn terms_bytes(&self) -> &OwnedBytes {
        &self.terms
    }

    pub fn ram_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.root_code.len()
            + self.index.as_ref().map_or(0, PrefixIndex::ram_bytes_used)
    }
}

impl<P: PostingsReaderBase> std::fmt::Debug for FieldDictionary<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDictionary")
            .field("field", &self.field_info.name)
            .field("num_terms", &self.num_terms)
            .field("sum_doc_freq", &self.sum_doc_freq)
            .field("sum_total_term_freq", &self.sum_total_term_freq)
            .field("doc_count", &self.doc_count)
            .field("root_block_fp", &self.root_block_fp)
            .field("index", &self.index)
            .finish()
    }
}
