//! Shared fixtures: write a segment in memory and reopen it.

#![allow(dead_code)]

use std::collections::BTreeSet;

use blocktree_core::{
    BlockTreeConfig, BlockTreeTermsWriter, FieldInfo, FieldInfos, FilePointerPostingsReader,
    FilePointerPostingsWriter, FilePointerState, IndexOptions, OwnedBytes, SegmentDictionary,
    TermCursor, TermStats,
};
use rand::rngs::StdRng;
use rand::Rng;

pub const MAX_DOC: u32 = 1_000_000;

pub type Dictionary = SegmentDictionary<FilePointerPostingsReader>;

pub const EXAMPLE_TERMS: [&str; 4] = ["apple", "application", "apply", "banana"];

/// Stats and postings pointers the fixtures attach to the term at `ord`.
pub fn expected_postings(ord: usize, options: IndexOptions) -> (TermStats, FilePointerState) {
    let doc_freq = (ord % 3) as u32 + 1;
    let total_term_freq = if options.has_freqs() {
        doc_freq as i64 + (ord % 2) as i64
    } else {
        -1
    };
    let state = FilePointerState {
        doc_start_fp: ord as u64 * 10,
        pos_start_fp: if options.has_positions() { ord as u64 * 7 } else { 0 },
        singleton_doc: (doc_freq == 1).then_some(ord as u32),
    };
    (TermStats::new(doc_freq, total_term_freq), state)
}

pub struct Segment {
    pub terms: OwnedBytes,
    pub index: OwnedBytes,
    pub infos: FieldInfos,
}

/// Write `fields` (ascending by name) with fixture postings.
pub fn write_segment(config: BlockTreeConfig, fields: &[(FieldInfo, Vec<Vec<u8>>)]) -> Segment {
    let (terms, index) = write_raw(config, fields);
    Segment {
        terms: OwnedBytes::new(terms),
        index: OwnedBytes::new(index),
        infos: FieldInfos::new(fields.iter().map(|(field, _)| field.clone())).unwrap(),
    }
}

pub fn write_raw(config: BlockTreeConfig, fields: &[(FieldInfo, Vec<Vec<u8>>)]) -> (Vec<u8>, Vec<u8>) {
    let mut writer = BlockTreeTermsWriter::new(
        Vec::new(),
        Vec::new(),
        FilePointerPostingsWriter::new(),
        config,
    )
    .unwrap();
    for (field, terms) in fields {
        let mut field_writer = writer.add_field(field).unwrap();
        for (ord, term) in terms.iter().enumerate() {
            let (stats, state) = expected_postings(ord, field.index_options);
            field_writer.add_term(term, stats, state).unwrap();
        }
        field_writer.finish(terms.len() as u32).unwrap();
    }
    writer.finish().unwrap()
}

pub fn single_field(config: BlockTreeConfig, options: IndexOptions, terms: &[Vec<u8>]) -> Segment {
    let field = FieldInfo::new("body", 0, options);
    write_segment(config, &[(field, terms.to_vec())])
}

pub fn example_terms() -> Vec<Vec<u8>> {
    EXAMPLE_TERMS.iter().map(|t| t.as_bytes().to_vec()).collect()
}

impl Segment {
    pub fn open(&self) -> Dictionary {
        SegmentDictionary::open(
            self.terms.clone(),
            Some(self.index.clone()),
            &self.infos,
            MAX_DOC,
            FilePointerPostingsReader::new(),
        )
        .unwrap()
    }

    pub fn open_without_index(&self) -> Dictionary {
        SegmentDictionary::open(
            self.terms.clone(),
            None,
            &self.infos,
            MAX_DOC,
            FilePointerPostingsReader::new(),
        )
        .unwrap()
    }
}

/// Drain a cursor into owned terms.
pub fn collect<C: TermCursor>(cursor: &mut C) -> Vec<Vec<u8>> {
    let mut terms = Vec::new();
    while let Some(term) = cursor.next().unwrap() {
        terms.push(term.to_vec());
    }
    terms
}

pub fn random_term(rng: &mut StdRng, alphabet: &[u8], max_len: usize) -> Vec<u8> {
    let len = rng.random_range(1..=max_len);
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())])
        .collect()
}

/// `count` distinct sorted terms of 1..=`max_len` bytes drawn from `alphabet`.
pub fn random_terms(rng: &mut StdRng, count: usize, alphabet: &[u8], max_len: usize) -> Vec<Vec<u8>> {
    let mut terms = BTreeSet::new();
    while terms.len() < count {
        terms.insert(random_term(rng, alphabet, max_len));
    }
    terms.into_iter().collect()
}

/// Block-size configurations from tiny (lots of floor chains) to default.
pub fn configs() -> Vec<BlockTreeConfig> {
    vec![
        BlockTreeConfig::new(2, 2).unwrap(),
        BlockTreeConfig::new(3, 4).unwrap(),
        BlockTreeConfig::new(4, 8).unwrap(),
        BlockTreeConfig::default(),
    ]
}

pub fn show(term: &[u8]) -> String {
    String::from_utf8_lossy(term).into_owned()
}
