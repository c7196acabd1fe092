mod common;

use blocktree_core::structures::blocktree::VERSION_META_ARRAY;
use blocktree_core::{
    BlockTreeConfig, FieldInfo, FilePointerPostingsReader, IndexOptions, OwnedBytes,
    SegmentDictionary, TermCursor,
};
use common::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Walk every term and check stats and postings against the fixtures.
fn check_enumeration(dict: &Dictionary, field: &str, options: IndexOptions, expected: &[Vec<u8>]) {
    let field_dict = dict.field(field).unwrap();
    let mut cursor = field_dict.iterator();
    let mut ord = 0;
    while let Some(term) = cursor.next().unwrap() {
        assert_eq!(term, expected[ord].as_slice(), "term #{}", ord);
        let (stats, postings) = expected_postings(ord, options);
        assert_eq!(cursor.doc_freq().unwrap(), stats.doc_freq);
        assert_eq!(cursor.total_term_freq().unwrap(), stats.total_term_freq);
        let state = cursor.term_state().unwrap();
        assert_eq!(state.postings, postings, "postings of {}", show(&expected[ord]));
        ord += 1;
    }
    assert_eq!(ord, expected.len());
    assert!(cursor.next().unwrap().is_none());
}

#[test]
fn test_example_terms_enumerate_in_order() {
    let terms = example_terms();
    for config in [BlockTreeConfig::new(2, 4).unwrap(), BlockTreeConfig::new(2, 2).unwrap()] {
        let segment = single_field(config, IndexOptions::Docs, &terms);
        let dict = segment.open();

        assert_eq!(dict.fields().collect::<Vec<_>>(), vec!["body"]);
        assert_eq!(dict.size(), 1);
        let field = dict.field("body").unwrap();
        assert_eq!(field.size(), 4);
        assert_eq!(field.sum_doc_freq(), 1 + 2 + 3 + 1);
        assert_eq!(field.sum_total_term_freq(), -1);
        assert_eq!(field.doc_count(), 4);
        assert!(!field.has_freqs());

        assert_eq!(collect(&mut field.iterator()), terms);
        check_enumeration(&dict, "body", IndexOptions::Docs, &terms);
    }
}

#[test]
fn test_random_terms_roundtrip() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let alphabet = [0x00, 0x01, b'a', b'b', 0x7f, 0x80, 0xfe, 0xff];
    let terms = random_terms(&mut rng, 3000, &alphabet, 6);

    for config in configs() {
        for options in [IndexOptions::Docs, IndexOptions::DocsAndFreqsAndPositions] {
            let segment = single_field(config, options, &terms);
            let dict = segment.open();
            let field = dict.field("body").unwrap();
            assert_eq!(field.size(), terms.len() as u64);
            assert_eq!(field.has_freqs(), options.has_freqs());

            let sum_doc_freq: u64 = (0..terms.len())
                .map(|ord| expected_postings(ord, options).0.doc_freq as u64)
                .sum();
            assert_eq!(field.sum_doc_freq(), sum_doc_freq);
            if options.has_freqs() {
                let sum_ttf: i64 = (0..terms.len())
                    .map(|ord| expected_postings(ord, options).0.total_term_freq)
                    .sum();
                assert_eq!(field.sum_total_term_freq(), sum_ttf);
            }

            check_enumeration(&dict, "body", options, &terms);
            dict.check_integrity().unwrap();
        }
    }
}

#[test]
fn test_metadata_decode_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(7);
    let terms = random_terms(&mut rng, 400, b"abcd", 5);
    let segment = single_field(
        BlockTreeConfig::new(3, 4).unwrap(),
        IndexOptions::DocsAndFreqs,
        &terms,
    );
    let dict = segment.open();
    let mut cursor = dict.field("body").unwrap().iterator();

    let mut ord = 0;
    while let Some(term) = cursor.next().unwrap() {
        let term = term.to_vec();
        // only decode every third term so catch-up decoding is exercised
        if ord % 3 == 2 {
            let first = cursor.term_state().unwrap();
            let again = cursor.term_state().unwrap();
            assert_eq!(first, again);
            assert_eq!(cursor.doc_freq().unwrap(), first.doc_freq);
            assert_eq!(first.postings, expected_postings(ord, IndexOptions::DocsAndFreqs).1);
            assert_eq!(cursor.term(), term.as_slice());
        }
        ord += 1;
    }
    assert_eq!(ord, terms.len());
}

#[test]
fn test_multiple_fields() {
    let mut rng = StdRng::seed_from_u64(99);
    let body = random_terms(&mut rng, 500, b"abcdefgh", 4);
    let id: Vec<Vec<u8>> = (0..300u32).map(|i| format!("{:05}", i * 7).into_bytes()).collect();

    let mut writer = blocktree_core::BlockTreeTermsWriter::new(
        Vec::new(),
        Vec::new(),
        blocktree_core::FilePointerPostingsWriter::new(),
        BlockTreeConfig::new(4, 8).unwrap(),
    )
    .unwrap();
    let fields = [
        (FieldInfo::new("body", 3, IndexOptions::DocsAndFreqsAndPositions), body.clone()),
        (FieldInfo::new("empty", 1, IndexOptions::Docs), Vec::new()),
        (FieldInfo::new("id", 2, IndexOptions::Docs), id.clone()),
    ];
    for (field, terms) in &fields {
        let mut field_writer = writer.add_field(field).unwrap();
        for (ord, term) in terms.iter().enumerate() {
            let (stats, state) = expected_postings(ord, field.index_options);
            field_writer.add_term(term, stats, state).unwrap();
        }
        let summary = field_writer.finish(terms.len() as u32).unwrap();
        assert_eq!(summary.num_terms, terms.len() as u64);
    }
    let (terms_file, index_file) = writer.finish().unwrap();

    let infos = blocktree_core::FieldInfos::new(fields.iter().map(|(f, _)| f.clone())).unwrap();
    let dict: Dictionary = SegmentDictionary::open(
        OwnedBytes::new(terms_file),
        Some(OwnedBytes::new(index_file)),
        &infos,
        MAX_DOC,
        FilePointerPostingsReader::new(),
    )
    .unwrap();

    assert_eq!(dict.size(), 2);
    assert_eq!(dict.fields().collect::<Vec<_>>(), vec!["body", "id"]);
    assert!(dict.field("empty").is_none());
    assert!(dict.field("missing").is_none());
    assert_eq!(dict.field("body").unwrap().field_info().number, 3);

    check_enumeration(&dict, "body", IndexOptions::DocsAndFreqsAndPositions, &body);
    check_enumeration(&dict, "id", IndexOptions::Docs, &id);
    assert!(dict.ram_bytes_used() > 0);
}

#[test]
fn test_meta_array_version_roundtrip() {
    let mut rng = StdRng::seed_from_u64(3);
    let terms = random_terms(&mut rng, 800, b"xyz", 8);
    let config = BlockTreeConfig::new(3, 4)
        .unwrap()
        .with_format_version(VERSION_META_ARRAY)
        .unwrap();
    let segment = single_field(config, IndexOptions::DocsAndFreqs, &terms);
    let dict = segment.open();
    assert_eq!(dict.version(), VERSION_META_ARRAY);
    check_enumeration(&dict, "body", IndexOptions::DocsAndFreqs, &terms);

    let mut cursor = dict.field("body").unwrap().iterator();
    for term in terms.iter().step_by(37) {
        assert!(cursor.seek_exact(term).unwrap(), "{}", show(term));
    }
    // no footer to verify
    dict.check_integrity().unwrap();
}

#[test]
fn test_shared_prefix_floor_chains() {
    // one long shared prefix forces floor splits at several depths
    let terms: Vec<Vec<u8>> = (0..2000u32)
        .map(|i| format!("prefix/{:04}", i * 3).into_bytes())
        .collect();
    for config in configs() {
        let segment = single_field(config, IndexOptions::DocsAndFreqs, &terms);
        let dict = segment.open();
        check_enumeration(&dict, "body", IndexOptions::DocsAndFreqs, &terms);
    }
}

#[test]
fn test_mmap_backed_files() {
    let mut rng = StdRng::seed_from_u64(11);
    let terms = random_terms(&mut rng, 1000, b"abcdefghij", 5);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let (terms_file, index_file) = write_raw(BlockTreeConfig::default(), &[(field.clone(), terms.clone())]);

    let dir = tempfile::tempdir().unwrap();
    let terms_path = dir.path().join("segment.tim");
    let index_path = dir.path().join("segment.tip");
    std::fs::write(&terms_path, &terms_file).unwrap();
    std::fs::write(&index_path, &index_file).unwrap();

    let infos = blocktree_core::FieldInfos::new([field]).unwrap();
    let dict: Dictionary = SegmentDictionary::open(
        OwnedBytes::open_mmap(&terms_path).unwrap(),
        Some(OwnedBytes::open_mmap(&index_path).unwrap()),
        &infos,
        MAX_DOC,
        FilePointerPostingsReader::new(),
    )
    .unwrap();
    dict.check_integrity().unwrap();
    check_enumeration(&dict, "body", IndexOptions::DocsAndFreqs, &terms);

    let mut cursor = dict.field("body").unwrap().iterator();
    assert!(cursor.seek_exact(&terms[500]).unwrap());
    assert_eq!(cursor.next().unwrap(), Some(terms[501].as_slice()));
}

#[test]
fn test_enumeration_without_index() {
    let mut rng = StdRng::seed_from_u64(5);
    let terms = random_terms(&mut rng, 600, b"abc", 7);
    let segment = single_field(BlockTreeConfig::new(2, 2).unwrap(), IndexOptions::Docs, &terms);
    let dict = segment.open_without_index();
    let field = dict.field("body").unwrap();
    assert!(field.index().is_none());
    check_enumeration(&dict, "body", IndexOptions::Docs, &terms);
}
