mod common;

use blocktree_core::store::ByteCursor;
use blocktree_core::{
    BlockTreeConfig, BlockTreeTermsWriter, FieldInfo, FilePointerPostingsWriter, IndexOptions,
    OwnedBytes,
};
use common::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

#[derive(Debug)]
struct BlockHeader {
    ent_count: usize,
    is_last_in_floor: bool,
    has_terms: bool,
    fp_end: u64,
}

fn read_block(terms: &OwnedBytes, fp: u64) -> BlockHeader {
    let mut input = ByteCursor::new(terms.clone());
    input.seek(fp).unwrap();
    let code = input.read_vint().unwrap();
    let ent_count = (code >> 1) as usize;
    let is_last_in_floor = code & 1 != 0;

    let code = input.read_vint().unwrap();
    let is_leaf = code & 1 != 0;
    let mut suffixes = ByteCursor::new(input.read_bytes((code >> 1) as usize).unwrap());
    let mut has_terms = is_leaf;
    if !is_leaf {
        for _ in 0..ent_count {
            let code = suffixes.read_vint().unwrap();
            suffixes.skip((code >> 1) as usize).unwrap();
            if code & 1 == 0 {
                has_terms = true;
            } else {
                suffixes.read_vint().unwrap();
            }
        }
    }
    for _ in 0..2 {
        let len = input.read_vint().unwrap() as usize;
        input.skip(len).unwrap();
    }
    BlockHeader {
        ent_count,
        is_last_in_floor,
        has_terms,
        fp_end: input.position() as u64,
    }
}

#[derive(Debug, Default)]
struct Layout {
    blocks: usize,
    floor_chains: usize,
    floor_blocks: usize,
}

/// Decode every indexed block and check the size and flag invariants.
fn check_layout(segment: &Segment, config: BlockTreeConfig) -> Layout {
    let dict = segment.open();
    let field = dict.field("body").unwrap();
    let index = field.index().unwrap();
    let mut layout = Layout::default();

    for (prefix, code) in index.entries().unwrap() {
        let mut input = ByteCursor::new(code);
        let value = input.read_vint().unwrap();
        let fp = value >> 2;
        let has_terms = value & 2 != 0;
        let is_floor = value & 1 != 0;
        let block = read_block(&segment.terms, fp);
        assert_eq!(block.has_terms, has_terms, "has-terms flag of {:?}", show(&prefix));

        if !is_floor {
            layout.blocks += 1;
            assert!(block.is_last_in_floor, "non-floor block {:?}", show(&prefix));
            assert!(block.ent_count >= 1);
            if prefix.is_empty() {
                assert_eq!(fp, field.root_block_fp());
            } else {
                assert!(
                    (config.min_items_in_block..=config.max_items_in_block).contains(&block.ent_count),
                    "block {:?} has {} entries with {:?}",
                    show(&prefix),
                    block.ent_count,
                    config
                );
            }
            continue;
        }

        assert!(!prefix.is_empty(), "the root block is never split");
        let num_follow = input.read_vint().unwrap() as usize;
        assert!(num_follow >= 1);
        layout.floor_chains += 1;
        layout.blocks += 1 + num_follow;
        layout.floor_blocks += 1 + num_follow;

        let mut chain = vec![(fp, block)];
        let mut last_label = None;
        for _ in 0..num_follow {
            let label = input.read_u8().unwrap();
            assert!(last_label.is_none_or(|last| label > last), "floor labels ascend");
            last_label = Some(label);
            let code = input.read_vint().unwrap();
            let sub_fp = fp + (code >> 1);
            let block = read_block(&segment.terms, sub_fp);
            assert_eq!(block.has_terms, code & 1 != 0);
            chain.push((sub_fp, block));
        }
        assert!(input.eof());

        for (i, (_, block)) in chain.iter().enumerate() {
            assert!((1..=config.max_items_in_block).contains(&block.ent_count), "{:?}", block);
            assert_eq!(block.is_last_in_floor, i + 1 == chain.len());
        }
        // a chain is written as one contiguous run
        for pair in chain.windows(2) {
            assert_eq!(pair[0].1.fp_end, pair[1].0);
        }
    }

    let stats = field.compute_stats().unwrap();
    assert_eq!(stats.total_block_count, layout.blocks);
    assert_eq!(stats.floor_block_count, layout.floor_chains);
    assert_eq!(stats.floor_sub_block_count, layout.floor_blocks);
    assert_eq!(stats.non_floor_block_count, layout.blocks - layout.floor_blocks);
    assert_eq!(stats.total_term_count, field.size());
    assert_eq!(
        stats.leaf_block_count + stats.non_leaf_block_count,
        stats.total_block_count
    );
    assert_eq!(
        stats.mixed_block_count + stats.terms_only_block_count + stats.sub_blocks_only_block_count,
        stats.total_block_count
    );
    assert_eq!(
        stats.block_count_by_prefix_len.iter().sum::<usize>(),
        stats.total_block_count
    );
    layout
}

#[test]
fn test_example_stats() {
    let terms = example_terms();
    let segment = single_field(BlockTreeConfig::new(2, 4).unwrap(), IndexOptions::Docs, &terms);
    let dict = segment.open();
    let field = dict.field("body").unwrap();

    let prefixes: Vec<Vec<u8>> = field
        .index()
        .unwrap()
        .entries()
        .unwrap()
        .into_iter()
        .map(|(prefix, _)| prefix)
        .collect();
    assert_eq!(prefixes, vec![b"".to_vec(), b"appl".to_vec()]);

    let stats = field.compute_stats().unwrap();
    assert_eq!(stats.field, "body");
    assert_eq!(stats.total_block_count, 2);
    assert_eq!(stats.leaf_block_count, 1);
    assert_eq!(stats.non_leaf_block_count, 1);
    assert_eq!(stats.mixed_block_count, 1);
    assert_eq!(stats.terms_only_block_count, 1);
    assert_eq!(stats.sub_blocks_only_block_count, 0);
    assert_eq!(stats.floor_block_count, 0);
    assert_eq!(stats.floor_sub_block_count, 0);
    assert_eq!(stats.block_count_by_prefix_len, vec![1, 0, 0, 0, 1]);
    assert_eq!(stats.total_term_count, 4);
    assert_eq!(stats.total_term_bytes, 27);
    assert!(stats.index_node_count > 0);
    assert!(stats.index_arc_count > 0);
    assert!(stats.index_num_bytes > 0);

    let report = stats.to_string();
    assert!(report.starts_with("field \"body\":"), "{}", report);
    assert!(report.contains("    2 blocks\n"), "{}", report);
    assert!(report.contains("    4 terms\n"), "{}", report);
}

#[test]
fn test_example_floor_chain() {
    let segment = single_field(BlockTreeConfig::new(2, 2).unwrap(), IndexOptions::Docs, &example_terms());
    let layout = check_layout(&segment, BlockTreeConfig::new(2, 2).unwrap());
    assert_eq!(layout.blocks, 3);
    assert_eq!(layout.floor_chains, 1);
    assert_eq!(layout.floor_blocks, 2);
}

#[test]
fn test_block_size_invariants() {
    let mut rng = StdRng::seed_from_u64(0x1a70);
    let term_sets = [
        random_terms(&mut rng, 4000, b"ab", 14),
        random_terms(&mut rng, 4000, b"abcdefghijklmnop", 4),
        (0..3000u32).map(|i| format!("{:06}", i * 17).into_bytes()).collect(),
    ];
    for terms in &term_sets {
        for config in configs() {
            let segment = single_field(config, IndexOptions::DocsAndFreqs, terms);
            check_layout(&segment, config);
        }
    }
}

#[test]
fn test_writer_summary_agrees_with_stats() {
    let mut rng = StdRng::seed_from_u64(77);
    let terms = random_terms(&mut rng, 2500, b"abc", 9);
    let config = BlockTreeConfig::new(3, 4).unwrap();
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqsAndPositions);

    let mut writer =
        BlockTreeTermsWriter::new(Vec::new(), Vec::new(), FilePointerPostingsWriter::new(), config).unwrap();
    let mut field_writer = writer.add_field(&field).unwrap();
    for (ord, term) in terms.iter().enumerate() {
        let (stats, state) = expected_postings(ord, field.index_options);
        field_writer.add_term(term, stats, state).unwrap();
    }
    let summary = field_writer.finish(terms.len() as u32).unwrap();
    writer.finish().unwrap();

    let segment = single_field(config, IndexOptions::DocsAndFreqsAndPositions, &terms);
    let dict = segment.open();
    let field_dict = dict.field("body").unwrap();
    assert_eq!(summary.root_code, field_dict.root_code().as_slice());
    assert_eq!(summary.num_terms, field_dict.size());
    assert_eq!(summary.sum_doc_freq, field_dict.sum_doc_freq());
    assert_eq!(summary.sum_total_term_freq, field_dict.sum_total_term_freq());

    let stats = field_dict.compute_stats().unwrap();
    assert_eq!(summary.block_count, stats.total_block_count);
    assert_eq!(summary.floor_block_count, stats.floor_sub_block_count);
    assert!(stats.floor_block_count > 0);
}
