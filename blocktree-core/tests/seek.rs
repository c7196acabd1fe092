mod common;

use std::collections::BTreeSet;

use blocktree_core::{BlockTreeConfig, Error, IndexOptions, SeekStatus, TermCursor};
use common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_example_seeks() {
    for config in [BlockTreeConfig::new(2, 4).unwrap(), BlockTreeConfig::new(2, 2).unwrap()] {
        let segment = single_field(config, IndexOptions::Docs, &example_terms());
        let dict = segment.open();
        let field = dict.field("body").unwrap();
        let mut cursor = field.iterator();

        assert!(cursor.seek_exact(b"application").unwrap());
        assert_eq!(cursor.term(), b"application");
        assert_eq!(cursor.doc_freq().unwrap(), 2);

        assert_eq!(cursor.seek_ceil(b"app").unwrap(), SeekStatus::NotFound);
        assert_eq!(cursor.term(), b"apple");
        assert_eq!(cursor.next().unwrap(), Some(&b"application"[..]));

        assert_eq!(cursor.seek_ceil(b"banana").unwrap(), SeekStatus::Found);
        assert_eq!(cursor.seek_ceil(b"applz").unwrap(), SeekStatus::NotFound);
        assert_eq!(cursor.term(), b"banana");
        assert_eq!(cursor.seek_ceil(b"").unwrap(), SeekStatus::NotFound);
        assert_eq!(cursor.term(), b"apple");
        assert_eq!(cursor.seek_ceil(b"bananas").unwrap(), SeekStatus::End);
        assert!(cursor.next().unwrap().is_none());

        assert!(!cursor.seek_exact(b"appl").unwrap());
        assert!(!cursor.seek_exact(b"zebra").unwrap());
        assert!(cursor.seek_exact(b"apple").unwrap());
        assert_eq!(cursor.doc_freq().unwrap(), 1);
    }
}

#[test]
fn test_next_after_failed_seek_exact() {
    let segment = single_field(BlockTreeConfig::new(2, 2).unwrap(), IndexOptions::Docs, &example_terms());
    let dict = segment.open();
    let mut cursor = dict.field("body").unwrap().iterator();

    assert!(!cursor.seek_exact(b"appl").unwrap());
    assert_eq!(cursor.next().unwrap(), Some(&b"apple"[..]));
    assert_eq!(cursor.next().unwrap(), Some(&b"application"[..]));

    assert!(!cursor.seek_exact(b"applicationz").unwrap());
    assert_eq!(cursor.next().unwrap(), Some(&b"apply"[..]));

    assert!(!cursor.seek_exact(b"c").unwrap());
    assert!(cursor.next().unwrap().is_none());
    assert!(cursor.next().unwrap().is_none());
}

#[test]
fn test_exhausted_cursor_stays_exhausted_until_seek() {
    let terms = example_terms();
    let segment = single_field(BlockTreeConfig::default(), IndexOptions::Docs, &terms);
    let dict = segment.open();
    let mut cursor = dict.field("body").unwrap().iterator();

    assert_eq!(collect(&mut cursor), terms);
    assert!(cursor.next().unwrap().is_none());
    assert!(cursor.next().unwrap().is_none());

    assert_eq!(cursor.seek_ceil(b"apply").unwrap(), SeekStatus::Found);
    assert_eq!(cursor.next().unwrap(), Some(&b"banana"[..]));
    assert!(cursor.next().unwrap().is_none());
}

/// Smallest member >= `target`, or > `target` when `exclusive`.
fn ceiling<'a>(set: &'a BTreeSet<Vec<u8>>, target: &[u8], exclusive: bool) -> Option<&'a Vec<u8>> {
    set.range(target.to_vec()..)
        .find(|term| !exclusive || term.as_slice() != target)
}

#[test]
fn test_random_seeks_match_sorted_set() {
    let mut rng = StdRng::seed_from_u64(0xb10c);
    let alphabet = b"abcde\xff";
    let terms = random_terms(&mut rng, 2500, alphabet, 6);
    let set: BTreeSet<Vec<u8>> = terms.iter().cloned().collect();

    for config in configs() {
        let segment = single_field(config, IndexOptions::DocsAndFreqs, &terms);
        let dict = segment.open();
        let field = dict.field("body").unwrap();
        // one cursor for every probe so frame reuse between seeks is exercised
        let mut cursor = field.iterator();

        for _ in 0..1500 {
            let member = rng.random_bool(0.5);
            let target = if member {
                terms[rng.random_range(0..terms.len())].clone()
            } else {
                random_term(&mut rng, alphabet, 7)
            };
            let exists = set.contains(&target);

            match rng.random_range(0..3) {
                0 => {
                    assert_eq!(cursor.seek_exact(&target).unwrap(), exists, "seek_exact {}", show(&target));
                    if exists {
                        assert_eq!(cursor.term(), target.as_slice());
                        let ord = terms.binary_search(&target).unwrap();
                        assert_eq!(
                            cursor.doc_freq().unwrap(),
                            expected_postings(ord, IndexOptions::DocsAndFreqs).0.doc_freq
                        );
                    }
                    let next = cursor.next().unwrap().map(<[u8]>::to_vec);
                    assert_eq!(next.as_ref(), ceiling(&set, &target, true), "next after {}", show(&target));
                }
                1 => {
                    let status = cursor.seek_ceil(&target).unwrap();
                    match ceiling(&set, &target, false) {
                        Some(expected) => {
                            let want = if expected == &target { SeekStatus::Found } else { SeekStatus::NotFound };
                            assert_eq!(status, want, "seek_ceil {}", show(&target));
                            assert_eq!(cursor.term(), expected.as_slice());
                            let ord = terms.binary_search(expected).unwrap();
                            assert_eq!(
                                cursor.term_state().unwrap().postings,
                                expected_postings(ord, IndexOptions::DocsAndFreqs).1
                            );
                            let next = cursor.next().unwrap().map(<[u8]>::to_vec);
                            assert_eq!(next.as_ref(), ceiling(&set, expected, true));
                        }
                        None => {
                            assert_eq!(status, SeekStatus::End, "seek_ceil {}", show(&target));
                            assert!(cursor.next().unwrap().is_none());
                        }
                    }
                }
                _ => {
                    // a short run of next() from wherever the cursor is
                    for _ in 0..rng.random_range(1..5) {
                        if cursor.next().unwrap().is_none() {
                            break;
                        }
                        let term = cursor.term().to_vec();
                        assert!(set.contains(&term), "enumerated {}", show(&term));
                    }
                }
            }
        }
    }
}

#[test]
fn test_every_member_seeks_exactly() {
    let terms: Vec<Vec<u8>> = (0..1500u32)
        .map(|i| format!("k{:x}", i * 13).into_bytes())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let segment = single_field(BlockTreeConfig::new(3, 4).unwrap(), IndexOptions::Docs, &terms);
    let dict = segment.open();
    let mut cursor = dict.field("body").unwrap().iterator();
    // descending order makes every seek move backwards
    for term in terms.iter().rev() {
        assert!(cursor.seek_exact(term).unwrap(), "{}", show(term));
        assert_eq!(cursor.term(), term.as_slice());
    }
}

#[test]
fn test_seek_exact_with_state() {
    let mut rng = StdRng::seed_from_u64(21);
    let terms = random_terms(&mut rng, 700, b"pqrs", 6);
    let segment = single_field(BlockTreeConfig::new(3, 4).unwrap(), IndexOptions::DocsAndFreqs, &terms);
    let dict = segment.open();
    let field = dict.field("body").unwrap();

    let mut states = Vec::new();
    let mut cursor = field.iterator();
    while cursor.next().unwrap().is_some() {
        states.push(cursor.term_state().unwrap());
    }
    assert_eq!(states.len(), terms.len());

    let mut cursor = field.iterator();
    for ord in (0..terms.len()).step_by(41) {
        cursor.seek_exact_with_state(&terms[ord], &states[ord]);
        assert_eq!(cursor.term(), terms[ord].as_slice());
        assert_eq!(cursor.doc_freq().unwrap(), states[ord].doc_freq);
        assert_eq!(cursor.term_state().unwrap().postings, states[ord].postings);

        let next = cursor.next().unwrap().map(<[u8]>::to_vec);
        assert_eq!(next, terms.get(ord + 1).cloned());
        if ord + 1 < terms.len() {
            assert_eq!(
                cursor.term_state().unwrap().postings,
                expected_postings(ord + 1, IndexOptions::DocsAndFreqs).1
            );
        }
    }
}

#[test]
fn test_unpositioned_cursor_rejects_stats() {
    let segment = single_field(BlockTreeConfig::default(), IndexOptions::Docs, &example_terms());
    let dict = segment.open();
    let mut cursor = dict.field("body").unwrap().iterator();
    assert!(matches!(cursor.doc_freq(), Err(Error::InvalidArgument(_))));
    assert!(matches!(cursor.term_state(), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_ordinal_operations_are_unsupported() {
    let segment = single_field(BlockTreeConfig::default(), IndexOptions::Docs, &example_terms());
    let dict = segment.open();
    let mut cursor = dict.field("body").unwrap().iterator();
    cursor.next().unwrap();
    assert!(matches!(cursor.ord(), Err(Error::Unsupported(_))));
    assert!(matches!(cursor.seek_exact_ord(0), Err(Error::Unsupported(_))));
}

#[test]
fn test_seeks_need_the_index() {
    let terms = example_terms();
    let segment = single_field(BlockTreeConfig::default(), IndexOptions::Docs, &terms);
    let dict = segment.open_without_index();
    let field = dict.field("body").unwrap();
    let mut cursor = field.iterator();
    assert!(matches!(cursor.seek_exact(b"apple"), Err(Error::Unsupported(_))));
    assert!(matches!(cursor.seek_ceil(b"apple"), Err(Error::Unsupported(_))));
    // enumeration still works
    assert_eq!(collect(&mut cursor), terms);
}

#[test]
fn test_seek_exact_with_state_after_failed_seek() {
    let terms: Vec<Vec<u8>> = [b"a", b"b", b"c"].iter().map(|t| t.to_vec()).collect();
    let segment = single_field(BlockTreeConfig::default(), IndexOptions::DocsAndFreqs, &terms);
    let dict = segment.open();
    let field = dict.field("body").unwrap();

    let mut cursor = field.iterator();
    assert!(cursor.seek_exact(b"c").unwrap());
    let state = cursor.term_state().unwrap();

    let mut cursor = field.iterator();
    assert!(!cursor.seek_exact(b"bb").unwrap());
    cursor.seek_exact_with_state(b"c", &state);
    assert_eq!(cursor.term(), b"c");
    assert_eq!(cursor.term_state().unwrap().postings, state.postings);
    assert_eq!(cursor.doc_freq().unwrap(), state.doc_freq);
    assert!(cursor.next().unwrap().is_none());
}

#[test]
fn test_seek_exact_with_state_on_a_reused_cursor() {
    let mut rng = StdRng::seed_from_u64(0x5ea7);
    let alphabet = b"wxyz";
    let terms = random_terms(&mut rng, 900, alphabet, 5);
    let set: BTreeSet<Vec<u8>> = terms.iter().cloned().collect();

    for config in configs() {
        let segment = single_field(config, IndexOptions::DocsAndFreqs, &terms);
        let dict = segment.open();
        let field = dict.field("body").unwrap();

        let mut states = Vec::new();
        let mut cursor = field.iterator();
        while cursor.next().unwrap().is_some() {
            states.push(cursor.term_state().unwrap());
        }

        let mut cursor = field.iterator();
        for _ in 0..300 {
            // leave the cursor mid-scan or after a failed exact seek
            if rng.random_bool(0.5) {
                let target = random_term(&mut rng, alphabet, 6);
                if cursor.seek_exact(&target).unwrap() {
                    continue;
                }
            } else {
                for _ in 0..rng.random_range(1..4) {
                    if cursor.next().unwrap().is_none() {
                        break;
                    }
                }
            }

            // the term the cursor stopped on when it is a member, else a random one
            let ord = match terms.binary_search(&cursor.term().to_vec()) {
                Ok(ord) => ord,
                Err(_) => rng.random_range(0..terms.len()),
            };
            cursor.seek_exact_with_state(&terms[ord], &states[ord]);
            assert_eq!(cursor.term(), terms[ord].as_slice());
            assert_eq!(cursor.term_state().unwrap().postings, states[ord].postings, "{}", show(&terms[ord]));

            let next = cursor.next().unwrap().map(<[u8]>::to_vec);
            assert_eq!(next.as_ref(), ceiling(&set, &terms[ord], true), "next after {}", show(&terms[ord]));
        }
    }
}
