//! Integration tests for writing and reading block terms dictionaries.

mod common;

use blockterms::postings::simple::Posting;
use blockterms::prelude::*;
use common::{TestSegment, all_configs, collect_terms, entry, random_entries, random_terms};

fn body() -> FieldInfo {
    FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs)
}

#[test]
fn test_apple_example() -> Result<()> {
    for config in all_configs() {
        let field = body();
        let segment = TestSegment::new(config, 10, vec![field.clone()]);
        segment.write(&[(
            &field,
            vec![
                entry("apple", 3, 10),
                entry("application", 1, 1),
                entry("apply", 2, 4),
            ],
        )])?;

        let reader = segment.open()?;
        let terms = reader.terms("body").unwrap();
        assert_eq!(terms.size(), 3);

        let mut cursor = terms.iterator()?;
        let mut decoded = Vec::new();
        while let Some(term) = cursor.next()? {
            let term = String::from_utf8(term.to_vec()).unwrap();
            decoded.push((term, cursor.doc_freq()?, cursor.total_term_freq()?));
        }
        assert_eq!(
            decoded,
            vec![
                ("apple".to_string(), 3, 10),
                ("application".to_string(), 1, 1),
                ("apply".to_string(), 2, 4),
            ]
        );

        let mut cursor = terms.iterator()?;
        assert_eq!(cursor.seek_ceil(b"app")?, SeekStatus::NotFound);
        assert_eq!(cursor.term(), b"apple");
        assert_eq!(cursor.doc_freq()?, 3);

        assert_eq!(cursor.seek_ceil(b"applicatio")?, SeekStatus::NotFound);
        assert_eq!(cursor.term(), b"application");
        assert_eq!(cursor.seek_ceil(b"apply")?, SeekStatus::Found);
        assert_eq!(cursor.total_term_freq()?, 4);
        assert_eq!(cursor.seek_ceil(b"applz")?, SeekStatus::End);
        assert_eq!(cursor.seek_ceil(b"")?, SeekStatus::NotFound);
        assert_eq!(cursor.term(), b"apple");
    }
    Ok(())
}

#[test]
fn test_round_trip_random_terms() -> Result<()> {
    let terms = random_terms(42, 600);
    let entries = random_entries(7, &terms, 20);

    for config in all_configs() {
        let field = body();
        let segment = TestSegment::new(config, 20, vec![field.clone()]);
        segment.write(&[(&field, entries.clone())])?;

        let reader = segment.open()?;
        let field_terms = reader.terms("body").unwrap();
        assert_eq!(field_terms.size(), entries.len() as u64);

        let mut cursor = field_terms.iterator()?;
        for (term, postings) in &entries {
            assert_eq!(cursor.next()?, Some(term.as_slice()));
            let total: u64 = postings.iter().map(|p| p.freq as u64).sum();
            assert_eq!(cursor.doc_freq()?, postings.len() as u32);
            assert_eq!(cursor.total_term_freq()?, total);
        }
        assert_eq!(cursor.next()?, None);
        // Stays at the end
        assert_eq!(cursor.next()?, None);

        let sum_doc_freq: u64 = entries.iter().map(|(_, p)| p.len() as u64).sum();
        let sum_ttf: u64 = entries
            .iter()
            .flat_map(|(_, p)| p.iter())
            .map(|p| p.freq as u64)
            .sum();
        let doc_count = entries
            .iter()
            .flat_map(|(_, p)| p.iter())
            .map(|p| p.doc_id)
            .collect::<std::collections::BTreeSet<_>>()
            .len() as u32;
        assert_eq!(field_terms.sum_doc_freq(), sum_doc_freq);
        assert_eq!(field_terms.sum_total_term_freq(), Some(sum_ttf));
        assert_eq!(field_terms.doc_count(), doc_count);

        reader.check_integrity()?;
    }
    Ok(())
}

#[test]
fn test_seek_ceil_matches_sorted_set() -> Result<()> {
    let terms = random_terms(1234, 400);
    let entries = random_entries(99, &terms, 8);
    let probes = random_terms(5678, 300);

    for config in all_configs() {
        let field = body();
        let segment = TestSegment::new(config, 8, vec![field.clone()]);
        segment.write(&[(&field, entries.clone())])?;
        let reader = segment.open()?;
        let field_terms = reader.terms("body").unwrap();

        let expected = |target: &[u8]| terms.iter().position(|t| t.as_slice() >= target);

        // A fresh cursor per probe
        for probe in &probes {
            let mut cursor = field_terms.iterator()?;
            let status = cursor.seek_ceil(probe)?;
            match expected(probe) {
                None => assert_eq!(status, SeekStatus::End),
                Some(i) => {
                    let want = if terms[i] == *probe {
                        SeekStatus::Found
                    } else {
                        SeekStatus::NotFound
                    };
                    assert_eq!(status, want, "target {:?}", String::from_utf8_lossy(probe));
                    assert_eq!(cursor.term(), terms[i].as_slice());
                    assert_eq!(cursor.doc_freq()?, entries[i].1.len() as u32);
                    assert_eq!(cursor.next()?, terms.get(i + 1).map(|t| t.as_slice()));
                }
            }
        }

        // One cursor seeking forward, which takes the in-block shortcut
        let mut sorted_probes = probes.clone();
        sorted_probes.extend(terms.iter().step_by(7).cloned());
        sorted_probes.sort();
        let mut cursor = field_terms.iterator()?;
        for probe in &sorted_probes {
            let status = cursor.seek_ceil(probe)?;
            match expected(probe) {
                None => assert_eq!(status, SeekStatus::End),
                Some(i) => {
                    assert_eq!(status == SeekStatus::Found, terms[i] == *probe);
                    assert_eq!(cursor.term(), terms[i].as_slice());
                    assert_eq!(cursor.doc_freq()?, entries[i].1.len() as u32);
                }
            }
        }

        // And backwards
        let mut cursor = field_terms.iterator()?;
        for probe in sorted_probes.iter().rev() {
            let status = cursor.seek_ceil(probe)?;
            if let Some(i) = expected(probe) {
                assert_eq!(status == SeekStatus::Found, terms[i] == *probe);
                assert_eq!(cursor.term(), terms[i].as_slice());
            } else {
                assert_eq!(status, SeekStatus::End);
            }
        }
    }
    Ok(())
}

#[test]
fn test_seek_exact() -> Result<()> {
    let field = body();
    let segment = TestSegment::new(BlockTermsConfig::fixed_gap(2), 10, vec![field.clone()]);
    segment.write(&[(
        &field,
        vec![
            entry("a", 1, 1),
            entry("ab", 1, 1),
            entry("abc", 1, 1),
            entry("b", 1, 1),
            entry("bcd", 1, 1),
        ],
    )])?;
    let reader = segment.open()?;
    let mut cursor = reader.terms("body").unwrap().iterator()?;

    assert!(cursor.seek_exact(b"abc")?);
    assert!(!cursor.seek_exact(b"abcd")?);
    assert_eq!(cursor.term(), b"b");
    assert!(cursor.seek_exact(b"bcd")?);
    assert!(!cursor.seek_exact(b"c")?);
    assert!(cursor.seek_exact(b"a")?);
    Ok(())
}

#[test]
fn test_empty_term() -> Result<()> {
    for config in all_configs() {
        let field = body();
        let segment = TestSegment::new(config, 10, vec![field.clone()]);
        segment.write(&[(
            &field,
            vec![entry("", 2, 2), entry("a", 1, 1), entry("b", 1, 3)],
        )])?;
        let reader = segment.open()?;
        let terms = reader.terms("body").unwrap();

        let mut cursor = terms.iterator()?;
        assert_eq!(collect_terms(&mut cursor)?, vec![b"".to_vec(), b"a".to_vec(), b"b".to_vec()]);

        let mut cursor = terms.iterator()?;
        assert_eq!(cursor.seek_ceil(b"")?, SeekStatus::Found);
        assert_eq!(cursor.doc_freq()?, 2);
        assert_eq!(cursor.seek_ceil(b"aa")?, SeekStatus::NotFound);
        assert_eq!(cursor.term(), b"b");
        assert_eq!(cursor.total_term_freq()?, 3);
    }
    Ok(())
}

#[test]
fn test_seek_exact_with_state() -> Result<()> {
    let terms = random_terms(11, 150);
    let entries = random_entries(12, &terms, 10);

    for config in all_configs() {
        let field = body();
        let segment = TestSegment::new(config, 10, vec![field.clone()]);
        segment.write(&[(&field, entries.clone())])?;
        let reader = segment.open()?;
        let field_terms = reader.terms("body").unwrap();

        let mut states = Vec::new();
        let mut cursor = field_terms.iterator()?;
        while cursor.next()?.is_some() {
            states.push(cursor.term_state()?);
        }
        assert_eq!(states.len(), terms.len());

        for i in (0..terms.len()).step_by(13) {
            let mut cursor = field_terms.iterator()?;
            cursor.seek_exact_with_state(&terms[i], &states[i]);
            assert_eq!(cursor.term(), terms[i].as_slice());
            assert_eq!(cursor.doc_freq()?, entries[i].1.len() as u32);
            assert_eq!(cursor.term_state()?, states[i]);

            // The deferred repositioning happens on next()
            assert_eq!(cursor.next()?, terms.get(i + 1).map(|t| t.as_slice()));
            if let Some(next) = entries.get(i + 1) {
                assert_eq!(cursor.doc_freq()?, next.1.len() as u32);
                if field_terms.supports_ord() {
                    assert_eq!(cursor.ord()?, i as u64 + 1);
                }
            }
        }
    }
    Ok(())
}

#[test]
fn test_postings_through_term_state() -> Result<()> {
    let field = body();
    let segment = TestSegment::new(BlockTermsConfig::default(), 50, vec![field.clone()]);
    let many = vec![
        Posting::with_freq(3, 2),
        Posting::with_freq(17, 1),
        Posting::with_freq(42, 6),
    ];
    segment.write(&[(
        &field,
        vec![
            (b"many".to_vec(), many.clone()),
            (b"single".to_vec(), vec![Posting::with_freq(9, 4)]),
        ],
    )])?;
    let reader = segment.open()?;
    let terms = reader.terms("body").unwrap();
    let mut cursor = terms.iterator()?;

    assert!(cursor.seek_exact(b"many")?);
    let state = cursor.term_state()?;
    assert_eq!(reader.postings_reader().postings(terms.field_info(), &state)?, many);

    assert!(cursor.seek_exact(b"single")?);
    assert_eq!(cursor.postings_state()?.singleton_doc, Some(9));
    let state = cursor.term_state()?;
    assert_eq!(
        reader.postings_reader().postings(terms.field_info(), &state)?,
        vec![Posting::with_freq(9, 4)]
    );
    Ok(())
}

#[test]
fn test_docs_only_field() -> Result<()> {
    let field = FieldInfo::new("id", 0, IndexOptions::Docs);
    let segment = TestSegment::new(BlockTermsConfig::fixed_gap(4), 10, vec![field.clone()]);
    segment.write(&[(
        &field,
        vec![entry("x", 3, 9), entry("y", 1, 1), entry("z", 2, 5)],
    )])?;
    let reader = segment.open()?;
    let terms = reader.terms("id").unwrap();

    assert!(!terms.has_freqs());
    assert_eq!(terms.sum_total_term_freq(), None);
    assert_eq!(terms.sum_doc_freq(), 6);
    assert_eq!(terms.doc_count(), 3);

    let mut cursor = terms.iterator()?;
    assert!(cursor.seek_exact(b"x")?);
    assert_eq!(cursor.doc_freq()?, 3);
    // Without frequencies the total equals the doc freq
    assert_eq!(cursor.total_term_freq()?, 3);
    Ok(())
}

#[test]
fn test_empty_field_is_absent() -> Result<()> {
    let body = body();
    let empty = FieldInfo::new("empty", 1, IndexOptions::DocsAndFreqs);
    let segment = TestSegment::new(
        BlockTermsConfig::default(),
        10,
        vec![body.clone(), empty.clone()],
    );
    segment.write(&[
        (&empty, vec![(b"gone".to_vec(), Vec::new()), (b"too".to_vec(), Vec::new())]),
        (&body, vec![(b"dropped".to_vec(), Vec::new()), entry("kept", 1, 1)]),
    ])?;

    let reader = segment.open()?;
    assert!(reader.terms("empty").is_none());
    assert!(reader.terms("missing").is_none());
    assert_eq!(reader.size(), 1);
    assert_eq!(reader.fields().collect::<Vec<_>>(), vec!["body"]);

    let terms = reader.terms("body").unwrap();
    assert_eq!(terms.size(), 1);
    assert_eq!(collect_terms(&mut terms.iterator()?)?, vec![b"kept".to_vec()]);
    Ok(())
}

#[test]
fn test_multiple_fields() -> Result<()> {
    for config in all_configs() {
        let title = FieldInfo::new("title", 0, IndexOptions::DocsAndFreqs);
        let body = FieldInfo::new("body", 1, IndexOptions::DocsAndFreqsAndPositions);
        let segment = TestSegment::new(config, 10, vec![title.clone(), body.clone()]);

        let body_terms = random_terms(3, 80);
        let title_terms = random_terms(4, 30);
        segment.write(&[
            (&body, random_entries(5, &body_terms, 10)),
            (&title, random_entries(6, &title_terms, 10)),
        ])?;

        let reader = segment.open()?;
        assert_eq!(reader.fields().collect::<Vec<_>>(), vec!["body", "title"]);
        let mut cursor = reader.terms("body").unwrap().iterator()?;
        assert_eq!(collect_terms(&mut cursor)?, body_terms);
        let mut cursor = reader.terms("title").unwrap().iterator()?;
        assert_eq!(collect_terms(&mut cursor)?, title_terms);
    }
    Ok(())
}

#[test]
fn test_unpositioned_cursor() -> Result<()> {
    let field = body();
    let segment = TestSegment::new(BlockTermsConfig::default(), 10, vec![field.clone()]);
    segment.write(&[(&field, vec![entry("a", 1, 1)])])?;
    let reader = segment.open()?;
    let mut cursor = reader.terms("body").unwrap().iterator()?;

    assert!(cursor.term().is_empty());
    assert!(matches!(cursor.doc_freq(), Err(BlockTermsError::InvalidState(_))));

    assert_eq!(cursor.seek_ceil(b"b")?, SeekStatus::End);
    assert!(matches!(cursor.term_state(), Err(BlockTermsError::InvalidState(_))));

    assert_eq!(cursor.seek_ceil(b"a")?, SeekStatus::Found);
    assert_eq!(cursor.doc_freq()?, 1);
    Ok(())
}

#[test]
fn test_writer_rejects_bad_fields() -> Result<()> {
    let field = body();
    let segment = TestSegment::new(BlockTermsConfig::default(), 10, vec![field.clone()]);
    let state = &segment.state;
    let postings = blockterms::postings::simple::SimplePostingsWriter::new(state)?;
    let mut writer = segment.format.fields_writer(state, postings)?;

    let unknown = FieldInfo::new("unknown", 7, IndexOptions::Docs);
    assert!(matches!(
        writer.add_field(&unknown),
        Err(BlockTermsError::InvalidArgument(_))
    ));

    writer.add_field(&field)?.finish()?;
    assert!(matches!(
        writer.add_field(&field),
        Err(BlockTermsError::InvalidArgument(_))
    ));

    writer.close()?;
    // Closing twice is a no-op
    writer.close()?;
    assert!(writer.add_field(&field).is_err());
    Ok(())
}
