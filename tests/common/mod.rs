//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use blockterms::block_terms::{BlockTermsReader, TermCursor};
use blockterms::config::{BlockTermsConfig, IndexTermPolicy};
use blockterms::error::Result;
use blockterms::format::BlockTermsFormat;
use blockterms::postings::simple::{Posting, SimplePostingsReader, SimplePostingsWriter};
use blockterms::segment::{FieldInfo, FieldInfos, SegmentInfo, SegmentWriteState};
use blockterms::storage::Storage;
use blockterms::storage::memory::MemoryStorage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One term and its postings.
pub type TermEntry = (Vec<u8>, Vec<Posting>);

/// A segment written into memory storage.
pub struct TestSegment {
    pub storage: Arc<MemoryStorage>,
    pub state: SegmentWriteState,
    pub format: BlockTermsFormat,
}

impl TestSegment {
    pub fn new(config: BlockTermsConfig, max_doc: u32, fields: Vec<FieldInfo>) -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new_default()), config, max_doc, fields)
    }

    pub fn with_storage(
        storage: Arc<MemoryStorage>,
        config: BlockTermsConfig,
        max_doc: u32,
        fields: Vec<FieldInfo>,
    ) -> Self {
        let state = SegmentWriteState::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            SegmentInfo::new("_0", max_doc),
            Arc::new(FieldInfos::new(fields).unwrap()),
        );
        TestSegment {
            storage,
            state,
            format: BlockTermsFormat::new(config).unwrap(),
        }
    }

    /// Write every field's terms, in the given order, and close the segment.
    pub fn write(&self, data: &[(&FieldInfo, Vec<TermEntry>)]) -> Result<()> {
        write_segment(&self.state, &self.format, data)
    }

    pub fn open(&self) -> Result<BlockTermsReader<SimplePostingsReader>> {
        open_segment(&self.state, &self.format)
    }

    pub fn terms_file(&self) -> String {
        self.state.file_name("tib")
    }
}

pub fn write_segment(
    state: &SegmentWriteState,
    format: &BlockTermsFormat,
    data: &[(&FieldInfo, Vec<TermEntry>)],
) -> Result<()> {
    let postings = SimplePostingsWriter::new(state)?;
    let mut writer = format.fields_writer(state, postings)?;
    for (field, terms) in data {
        let mut field_writer = writer.add_field(field)?;
        for (term, postings) in terms {
            field_writer.write(term, postings)?;
        }
        field_writer.finish()?;
    }
    writer.close()
}

pub fn open_segment(
    state: &SegmentWriteState,
    format: &BlockTermsFormat,
) -> Result<BlockTermsReader<SimplePostingsReader>> {
    let read_state = state.to_read_state();
    let postings = SimplePostingsReader::open(&read_state)?;
    format.fields_reader(&read_state, postings)
}

/// Every index configuration worth exercising.
pub fn all_configs() -> Vec<BlockTermsConfig> {
    vec![
        BlockTermsConfig::fixed_gap(32),
        BlockTermsConfig::fixed_gap(3),
        BlockTermsConfig::fixed_gap(1),
        BlockTermsConfig::variable_gap(IndexTermPolicy::EveryN { interval: 32 }),
        BlockTermsConfig::variable_gap(IndexTermPolicy::EveryN { interval: 4 }),
        BlockTermsConfig::variable_gap(IndexTermPolicy::EveryNOrDocFreq {
            interval: 8,
            doc_freq_threshold: 4,
        }),
    ]
}

/// `doc_freq` postings on docs `0..doc_freq` whose freqs add up to
/// `total_term_freq`.
pub fn postings(doc_freq: u32, total_term_freq: u64) -> Vec<Posting> {
    assert!(doc_freq > 0 && total_term_freq >= doc_freq as u64);
    (0..doc_freq)
        .map(|doc| {
            let freq = if doc == doc_freq - 1 {
                (total_term_freq - (doc_freq as u64 - 1)) as u32
            } else {
                1
            };
            Posting::with_freq(doc, freq)
        })
        .collect()
}

pub fn entry(term: &str, doc_freq: u32, total_term_freq: u64) -> TermEntry {
    (term.as_bytes().to_vec(), postings(doc_freq, total_term_freq))
}

/// A sorted, duplicate free set of short terms over a small alphabet, so
/// that terms share plenty of prefixes.
pub fn random_terms(seed: u64, count: usize) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut terms = BTreeSet::new();
    while terms.len() < count {
        let len = rng.random_range(1..=8);
        let term: Vec<u8> = (0..len).map(|_| rng.random_range(b'a'..=b'f')).collect();
        terms.insert(term);
    }
    terms.into_iter().collect()
}

/// Attach seeded random postings to every term.
pub fn random_entries(seed: u64, terms: &[Vec<u8>], max_doc: u32) -> Vec<TermEntry> {
    let mut rng = StdRng::seed_from_u64(seed);
    terms
        .iter()
        .map(|term| {
            let doc_freq = rng.random_range(1..=max_doc.min(6));
            let total_term_freq = doc_freq as u64 + rng.random_range(0..4);
            (term.clone(), postings(doc_freq, total_term_freq))
        })
        .collect()
}

pub fn collect_terms(cursor: &mut TermCursor<'_, SimplePostingsReader>) -> Result<Vec<Vec<u8>>> {
    let mut terms = Vec::new();
    while let Some(term) = cursor.next()? {
        terms.push(term.to_vec());
    }
    Ok(terms)
}
