//! Integration tests for segments written to disk.

mod common;

use std::sync::Arc;

use blockterms::prelude::*;
use blockterms::postings::simple::{SimplePostingsReader, SimplePostingsWriter};
use blockterms::storage::StorageConfig;
use blockterms::storage::file::FileStorage;
use common::{all_configs, collect_terms, random_entries, random_terms};
use tempfile::TempDir;

fn file_state(dir: &TempDir, use_mmap: bool, field: &FieldInfo) -> Result<SegmentWriteState> {
    let config = StorageConfig {
        use_mmap,
        ..Default::default()
    };
    let storage = FileStorage::new(dir.path(), config)?;
    Ok(SegmentWriteState::new(
        Arc::new(storage),
        SegmentInfo::new("_1", 10),
        Arc::new(FieldInfos::new(vec![field.clone()])?),
    ))
}

#[test]
fn test_file_round_trip() -> Result<()> {
    let terms = random_terms(81, 150);
    let entries = random_entries(82, &terms, 10);
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);

    for use_mmap in [false, true] {
        for config in all_configs() {
            let dir = TempDir::new().unwrap();
            let state = file_state(&dir, use_mmap, &field)?;
            let format = BlockTermsFormat::new(config)?;

            let postings = SimplePostingsWriter::new(&state)?;
            let mut writer = format.fields_writer(&state, postings)?;
            let mut field_writer = writer.add_field(&field)?;
            for (term, postings) in &entries {
                field_writer.write(term, postings)?;
            }
            field_writer.finish()?;
            writer.close()?;

            // Reopen through a fresh storage instance
            let state = file_state(&dir, use_mmap, &field)?.to_read_state();
            let postings = SimplePostingsReader::open(&state)?;
            let reader = format.fields_reader(&state, postings)?;
            reader.check_integrity()?;

            let field_terms = reader.terms("body").unwrap();
            assert_eq!(field_terms.size(), terms.len() as u64);
            let mut cursor = field_terms.iterator()?;
            assert_eq!(collect_terms(&mut cursor)?, terms);

            let mut cursor = field_terms.iterator()?;
            for (term, expected) in entries.iter().step_by(11) {
                assert!(cursor.seek_exact(term)?);
                let state = cursor.term_state()?;
                let postings = reader.postings_reader().postings(field_terms.field_info(), &state)?;
                assert_eq!(&postings, expected);
            }
        }
    }
    Ok(())
}

#[test]
fn test_missing_segment_files() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let state = file_state(&dir, false, &field)?.to_read_state();

    let err = SimplePostingsReader::open(&state).unwrap_err();
    assert!(matches!(err, BlockTermsError::Storage(_)), "{err}");
    assert!(err.to_string().contains("_1.doc"), "{err}");
    Ok(())
}
