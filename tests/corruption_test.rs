//! Integration tests for corruption detection when opening segments.

mod common;

use std::sync::Arc;

use blockterms::prelude::*;
use blockterms::util::varint;
use common::{TestSegment, entry, open_segment, random_entries, random_terms};

fn write_sample(config: BlockTermsConfig) -> Result<TestSegment> {
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let segment = TestSegment::new(config, 10, vec![field.clone()]);
    let terms = random_terms(77, 100);
    segment.write(&[(&field, random_entries(78, &terms, 10))])?;
    Ok(segment)
}

fn expect_corruption<T: std::fmt::Debug>(result: Result<T>) {
    match result {
        Err(e) => assert!(e.is_corruption(), "expected corruption, got {e}"),
        Ok(v) => panic!("expected corruption, opened {v:?}"),
    }
}

#[test]
fn test_doc_count_above_max_doc() -> Result<()> {
    let segment = write_sample(BlockTermsConfig::default())?;
    let name = segment.terms_file();
    let mut bytes = segment.storage.read_file(&name)?;

    // Directory: numFields, field, numTerms, termsStart, sumTTF, sumDocFreq, docCount
    let dir_start_pos = bytes.len() - 16 - 8;
    let dir_start = u64::from_le_bytes(bytes[dir_start_pos..dir_start_pos + 8].try_into().unwrap());
    let mut pos = dir_start as usize;
    for _ in 0..6 {
        let (_, read) = varint::decode_u64(&bytes[pos..])?;
        pos += read;
    }
    let (doc_count, read) = varint::decode_u32(&bytes[pos..])?;
    assert!(doc_count <= 10);
    assert_eq!(read, 1);
    // Still a one byte vint, now above maxDoc
    bytes[pos] = 11;
    segment.storage.put_file(&name, bytes);

    let err = segment.open().unwrap_err();
    assert!(matches!(err, BlockTermsError::Corrupt(_)), "{err}");
    Ok(())
}

#[test]
fn test_smaller_max_doc_at_read_time() -> Result<()> {
    let segment = write_sample(BlockTermsConfig::default())?;

    let mut state = segment.state.clone();
    state.segment.max_doc = 2;
    expect_corruption(open_segment(&state, &segment.format));
    Ok(())
}

#[test]
fn test_truncated_files() -> Result<()> {
    for config in [
        BlockTermsConfig::fixed_gap(4),
        BlockTermsConfig::variable_gap(IndexTermPolicy::EveryN { interval: 4 }),
    ] {
        let segment = write_sample(config)?;
        let names = segment.storage.list_files()?;
        assert!(!names.is_empty());

        for name in names {
            let original = segment.storage.read_file(&name)?;
            for cut in [1, 7, original.len() / 2] {
                let truncated = original[..original.len() - cut].to_vec();
                segment.storage.put_file(&name, truncated);
                expect_corruption(segment.open());
            }
            segment.storage.put_file(&name, original);
        }
        segment.open()?;
    }
    Ok(())
}

#[test]
fn test_flipped_byte_fails_integrity_check() -> Result<()> {
    let segment = write_sample(BlockTermsConfig::default())?;
    let name = segment.terms_file();
    let mut bytes = segment.storage.read_file(&name)?;
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x5a;
    segment.storage.put_file(&name, bytes);

    // Opening only validates the footer structure and the directory
    match segment.open() {
        Ok(reader) => expect_corruption(reader.check_integrity()),
        Err(e) => assert!(e.is_corruption()),
    }
    Ok(())
}

#[test]
fn test_unknown_field_number() -> Result<()> {
    let segment = write_sample(BlockTermsConfig::default())?;

    let mut state = segment.state.clone();
    let other = FieldInfo::new("other", 3, IndexOptions::DocsAndFreqs);
    state.field_infos = Arc::new(FieldInfos::new(vec![other])?);
    let err = open_segment(&state, &segment.format).unwrap_err();
    assert!(err.is_corruption(), "{err}");
    Ok(())
}

#[test]
fn test_wrong_codec_header() -> Result<()> {
    let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
    let segment = TestSegment::new(BlockTermsConfig::fixed_gap(4), 10, vec![field.clone()]);
    segment.write(&[(&field, vec![entry("a", 1, 1), entry("b", 1, 1)])])?;

    // A fixed gap segment opened as variable gap is missing its index files
    let format = BlockTermsFormat::new(BlockTermsConfig::variable_gap(IndexTermPolicy::default()))?;
    assert!(open_segment(&segment.state, &format).is_err());

    // Swap the terms file for the index file: header mismatch
    let index_bytes = segment.storage.read_file(&segment.state.file_name("tii"))?;
    segment.storage.put_file(&segment.terms_file(), index_bytes);
    let err = segment.open().unwrap_err();
    assert!(matches!(err, BlockTermsError::Format(_)), "{err}");
    Ok(())
}
