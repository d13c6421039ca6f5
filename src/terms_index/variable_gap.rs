//! Policy driven terms index backed by an FST.
//!
//! An [`IndexTermSelector`] decides which terms are sampled; the first term
//! of every field always is. Each field's samples are compiled into an FST
//! mapping the sample's trimmed prefix to the file pointer of its block.
//! The empty key is always present and maps to the field's first block, so
//! every target has a floor.
//!
//! Two files:
//!
//! ```text
//! .tiv  header | FST bytes per field | footer
//! .tvm  header | per field: i32 field, vlong offset, vlong length | i32 -1 | footer
//! ```
//!
//! The FSTs carry no ordinals, so ordinal operations are unsupported.

use std::sync::Arc;

use ahash::AHashMap;
use fst::raw::{Fst, Output};
use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use log::debug;

use crate::codec::{
    FOOTER_LENGTH, check_header, checksum_entire_file, write_footer, write_header,
};
use crate::config::IndexTermPolicy;
use crate::error::{BlockTermsError, Result};
use crate::postings::TermStats;
use crate::segment::{FieldInfo, SegmentReadState, SegmentWriteState};
use crate::storage::{StorageOutput, StructReader, StructWriter};
use crate::terms_index::policy::{IndexTermSelector, selector_for};
use crate::terms_index::{FieldIndexEnum, TermsIndexReader, TermsIndexWriter};
use crate::util::bytes::indexed_prefix_len;

/// Index file extension.
pub const VARIABLE_GAP_INDEX_EXTENSION: &str = "tiv";

/// Meta file extension.
pub const VARIABLE_GAP_META_EXTENSION: &str = "tvm";

const CODEC_NAME: &str = "VariableGapTermsIndex";
const META_CODEC_NAME: &str = "VariableGapTermsIndexMeta";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = 1;

fn fst_error(e: fst::Error) -> BlockTermsError {
    BlockTermsError::index(format!("FST error: {e}"))
}

#[derive(Debug, Clone, Copy)]
struct FieldEntry {
    field_number: u32,
    offset: u64,
    length: u64,
}

struct FieldWriterState {
    field_number: u32,
    terms_start: u64,
    builder: MapBuilder<Vec<u8>>,
    first: bool,
    num_index_terms: u64,
}

/// Writes a variable gap terms index.
pub struct VariableGapTermsIndexWriter {
    out: Option<StructWriter<Box<dyn StorageOutput>>>,
    meta_out: Option<StructWriter<Box<dyn StorageOutput>>>,
    file_name: String,
    selector: Box<dyn IndexTermSelector>,
    fields: Vec<FieldEntry>,
    current: Option<FieldWriterState>,
    last_term: Vec<u8>,
}

impl std::fmt::Debug for VariableGapTermsIndexWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableGapTermsIndexWriter")
            .field("file_name", &self.file_name)
            .field("selector", &self.selector)
            .field("fields", &self.fields)
            .finish()
    }
}

impl VariableGapTermsIndexWriter {
    /// Create the index and meta files of a segment.
    pub fn new(state: &SegmentWriteState, policy: &IndexTermPolicy) -> Result<Self> {
        Self::with_selector(state, selector_for(policy))
    }

    /// Create the index files with a custom selector.
    pub fn with_selector(
        state: &SegmentWriteState,
        selector: Box<dyn IndexTermSelector>,
    ) -> Result<Self> {
        let file_name = state.file_name(VARIABLE_GAP_INDEX_EXTENSION);
        let meta_name = state.file_name(VARIABLE_GAP_META_EXTENSION);

        let mut out = StructWriter::new(state.storage.create_output(&file_name)?);
        if let Err(e) = write_header(&mut out, CODEC_NAME, VERSION_CURRENT, &state.suffix) {
            close_quietly(out, &file_name);
            return Err(e);
        }

        let mut meta_out = match state.storage.create_output(&meta_name) {
            Ok(meta) => StructWriter::new(meta),
            Err(e) => {
                close_quietly(out, &file_name);
                return Err(e);
            }
        };
        if let Err(e) = write_header(
            &mut meta_out,
            META_CODEC_NAME,
            VERSION_CURRENT,
            &state.suffix,
        ) {
            close_quietly(out, &file_name);
            close_quietly(meta_out, &meta_name);
            return Err(e);
        }

        Ok(VariableGapTermsIndexWriter {
            out: Some(out),
            meta_out: Some(meta_out),
            file_name,
            selector,
            fields: Vec::new(),
            current: None,
            last_term: Vec::new(),
        })
    }

    fn current(&mut self) -> Result<&mut FieldWriterState> {
        self.current
            .as_mut()
            .ok_or_else(|| BlockTermsError::invalid_state("no field in progress"))
    }
}

fn close_quietly(out: StructWriter<Box<dyn StorageOutput>>, name: &str) {
    if let Err(e) = out.close() {
        log::warn!("failed to close {name} after error: {e}");
    }
}

impl TermsIndexWriter for VariableGapTermsIndexWriter {
    fn add_field(&mut self, field: &FieldInfo, terms_file_pointer: u64) -> Result<()> {
        self.selector.new_field();
        let mut builder = MapBuilder::memory();
        builder.insert(b"", terms_file_pointer).map_err(fst_error)?;

        self.current = Some(FieldWriterState {
            field_number: field.number,
            terms_start: terms_file_pointer,
            builder,
            first: true,
            num_index_terms: 0,
        });
        self.last_term.clear();
        Ok(())
    }

    fn check_index_term(&mut self, term: &[u8], stats: &TermStats) -> Result<bool> {
        let selected = self.selector.is_index_term(term, stats);
        let field = self.current()?;
        if selected || field.first {
            field.first = false;
            Ok(true)
        } else {
            self.last_term.clear();
            self.last_term.extend_from_slice(term);
            Ok(false)
        }
    }

    fn add(&mut self, term: &[u8], _stats: &TermStats, terms_file_pointer: u64) -> Result<()> {
        let prefix_len = indexed_prefix_len(&self.last_term, term);
        let field = self
            .current
            .as_mut()
            .ok_or_else(|| BlockTermsError::invalid_state("no field in progress"))?;
        field.num_index_terms += 1;

        if term.is_empty() {
            // Already present as the field's start key
            debug_assert_eq!(terms_file_pointer, field.terms_start);
            return Ok(());
        }
        field
            .builder
            .insert(&term[..prefix_len], terms_file_pointer)
            .map_err(fst_error)?;

        self.last_term.clear();
        self.last_term.extend_from_slice(term);
        Ok(())
    }

    fn finish_field(&mut self, _terms_file_pointer: u64) -> Result<()> {
        let field = self
            .current
            .take()
            .ok_or_else(|| BlockTermsError::invalid_state("no field in progress"))?;
        if field.num_index_terms == 0 {
            return Ok(());
        }

        let bytes = field.builder.into_inner().map_err(fst_error)?;
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| BlockTermsError::invalid_state("terms index writer is closed"))?;
        let offset = out.position();
        out.write_raw(&bytes)?;

        self.fields.push(FieldEntry {
            field_number: field.field_number,
            offset,
            length: bytes.len() as u64,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let (Some(mut out), Some(mut meta_out)) = (self.out.take(), self.meta_out.take()) else {
            return Ok(());
        };

        write_footer(&mut out)?;
        let size = out.position();
        out.close()?;

        for field in &self.fields {
            meta_out.write_i32(field.field_number as i32)?;
            meta_out.write_vlong(field.offset)?;
            meta_out.write_vlong(field.length)?;
        }
        meta_out.write_i32(-1)?;
        write_footer(&mut meta_out)?;
        meta_out.close()?;

        debug!(
            "wrote variable gap terms index {}: {} fields, {} bytes",
            self.file_name,
            self.fields.len(),
            size
        );
        Ok(())
    }
}

/// Reads a variable gap terms index. FSTs are loaded at open.
pub struct VariableGapTermsIndexReader {
    fields: AHashMap<u32, Arc<Map<Arc<[u8]>>>>,
}

impl std::fmt::Debug for VariableGapTermsIndexReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableGapTermsIndexReader")
            .field("fields", &self.fields.len())
            .field("ram_bytes_used", &self.ram_bytes_used())
            .finish()
    }
}

impl VariableGapTermsIndexReader {
    /// Open the index and meta files of a segment.
    pub fn open(state: &SegmentReadState) -> Result<Self> {
        let meta_name = state.file_name(VARIABLE_GAP_META_EXTENSION);
        let mut meta_in = StructReader::new(state.storage.open_input(&meta_name)?)?;
        check_header(
            &mut meta_in,
            META_CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &state.suffix,
        )?;
        checksum_entire_file(&meta_in)?;

        let file_name = state.file_name(VARIABLE_GAP_INDEX_EXTENSION);
        let mut index_in = StructReader::new(state.storage.open_input(&file_name)?)?;
        check_header(
            &mut index_in,
            CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &state.suffix,
        )?;
        checksum_entire_file(&index_in)?;
        let body_start = index_in.position();
        let body_end = index_in.size() - FOOTER_LENGTH;

        let mut fields = AHashMap::new();
        loop {
            let field_number = meta_in.read_i32()?;
            if field_number == -1 {
                break;
            }
            if field_number < 0 {
                return Err(BlockTermsError::corrupt(format!(
                    "invalid field number: {field_number}"
                )));
            }

            let offset = meta_in.read_vlong()?;
            let length = meta_in.read_vlong()?;
            if offset < body_start || offset.saturating_add(length) > body_end {
                return Err(BlockTermsError::corrupt(format!(
                    "invalid FST range for field {field_number}: offset={offset} length={length}"
                )));
            }

            index_in.seek_to(offset)?;
            let bytes = index_in.read_raw(length as usize)?;
            let map = Map::new(Arc::<[u8]>::from(bytes)).map_err(|e| {
                BlockTermsError::corrupt(format!("invalid FST for field {field_number}: {e}"))
            })?;
            if !map.contains_key(b"") {
                return Err(BlockTermsError::corrupt(format!(
                    "FST for field {field_number} has no start entry"
                )));
            }

            if fields
                .insert(field_number as u32, Arc::new(map))
                .is_some()
            {
                return Err(BlockTermsError::corrupt(format!(
                    "duplicate field: {field_number}"
                )));
            }
        }

        debug!(
            "opened variable gap terms index {file_name}: {} fields",
            fields.len()
        );
        Ok(VariableGapTermsIndexReader { fields })
    }

    /// Approximate heap usage of the loaded FSTs.
    pub fn ram_bytes_used(&self) -> usize {
        self.fields.values().map(|m| m.as_fst().size()).sum()
    }
}

impl TermsIndexReader for VariableGapTermsIndexReader {
    fn supports_ord(&self) -> bool {
        false
    }

    fn field_enum(&self, field_number: u32) -> Option<Box<dyn FieldIndexEnum>> {
        let fst = self.fields.get(&field_number)?;
        Some(Box::new(VariableGapFieldEnum {
            fst: Arc::clone(fst),
            term: Vec::new(),
        }))
    }
}

/// Greatest key at or before `target`, with its value.
fn floor(fst: &Fst<Arc<[u8]>>, target: &[u8]) -> Option<(Vec<u8>, u64)> {
    let mut node = fst.root();
    let mut output = Output::zero();
    let mut key = Vec::with_capacity(target.len());
    let mut best = None;

    for &byte in target {
        if node.is_final() {
            best = Some((key.clone(), output.cat(node.final_output()).value()));
        }

        // A smaller branch at this depth beats anything shallower
        if let Some(i) = (0..node.len()).rev().find(|&i| node.transition(i).inp < byte) {
            let t = node.transition(i);
            let mut max_key = key.clone();
            max_key.push(t.inp);
            let mut max_output = output.cat(t.out);
            let mut max_node = fst.node(t.addr);
            while max_node.len() > 0 {
                let last = max_node.transition(max_node.len() - 1);
                max_key.push(last.inp);
                max_output = max_output.cat(last.out);
                max_node = fst.node(last.addr);
            }
            best = Some((max_key, max_output.cat(max_node.final_output()).value()));
        }

        match node.find_input(byte) {
            Some(i) => {
                let t = node.transition(i);
                key.push(byte);
                output = output.cat(t.out);
                node = fst.node(t.addr);
            }
            None => return best,
        }
    }

    if node.is_final() {
        best = Some((key, output.cat(node.final_output()).value()));
    }
    best
}

struct VariableGapFieldEnum {
    fst: Arc<Map<Arc<[u8]>>>,
    term: Vec<u8>,
}

impl FieldIndexEnum for VariableGapFieldEnum {
    fn seek(&mut self, target: &[u8]) -> Result<u64> {
        let (key, value) = floor(self.fst.as_fst(), target)
            .ok_or_else(|| BlockTermsError::corrupt("terms index has no floor entry"))?;
        self.term = key;
        Ok(value)
    }

    fn next(&mut self) -> Result<Option<u64>> {
        let next = {
            let mut stream = self.fst.range().gt(&self.term).into_stream();
            stream.next().map(|(key, value)| (key.to_vec(), value))
        };
        Ok(next.map(|(key, value)| {
            self.term = key;
            value
        }))
    }

    fn term(&self) -> &[u8] {
        &self.term
    }

    fn ord(&self) -> Result<u64> {
        Err(BlockTermsError::unsupported(
            "variable gap terms index does not support ordinals",
        ))
    }

    fn seek_ord(&mut self, _ord: u64) -> Result<u64> {
        Err(BlockTermsError::unsupported(
            "variable gap terms index does not support ordinals",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{FieldInfos, IndexOptions, SegmentInfo};
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn states() -> (Arc<MemoryStorage>, SegmentWriteState) {
        let memory = Arc::new(MemoryStorage::new_default());
        let storage: Arc<dyn Storage> = memory.clone();
        let state = SegmentWriteState::new(
            storage,
            SegmentInfo::new("_0", 10),
            Arc::new(FieldInfos::default()),
        );
        (memory, state)
    }

    fn write_field(
        writer: &mut VariableGapTermsIndexWriter,
        field: &FieldInfo,
        terms: &[(&str, u32)],
    ) -> Vec<usize> {
        let mut sampled = Vec::new();
        writer.add_field(field, 1000).unwrap();
        for (i, (term, doc_freq)) in terms.iter().enumerate() {
            let stats = TermStats::new(*doc_freq, *doc_freq as u64);
            if writer.check_index_term(term.as_bytes(), &stats).unwrap() {
                writer
                    .add(term.as_bytes(), &stats, 1000 + i as u64 * 100)
                    .unwrap();
                sampled.push(i);
            }
        }
        writer.finish_field(9999).unwrap();
        sampled
    }

    fn entries(reader: &VariableGapTermsIndexReader, field: u32) -> Vec<(Vec<u8>, u64)> {
        let mut index = reader.field_enum(field).unwrap();
        let mut result = vec![(Vec::new(), index.seek(b"").unwrap())];
        while let Some(fp) = index.next().unwrap() {
            result.push((index.term().to_vec(), fp));
        }
        result
    }

    const TERMS: [(&str, u32); 6] = [
        ("apple", 1),
        ("apply", 1),
        ("banana", 50),
        ("band", 1),
        ("cat", 1),
        ("dog", 1),
    ];

    #[test]
    fn test_every_n_samples() {
        let (_memory, state) = states();
        let field = FieldInfo::new("f", 0, IndexOptions::Docs);

        let mut writer =
            VariableGapTermsIndexWriter::new(&state, &IndexTermPolicy::EveryN { interval: 2 })
                .unwrap();
        assert_eq!(write_field(&mut writer, &field, &TERMS), vec![0, 2, 4]);
        writer.close().unwrap();
        writer.close().unwrap();

        let reader = VariableGapTermsIndexReader::open(&state.to_read_state()).unwrap();
        assert!(!reader.supports_ord());
        assert_eq!(
            entries(&reader, 0),
            vec![
                (b"".to_vec(), 1000),
                (b"a".to_vec(), 1000),
                (b"b".to_vec(), 1200),
                (b"c".to_vec(), 1400),
            ]
        );
    }

    #[test]
    fn test_doc_freq_policy_forces_first_and_frequent_terms() {
        let (_memory, state) = states();
        let field = FieldInfo::new("f", 0, IndexOptions::Docs);

        let policy = IndexTermPolicy::EveryNOrDocFreq {
            interval: 100,
            doc_freq_threshold: 10,
        };
        let mut writer = VariableGapTermsIndexWriter::new(&state, &policy).unwrap();
        // apple is first, banana is frequent
        assert_eq!(write_field(&mut writer, &field, &TERMS), vec![0, 2]);
        writer.close().unwrap();
    }

    #[test]
    fn test_floor_seek() {
        let (_memory, state) = states();
        let field = FieldInfo::new("f", 7, IndexOptions::Docs);

        let mut writer =
            VariableGapTermsIndexWriter::new(&state, &IndexTermPolicy::EveryN { interval: 1 })
                .unwrap();
        write_field(&mut writer, &field, &TERMS);
        writer.close().unwrap();

        let reader = VariableGapTermsIndexReader::open(&state.to_read_state()).unwrap();
        let mut index = reader.field_enum(7).unwrap();

        // Keys: "", a, apply, b, band, c, d
        let cases: [(&[u8], &[u8], u64); 9] = [
            (b"0", b"", 1000),
            (b"apple", b"a", 1000),
            (b"applz", b"apply", 1100),
            (b"apply", b"apply", 1100),
            (b"az", b"apply", 1100),
            (b"bana", b"b", 1200),
            (b"bane", b"band", 1300),
            (b"cow", b"c", 1400),
            (b"zebra", b"d", 1500),
        ];
        for (target, key, fp) in cases {
            assert_eq!(index.seek(target).unwrap(), fp, "target {:?}", target);
            assert_eq!(index.term(), key);
        }

        assert!(matches!(
            index.ord(),
            Err(BlockTermsError::UnsupportedOperation(_))
        ));
        assert!(index.seek_ord(0).is_err());
    }

    #[test]
    fn test_truncated_meta_is_rejected() {
        let (memory, state) = states();
        let field = FieldInfo::new("f", 0, IndexOptions::Docs);

        let mut writer =
            VariableGapTermsIndexWriter::new(&state, &IndexTermPolicy::EveryN { interval: 2 })
                .unwrap();
        write_field(&mut writer, &field, &TERMS);
        writer.close().unwrap();

        let mut bytes = memory.read_file("_0.tvm").unwrap();
        bytes.truncate(bytes.len() - 1);
        memory.put_file("_0.tvm", bytes);

        let err = VariableGapTermsIndexReader::open(&state.to_read_state()).unwrap_err();
        assert!(err.is_corruption());
    }
}
