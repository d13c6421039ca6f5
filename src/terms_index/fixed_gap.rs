//! Fixed interval terms index.
//!
//! Every `interval`th term of a field (starting with the first) is sampled.
//! The prefixes of the samples are concatenated into one byte store per
//! field, followed by two monotonic packed arrays: the sample's block
//! address relative to the field's first block, and the sample's offset in
//! the byte store. The array position of a sample times the interval is the
//! ordinal of the sampled term.
//!
//! File layout (`.tii`):
//!
//! ```text
//! header | vint interval | vint packed version | vint packed block size
//! per field: prefix bytes | packed addresses | packed offsets
//! directory: vint numFields, then per field
//!     vint field | vlong numIndexTerms | vlong termsStart | vlong indexStart
//!     | vlong packedIndexStart | vlong packedOffsetsStart
//! trailer | footer
//! ```

use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::codec::{
    check_header, checksum_entire_file, seek_dir, write_footer, write_header, write_trailer,
};
use crate::error::{BlockTermsError, Result};
use crate::postings::TermStats;
use crate::segment::{FieldInfo, SegmentReadState, SegmentWriteState};
use crate::storage::{StorageInput, StorageOutput, StructReader, StructWriter};
use crate::terms_index::{FieldIndexEnum, TermsIndexReader, TermsIndexWriter};
use crate::util::bytes::indexed_prefix_len;
use crate::util::packed::{self, MonotonicBlockPackedReader, PACKED_VERSION_CURRENT};

/// Index file extension.
pub const FIXED_GAP_INDEX_EXTENSION: &str = "tii";

const CODEC_NAME: &str = "FixedGapTermsIndex";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = 1;

#[derive(Debug, Clone)]
struct FieldEntry {
    field_number: u32,
    num_index_terms: u64,
    terms_start: u64,
    index_start: u64,
    packed_index_start: u64,
    packed_offsets_start: u64,
}

#[derive(Debug)]
struct FieldWriterState {
    field_number: u32,
    index_start: u64,
    terms_start: u64,
    num_terms: u64,
    term_addresses: Vec<u64>,
    term_offsets: Vec<u64>,
}

/// Writes a fixed interval terms index.
#[derive(Debug)]
pub struct FixedGapTermsIndexWriter {
    out: Option<StructWriter<Box<dyn StorageOutput>>>,
    file_name: String,
    interval: u32,
    block_size: u32,
    fields: Vec<FieldEntry>,
    current: Option<FieldWriterState>,
    last_term: Vec<u8>,
}

impl FixedGapTermsIndexWriter {
    /// Create the index file of a segment.
    pub fn new(state: &SegmentWriteState, interval: u32, block_size: u32) -> Result<Self> {
        if interval == 0 {
            return Err(BlockTermsError::invalid_argument("interval must be >= 1"));
        }
        let block_size = packed::check_block_size(block_size)
            .map_err(|e| BlockTermsError::invalid_argument(e.to_string()))?;

        let file_name = state.file_name(FIXED_GAP_INDEX_EXTENSION);
        let mut out = StructWriter::new(state.storage.create_output(&file_name)?);
        if let Err(e) = Self::write_start(&mut out, &state.suffix, interval, block_size) {
            if let Err(close_err) = out.close() {
                log::warn!("failed to close {file_name} after error: {close_err}");
            }
            return Err(e);
        }

        Ok(FixedGapTermsIndexWriter {
            out: Some(out),
            file_name,
            interval,
            block_size,
            fields: Vec::new(),
            current: None,
            last_term: Vec::new(),
        })
    }

    fn write_start(
        out: &mut StructWriter<Box<dyn StorageOutput>>,
        suffix: &str,
        interval: u32,
        block_size: u32,
    ) -> Result<()> {
        write_header(out, CODEC_NAME, VERSION_CURRENT, suffix)?;
        out.write_vint(interval)?;
        out.write_vint(PACKED_VERSION_CURRENT)?;
        out.write_vint(block_size)
    }

    fn out(&mut self) -> Result<&mut StructWriter<Box<dyn StorageOutput>>> {
        self.out
            .as_mut()
            .ok_or_else(|| BlockTermsError::invalid_state("terms index writer is closed"))
    }

    fn current(&mut self) -> Result<&mut FieldWriterState> {
        self.current
            .as_mut()
            .ok_or_else(|| BlockTermsError::invalid_state("no field in progress"))
    }
}

impl TermsIndexWriter for FixedGapTermsIndexWriter {
    fn add_field(&mut self, field: &FieldInfo, terms_file_pointer: u64) -> Result<()> {
        let index_start = self.out()?.position();
        self.current = Some(FieldWriterState {
            field_number: field.number,
            index_start,
            terms_start: terms_file_pointer,
            num_terms: 0,
            term_addresses: Vec::new(),
            term_offsets: vec![0],
        });
        self.last_term.clear();
        Ok(())
    }

    fn check_index_term(&mut self, term: &[u8], _stats: &TermStats) -> Result<bool> {
        let interval = self.interval as u64;
        let field = self.current()?;
        let n = field.num_terms;
        field.num_terms += 1;

        if n % interval == 0 {
            return Ok(true);
        }
        if field.num_terms % interval == 0 {
            // The next term is sampled; its prefix is trimmed against this one
            self.last_term.clear();
            self.last_term.extend_from_slice(term);
        }
        Ok(false)
    }

    fn add(&mut self, term: &[u8], _stats: &TermStats, terms_file_pointer: u64) -> Result<()> {
        let indexed_len = if self.current()?.term_addresses.is_empty() {
            // No previous term: the first sample floors every target
            0
        } else {
            indexed_prefix_len(&self.last_term, term)
        };
        self.out()?.write_raw(&term[..indexed_len])?;

        let field = self.current()?;
        let last_offset = field.term_offsets.last().copied().unwrap_or(0);
        field.term_offsets.push(last_offset + indexed_len as u64);
        field
            .term_addresses
            .push(terms_file_pointer - field.terms_start);

        self.last_term.clear();
        self.last_term.extend_from_slice(term);
        Ok(())
    }

    fn finish_field(&mut self, _terms_file_pointer: u64) -> Result<()> {
        let field = self
            .current
            .take()
            .ok_or_else(|| BlockTermsError::invalid_state("no field in progress"))?;
        let num_index_terms = field.term_addresses.len() as u64;
        if num_index_terms == 0 {
            return Ok(());
        }

        let block_size = self.block_size;
        let out = self.out()?;
        let packed_index_start = out.position();
        packed::write_monotonic(out, &field.term_addresses, block_size)?;
        let packed_offsets_start = out.position();
        packed::write_monotonic(out, &field.term_offsets, block_size)?;

        self.fields.push(FieldEntry {
            field_number: field.field_number,
            num_index_terms,
            terms_start: field.terms_start,
            index_start: field.index_start,
            packed_index_start,
            packed_offsets_start,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };

        let dir_start = out.position();
        out.write_vint(self.fields.len() as u32)?;
        for field in &self.fields {
            out.write_vint(field.field_number)?;
            out.write_vlong(field.num_index_terms)?;
            out.write_vlong(field.terms_start)?;
            out.write_vlong(field.index_start)?;
            out.write_vlong(field.packed_index_start)?;
            out.write_vlong(field.packed_offsets_start)?;
        }
        write_trailer(&mut out, dir_start)?;
        write_footer(&mut out)?;
        let size = out.position();
        out.close()?;

        debug!(
            "wrote fixed gap terms index {}: {} fields, {} bytes",
            self.file_name,
            self.fields.len(),
            size
        );
        Ok(())
    }
}

/// In-memory samples of one field.
#[derive(Debug)]
struct FieldIndex {
    interval: u64,
    terms_start: u64,
    num_index_terms: usize,
    term_bytes: Vec<u8>,
    term_addresses: MonotonicBlockPackedReader,
    term_offsets: MonotonicBlockPackedReader,
}

impl FieldIndex {
    fn term_range(&self, idx: usize) -> (usize, usize) {
        (
            self.term_offsets.get(idx) as usize,
            self.term_offsets.get(idx + 1) as usize,
        )
    }

    fn term(&self, idx: usize) -> &[u8] {
        let (start, end) = self.term_range(idx);
        &self.term_bytes[start..end]
    }

    fn address(&self, idx: usize) -> u64 {
        self.terms_start + self.term_addresses.get(idx)
    }
}

/// Reads a fixed interval terms index. Everything is loaded at open.
#[derive(Debug)]
pub struct FixedGapTermsIndexReader {
    interval: u32,
    fields: AHashMap<u32, Arc<FieldIndex>>,
}

impl FixedGapTermsIndexReader {
    /// Open and fully load the index file of a segment.
    pub fn open(state: &SegmentReadState) -> Result<Self> {
        let file_name = state.file_name(FIXED_GAP_INDEX_EXTENSION);
        let mut input = StructReader::new(state.storage.open_input(&file_name)?)?;
        check_header(
            &mut input,
            CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &state.suffix,
        )?;
        checksum_entire_file(&input)?;

        let interval = input.read_vint()?;
        if interval == 0 {
            return Err(BlockTermsError::corrupt(format!(
                "invalid index interval: {interval}"
            )));
        }
        let packed_version = input.read_vint()?;
        if packed_version != PACKED_VERSION_CURRENT {
            return Err(BlockTermsError::format(format!(
                "unsupported packed version: {packed_version}"
            )));
        }
        let block_size = packed::check_block_size(input.read_vint()?)?;

        seek_dir(&mut input)?;
        let dir_start = input.position();
        let num_fields = input.read_vint()?;
        let mut fields = AHashMap::with_capacity(num_fields as usize);
        for _ in 0..num_fields {
            let entry = FieldEntry {
                field_number: input.read_vint()?,
                num_index_terms: input.read_vlong()?,
                terms_start: input.read_vlong()?,
                index_start: input.read_vlong()?,
                packed_index_start: input.read_vlong()?,
                packed_offsets_start: input.read_vlong()?,
            };
            let dir_pos = input.position();
            let field = Self::load_field(&mut input, &entry, interval, block_size, dir_start)?;
            input.seek_to(dir_pos)?;

            if fields.insert(entry.field_number, Arc::new(field)).is_some() {
                return Err(BlockTermsError::corrupt(format!(
                    "duplicate field: {}",
                    entry.field_number
                )));
            }
        }

        debug!(
            "opened fixed gap terms index {file_name}: {} fields, interval {interval}",
            fields.len()
        );
        Ok(FixedGapTermsIndexReader { interval, fields })
    }

    fn load_field<R: StorageInput>(
        input: &mut StructReader<R>,
        entry: &FieldEntry,
        interval: u32,
        block_size: u32,
        dir_start: u64,
    ) -> Result<FieldIndex> {
        if entry.index_start > entry.packed_index_start
            || entry.packed_index_start > entry.packed_offsets_start
            || entry.packed_offsets_start > dir_start
        {
            return Err(BlockTermsError::corrupt(format!(
                "invalid index pointers for field {}: indexStart={} packedIndexStart={} packedOffsetsStart={}",
                entry.field_number,
                entry.index_start,
                entry.packed_index_start,
                entry.packed_offsets_start
            )));
        }

        let num_bytes = entry.packed_index_start - entry.index_start;
        // Only the first sample may have an empty prefix
        if entry.num_index_terms == 0 || entry.num_index_terms > num_bytes + 1 {
            return Err(BlockTermsError::corrupt(format!(
                "invalid numIndexTerms: {} for field {}",
                entry.num_index_terms, entry.field_number
            )));
        }
        let num_index_terms = entry.num_index_terms as usize;

        input.seek_to(entry.index_start)?;
        let term_bytes = input.read_raw(num_bytes as usize)?;
        let term_addresses = MonotonicBlockPackedReader::load(input, num_index_terms, block_size)?;
        input.seek_to(entry.packed_offsets_start)?;
        let term_offsets = MonotonicBlockPackedReader::load(input, num_index_terms + 1, block_size)?;

        let mut last = 0;
        for i in 0..=num_index_terms {
            let offset = term_offsets.get(i);
            if offset < last || offset > num_bytes {
                return Err(BlockTermsError::corrupt(format!(
                    "invalid term offset {offset} at {i} for field {}",
                    entry.field_number
                )));
            }
            last = offset;
        }

        Ok(FieldIndex {
            interval: interval as u64,
            terms_start: entry.terms_start,
            num_index_terms,
            term_bytes,
            term_addresses,
            term_offsets,
        })
    }

    /// Terms between two samples.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Approximate heap usage of the loaded samples.
    pub fn ram_bytes_used(&self) -> usize {
        self.fields
            .values()
            .map(|f| {
                f.term_bytes.capacity()
                    + f.term_addresses.ram_bytes_used()
                    + f.term_offsets.ram_bytes_used()
            })
            .sum()
    }
}

impl TermsIndexReader for FixedGapTermsIndexReader {
    fn supports_ord(&self) -> bool {
        true
    }

    fn field_enum(&self, field_number: u32) -> Option<Box<dyn FieldIndexEnum>> {
        let index = self.fields.get(&field_number)?;
        Some(Box::new(FixedGapFieldEnum {
            index: Arc::clone(index),
            idx: 0,
            term_start: 0,
            term_end: 0,
        }))
    }
}

struct FixedGapFieldEnum {
    index: Arc<FieldIndex>,
    idx: usize,
    term_start: usize,
    term_end: usize,
}

impl FixedGapFieldEnum {
    fn fill(&mut self, idx: usize) -> u64 {
        self.idx = idx;
        (self.term_start, self.term_end) = self.index.term_range(idx);
        self.index.address(idx)
    }
}

impl FieldIndexEnum for FixedGapFieldEnum {
    fn seek(&mut self, target: &[u8]) -> Result<u64> {
        let mut lo = 0usize;
        let mut hi = self.index.num_index_terms;

        // Floor: last sample <= target
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.index.term(mid) <= target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        Ok(self.fill(lo.saturating_sub(1)))
    }

    fn next(&mut self) -> Result<Option<u64>> {
        let idx = self.idx + 1;
        if idx >= self.index.num_index_terms {
            return Ok(None);
        }
        Ok(Some(self.fill(idx)))
    }

    fn term(&self) -> &[u8] {
        &self.index.term_bytes[self.term_start..self.term_end]
    }

    fn ord(&self) -> Result<u64> {
        Ok(self.idx as u64 * self.index.interval)
    }

    fn seek_ord(&mut self, ord: u64) -> Result<u64> {
        let idx = ((ord / self.index.interval) as usize).min(self.index.num_index_terms - 1);
        Ok(self.fill(idx))
    }
}
