//! Writes the `.tib` terms file.

use std::sync::Arc;

use bit_vec::BitVec;

use crate::block_terms::{CODEC_NAME, TERMS_EXTENSION, VERSION_CURRENT};
use crate::codec::{write_footer, write_header, write_trailer};
use crate::error::{BlockTermsError, Result};
use crate::postings::{BlockTermState, PostingsWriter};
use crate::segment::{FieldInfo, FieldInfos, SegmentWriteState};
use crate::storage::{StorageOutput, StructWriter};
use crate::terms_index::TermsIndexWriter;
use crate::util::bytes::shared_prefix_len;
use crate::util::varint;

/// Directory entry of a field with at least one term.
#[derive(Debug, Clone)]
struct FieldMetaData {
    number: u32,
    has_freqs: bool,
    num_terms: u64,
    terms_start: u64,
    sum_total_term_freq: u64,
    sum_doc_freq: u64,
    doc_count: u32,
}

/// A term waiting for its block to be flushed.
#[derive(Debug)]
struct PendingTerm<S> {
    term: Vec<u8>,
    state: BlockTermState<S>,
}

/// Writes the terms dictionary of one segment.
///
/// Fields are added one at a time through [`add_field`](Self::add_field), in
/// any order, each at most once. Terms within a field must arrive in strictly
/// increasing unsigned byte order.
pub struct BlockTermsWriter<P: PostingsWriter> {
    name: String,
    out: Option<StructWriter<Box<dyn StorageOutput>>>,
    postings_writer: P,
    terms_index_writer: Box<dyn TermsIndexWriter>,
    field_infos: Arc<FieldInfos>,
    max_doc: u32,
    fields: Vec<FieldMetaData>,
    started_fields: Vec<u32>,
    field_open: bool,
}

impl<P: PostingsWriter> std::fmt::Debug for BlockTermsWriter<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTermsWriter")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("closed", &self.out.is_none())
            .finish()
    }
}

impl<P: PostingsWriter> BlockTermsWriter<P> {
    /// Create the terms file of a segment.
    ///
    /// On failure the postings and terms index writers are closed before
    /// the error is returned.
    pub fn new(
        state: &SegmentWriteState,
        mut postings_writer: P,
        mut terms_index_writer: Box<dyn TermsIndexWriter>,
    ) -> Result<Self> {
        let name = state.file_name(TERMS_EXTENSION);
        let opened = state
            .storage
            .create_output(&name)
            .map(StructWriter::new)
            .and_then(|mut out| {
                write_header(&mut out, CODEC_NAME, VERSION_CURRENT, &state.suffix)?;
                postings_writer.init(&mut out, state)?;
                Ok(out)
            });

        let out = match opened {
            Ok(out) => out,
            Err(e) => {
                if let Err(close_err) = postings_writer.close() {
                    log::warn!("failed to close postings writer: {close_err}");
                }
                if let Err(close_err) = terms_index_writer.close() {
                    log::warn!("failed to close terms index writer: {close_err}");
                }
                return Err(e);
            }
        };

        Ok(BlockTermsWriter {
            name,
            out: Some(out),
            postings_writer,
            terms_index_writer,
            field_infos: Arc::clone(&state.field_infos),
            max_doc: state.segment.max_doc,
            fields: Vec::new(),
            started_fields: Vec::new(),
            field_open: false,
        })
    }

    fn out(&mut self) -> Result<&mut StructWriter<Box<dyn StorageOutput>>> {
        self.out
            .as_mut()
            .ok_or_else(|| BlockTermsError::invalid_state("terms writer is closed"))
    }

    /// Start writing the terms of a field.
    ///
    /// The returned writer must be [`finish`](FieldTermsWriter::finish)ed
    /// before another field can be added or the writer closed.
    pub fn add_field(&mut self, field: &FieldInfo) -> Result<FieldTermsWriter<'_, P>> {
        if self.field_open {
            return Err(BlockTermsError::invalid_state(
                "previous field was not finished",
            ));
        }
        match self.field_infos.by_number(field.number) {
            Some(known) if known.as_ref() == field => {}
            _ => {
                return Err(BlockTermsError::invalid_argument(format!(
                    "field {} (number {}) is not part of the segment",
                    field.name, field.number
                )));
            }
        }
        if self.started_fields.contains(&field.number) {
            return Err(BlockTermsError::invalid_argument(format!(
                "field {} was already written",
                field.name
            )));
        }

        let terms_start = self.out()?.position();
        self.terms_index_writer.add_field(field, terms_start)?;
        self.postings_writer.set_field(field)?;
        self.started_fields.push(field.number);
        self.field_open = true;

        let max_doc = self.max_doc as usize;
        Ok(FieldTermsWriter {
            writer: self,
            field: field.clone(),
            terms_start,
            pending: Vec::new(),
            pending_count: 0,
            last_prev_term: Vec::new(),
            num_terms: 0,
            sum_total_term_freq: 0,
            sum_doc_freq: 0,
            docs_seen: BitVec::from_elem(max_doc, false),
            suffix_buf: Vec::new(),
            stats_buf: Vec::new(),
            meta_buf: Vec::new(),
        })
    }

    /// Write the field directory and footer, then close the postings and
    /// terms index writers.
    ///
    /// Every collaborator is closed even when an earlier step fails; the
    /// first error is returned. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };

        let unfinished = if self.field_open {
            Err(BlockTermsError::invalid_state(
                "closing with an unfinished field",
            ))
        } else {
            Ok(())
        };
        let result = unfinished
            .and_then(|()| write_directory(&mut out, &self.fields))
            .and_then(|()| out.close());
        let postings_result = self.postings_writer.close();
        let index_result = self.terms_index_writer.close();

        if result.is_ok() {
            log::debug!("wrote terms dictionary {} with {} fields", self.name, self.fields.len());
        }
        result.and(postings_result).and(index_result)
    }
}

fn write_directory(
    out: &mut StructWriter<Box<dyn StorageOutput>>,
    fields: &[FieldMetaData],
) -> Result<()> {
    let dir_start = out.position();
    out.write_vint(fields.len() as u32)?;
    for field in fields {
        out.write_vint(field.number)?;
        out.write_vlong(field.num_terms)?;
        out.write_vlong(field.terms_start)?;
        if field.has_freqs {
            out.write_vlong(field.sum_total_term_freq)?;
        }
        out.write_vlong(field.sum_doc_freq)?;
        out.write_vint(field.doc_count)?;
    }
    write_trailer(out, dir_start)?;
    write_footer(out)
}

/// Writes the terms of one field.
///
/// Dropping it without calling [`finish`](Self::finish) leaves the field
/// unfinished, and the segment can no longer be closed cleanly.
pub struct FieldTermsWriter<'a, P: PostingsWriter> {
    writer: &'a mut BlockTermsWriter<P>,
    field: FieldInfo,
    terms_start: u64,
    pending: Vec<PendingTerm<P::State>>,
    pending_count: usize,
    // Last term of the previous block
    last_prev_term: Vec<u8>,
    num_terms: u64,
    sum_total_term_freq: u64,
    sum_doc_freq: u64,
    docs_seen: BitVec,
    suffix_buf: Vec<u8>,
    stats_buf: Vec<u8>,
    meta_buf: Vec<u8>,
}

impl<P: PostingsWriter> std::fmt::Debug for FieldTermsWriter<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldTermsWriter")
            .field("field", &self.field.name)
            .field("num_terms", &self.num_terms)
            .field("pending", &self.pending_count)
            .finish()
    }
}

impl<P: PostingsWriter> FieldTermsWriter<'_, P> {
    /// The field being written.
    pub fn field(&self) -> &FieldInfo {
        &self.field
    }

    /// Number of terms written so far.
    pub fn num_terms(&self) -> u64 {
        self.num_terms
    }

    fn last_term(&self) -> Option<&[u8]> {
        if self.pending_count > 0 {
            Some(&self.pending[self.pending_count - 1].term)
        } else if self.num_terms > 0 {
            Some(&self.last_prev_term)
        } else {
            None
        }
    }

    /// Write one term and its postings.
    ///
    /// A term the postings writer reports as empty is skipped.
    pub fn write(&mut self, term: &[u8], postings: &P::Postings) -> Result<()> {
        debug_assert!(
            self.last_term().is_none_or(|last| last < term),
            "terms out of order"
        );

        let Some(state) =
            self.writer
                .postings_writer
                .write_term(term, postings, &mut self.docs_seen)?
        else {
            return Ok(());
        };
        let stats = state.stats();
        debug_assert!(stats.doc_freq > 0);

        if self
            .writer
            .terms_index_writer
            .check_index_term(term, &stats)?
        {
            if self.pending_count > 0 {
                // Every block starts at an index term
                self.flush_block()?;
            }
            let fp = self.writer.out()?.position();
            self.writer.terms_index_writer.add(term, &stats, fp)?;
        }

        if self.pending_count == self.pending.len() {
            self.pending.push(PendingTerm {
                term: term.to_vec(),
                state,
            });
        } else {
            let slot = &mut self.pending[self.pending_count];
            slot.term.clear();
            slot.term.extend_from_slice(term);
            slot.state = state;
        }
        self.pending_count += 1;

        self.num_terms += 1;
        self.sum_doc_freq += stats.doc_freq as u64;
        self.sum_total_term_freq += stats.total_term_freq;
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        let pending = &self.pending[..self.pending_count];

        let common_prefix = pending
            .iter()
            .map(|p| shared_prefix_len(&self.last_prev_term, &p.term))
            .min()
            .unwrap_or(0);

        let writer = &mut *self.writer;
        let has_freqs = self.field.has_freqs();

        self.suffix_buf.clear();
        for p in pending {
            let suffix = &p.term[common_prefix..];
            varint::write_u32(&mut self.suffix_buf, suffix.len() as u32)?;
            self.suffix_buf.extend_from_slice(suffix);
        }

        self.stats_buf.clear();
        for p in pending {
            debug_assert!(p.state.total_term_freq >= p.state.doc_freq as u64);
            varint::write_u32(&mut self.stats_buf, p.state.doc_freq)?;
            if has_freqs {
                varint::write_u64(
                    &mut self.stats_buf,
                    p.state.total_term_freq - p.state.doc_freq as u64,
                )?;
            }
        }

        self.meta_buf.clear();
        for (i, p) in pending.iter().enumerate() {
            writer
                .postings_writer
                .encode_term(&mut self.meta_buf, &self.field, &p.state, i == 0)?;
        }

        let out = writer.out()?;
        log::trace!(
            "flushing block of {} terms at fp={} (field={}, prefix={})",
            pending.len(),
            out.position(),
            self.field.name,
            common_prefix
        );
        out.write_vint(pending.len() as u32)?;
        out.write_vint(common_prefix as u32)?;
        out.write_vint(self.suffix_buf.len() as u32)?;
        out.write_raw(&self.suffix_buf)?;
        out.write_vint(self.stats_buf.len() as u32)?;
        out.write_raw(&self.stats_buf)?;
        out.write_vint(self.meta_buf.len() as u32)?;
        out.write_raw(&self.meta_buf)?;

        let last = &pending[pending.len() - 1].term;
        self.last_prev_term.clear();
        self.last_prev_term.extend_from_slice(last);
        self.pending_count = 0;
        Ok(())
    }

    /// Flush the last block and record the field in the directory.
    ///
    /// A field without terms writes only its end marker and is left out of
    /// the directory.
    pub fn finish(mut self) -> Result<()> {
        if self.pending_count > 0 {
            self.flush_block()?;
        }

        let out = self.writer.out()?;
        out.write_vint(0)?;
        let end = out.position();
        self.writer.terms_index_writer.finish_field(end)?;

        if self.num_terms > 0 {
            let doc_count = self.docs_seen.iter().filter(|seen| *seen).count() as u32;
            self.writer.fields.push(FieldMetaData {
                number: self.field.number,
                has_freqs: self.field.has_freqs(),
                num_terms: self.num_terms,
                terms_start: self.terms_start,
                sum_total_term_freq: self.sum_total_term_freq,
                sum_doc_freq: self.sum_doc_freq,
                doc_count,
            });
        }
        log::debug!(
            "finished field {} with {} terms",
            self.field.name,
            self.num_terms
        );
        self.writer.field_open = false;
        Ok(())
    }
}
