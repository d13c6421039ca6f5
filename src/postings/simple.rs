//! A straightforward doc-id postings codec.
//!
//! Postings go to a `.doc` file as delta coded doc ids, each followed by its
//! frequency when the field tracks frequencies. A term that occurs in a
//! single document writes nothing to the doc file: its doc id is inlined in
//! the term metadata instead.
//!
//! Term metadata: `vlong` delta of the doc file pointer against the previous
//! term of the block, then, for single-document terms only, `vint` doc id.

use bit_vec::BitVec;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::codec::{
    check_header, checksum_entire_file, retrieve_checksum, write_footer, write_header,
};
use crate::error::{BlockTermsError, Result};
use crate::postings::{BlockTermState, PostingsReader, PostingsWriter};
use crate::segment::{FieldInfo, SegmentReadState, SegmentWriteState};
use crate::storage::{StorageInput, StorageOutput, StructReader, StructWriter};
use crate::util::bytes::SliceInput;
use crate::util::varint;

/// Doc file extension.
pub const DOC_EXTENSION: &str = "doc";

const TERMS_CODEC: &str = "SimplePostingsTerms";
const DOC_CODEC: &str = "SimplePostingsDoc";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = VERSION_START;

/// One document of a term's postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Document id.
    pub doc_id: u32,
    /// Occurrences of the term in the document.
    pub freq: u32,
}

impl Posting {
    /// Create a posting with frequency 1.
    pub fn new(doc_id: u32) -> Self {
        Posting { doc_id, freq: 1 }
    }

    /// Create a posting with an explicit frequency.
    pub fn with_freq(doc_id: u32, freq: u32) -> Self {
        Posting { doc_id, freq }
    }
}

/// Per-term state of the simple postings codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimpleTermState {
    /// Where the term's postings start in the doc file.
    pub doc_start_fp: u64,
    /// The only document of a single-document term.
    pub singleton_doc: Option<u32>,
}

/// Writes `.doc` files.
#[derive(Debug)]
pub struct SimplePostingsWriter {
    doc_out: Option<StructWriter<Box<dyn StorageOutput>>>,
    max_doc: u32,
    has_freqs: bool,
    last_doc_fp: u64,
}

impl SimplePostingsWriter {
    /// Create the doc file of a segment.
    pub fn new(state: &SegmentWriteState) -> Result<Self> {
        let name = state.file_name(DOC_EXTENSION);
        let mut doc_out = StructWriter::new(state.storage.create_output(&name)?);
        write_header(&mut doc_out, DOC_CODEC, VERSION_CURRENT, &state.suffix)?;

        Ok(SimplePostingsWriter {
            doc_out: Some(doc_out),
            max_doc: state.segment.max_doc,
            has_freqs: false,
            last_doc_fp: 0,
        })
    }

    fn doc_out(&mut self) -> Result<&mut StructWriter<Box<dyn StorageOutput>>> {
        self.doc_out
            .as_mut()
            .ok_or_else(|| BlockTermsError::invalid_state("postings writer is closed"))
    }
}

impl PostingsWriter for SimplePostingsWriter {
    type State = SimpleTermState;
    type Postings = [Posting];

    fn init(
        &mut self,
        terms_out: &mut StructWriter<Box<dyn StorageOutput>>,
        state: &SegmentWriteState,
    ) -> Result<()> {
        write_header(terms_out, TERMS_CODEC, VERSION_CURRENT, &state.suffix)
    }

    fn set_field(&mut self, field: &FieldInfo) -> Result<()> {
        self.has_freqs = field.has_freqs();
        self.last_doc_fp = 0;
        Ok(())
    }

    fn write_term(
        &mut self,
        _term: &[u8],
        postings: &[Posting],
        docs_seen: &mut BitVec,
    ) -> Result<Option<BlockTermState<SimpleTermState>>> {
        if postings.is_empty() {
            return Ok(None);
        }

        let max_doc = self.max_doc;
        let has_freqs = self.has_freqs;
        let mut total_term_freq = 0u64;
        for posting in postings {
            if posting.doc_id >= max_doc {
                return Err(BlockTermsError::invalid_argument(format!(
                    "doc id {} out of range (maxDoc={max_doc})",
                    posting.doc_id
                )));
            }
            docs_seen.set(posting.doc_id as usize, true);
            total_term_freq += if has_freqs { posting.freq as u64 } else { 1 };
        }

        let doc_out = self.doc_out()?;
        let doc_start_fp = doc_out.position();
        let singleton_doc = if postings.len() == 1 {
            Some(postings[0].doc_id)
        } else {
            let mut last_doc = 0u32;
            for (i, posting) in postings.iter().enumerate() {
                debug_assert!(i == 0 || posting.doc_id > last_doc);
                doc_out.write_vint(posting.doc_id - last_doc)?;
                if has_freqs {
                    doc_out.write_vint(posting.freq)?;
                }
                last_doc = posting.doc_id;
            }
            None
        };

        let mut state = BlockTermState::new();
        state.doc_freq = postings.len() as u32;
        state.total_term_freq = total_term_freq;
        state.postings = SimpleTermState {
            doc_start_fp,
            singleton_doc,
        };
        Ok(Some(state))
    }

    fn encode_term(
        &mut self,
        out: &mut Vec<u8>,
        _field: &FieldInfo,
        state: &BlockTermState<SimpleTermState>,
        absolute: bool,
    ) -> Result<()> {
        if absolute {
            self.last_doc_fp = 0;
        }
        let fp = state.postings.doc_start_fp;
        varint::write_u64(out, fp - self.last_doc_fp)?;
        if let Some(doc) = state.postings.singleton_doc {
            varint::write_u32(out, doc)?;
        }
        self.last_doc_fp = fp;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut doc_out) = self.doc_out.take() {
            write_footer(&mut doc_out)?;
            doc_out.close()?;
        }
        Ok(())
    }
}

/// Reads `.doc` files.
#[derive(Debug)]
pub struct SimplePostingsReader {
    doc_in: Mutex<StructReader<Box<dyn StorageInput>>>,
}

impl SimplePostingsReader {
    /// Open the doc file of a segment.
    pub fn open(state: &SegmentReadState) -> Result<Self> {
        let name = state.file_name(DOC_EXTENSION);
        let mut doc_in = StructReader::new(state.storage.open_input(&name)?)?;
        check_header(
            &mut doc_in,
            DOC_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            &state.suffix,
        )?;
        retrieve_checksum(&mut doc_in)?;

        Ok(SimplePostingsReader {
            doc_in: Mutex::new(doc_in),
        })
    }

    /// Decode the postings of a term.
    pub fn postings(
        &self,
        field: &FieldInfo,
        state: &BlockTermState<SimpleTermState>,
    ) -> Result<Vec<Posting>> {
        if let Some(doc_id) = state.postings.singleton_doc {
            return Ok(vec![Posting::with_freq(
                doc_id,
                state.total_term_freq as u32,
            )]);
        }

        let has_freqs = field.has_freqs();
        let mut input = self.doc_in.lock().try_clone()?;
        input.seek_to(state.postings.doc_start_fp)?;

        let mut postings = Vec::with_capacity(state.doc_freq as usize);
        let mut doc_id = 0u32;
        for _ in 0..state.doc_freq {
            doc_id = doc_id
                .checked_add(input.read_vint()?)
                .ok_or_else(|| BlockTermsError::corrupt("doc id overflow"))?;
            let freq = if has_freqs { input.read_vint()? } else { 1 };
            postings.push(Posting::with_freq(doc_id, freq));
        }
        Ok(postings)
    }
}

impl PostingsReader for SimplePostingsReader {
    type State = SimpleTermState;

    fn init(
        &mut self,
        terms_in: &mut StructReader<Box<dyn StorageInput>>,
        state: &SegmentReadState,
    ) -> Result<()> {
        check_header(
            terms_in,
            TERMS_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            &state.suffix,
        )?;
        Ok(())
    }

    fn decode_term(
        &self,
        input: &mut SliceInput<'_>,
        _field: &FieldInfo,
        state: &mut BlockTermState<SimpleTermState>,
        absolute: bool,
    ) -> Result<()> {
        if absolute {
            state.postings.doc_start_fp = 0;
        }
        state.postings.doc_start_fp += input.read_vlong()?;
        state.postings.singleton_doc = if state.doc_freq == 1 {
            Some(input.read_vint()?)
        } else {
            None
        };
        Ok(())
    }

    fn check_integrity(&self) -> Result<()> {
        checksum_entire_file(&*self.doc_in.lock())?;
        Ok(())
    }
}
