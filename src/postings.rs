//! Postings collaborator interfaces.
//!
//! The terms dictionary does not know how postings are laid out. For every
//! term it asks a [`PostingsWriter`] to write the postings and hand back an
//! opaque per-term state, and it stores that state's metadata bytes inside
//! its own blocks. On the read side a [`PostingsReader`] turns the metadata
//! bytes back into state, lazily, only when a caller asks for statistics or
//! postings.
//!
//! Metadata of consecutive terms in a block may be delta coded: the first
//! term of every block is encoded with `absolute = true`, the rest relative
//! to the term before them.

use std::fmt::Debug;

use bit_vec::BitVec;

use crate::error::Result;
use crate::segment::{FieldInfo, SegmentReadState, SegmentWriteState};
use crate::storage::{StorageInput, StorageOutput, StructReader, StructWriter};
use crate::util::bytes::SliceInput;

pub mod simple;

/// Per-term statistics the dictionary records itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TermStats {
    /// Number of documents containing the term.
    pub doc_freq: u32,
    /// Total number of occurrences; equals `doc_freq` when frequencies are
    /// not tracked.
    pub total_term_freq: u64,
}

impl TermStats {
    /// Create new term statistics.
    pub fn new(doc_freq: u32, total_term_freq: u64) -> Self {
        TermStats {
            doc_freq,
            total_term_freq,
        }
    }
}

/// Term state as tracked by the block terms dictionary.
///
/// Wraps the postings codec's own state with the statistics and the block
/// position of the term, which is everything needed to reposition a cursor
/// on the term later without a seek.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockTermState<S> {
    /// Number of documents containing the term.
    pub doc_freq: u32,
    /// Total number of occurrences.
    pub total_term_freq: u64,
    /// How many terms of the current block have been consumed.
    pub term_block_ord: u32,
    /// File pointer of the block holding the term.
    pub block_file_pointer: u64,
    /// Ordinal of the term in its field; -1 before the first term.
    pub ord: i64,
    /// Postings codec state.
    pub postings: S,
}

impl<S: Default> BlockTermState<S> {
    /// A fresh state positioned before the first term.
    pub fn new() -> Self {
        BlockTermState {
            ord: -1,
            ..Default::default()
        }
    }

    /// The term's statistics.
    pub fn stats(&self) -> TermStats {
        TermStats::new(self.doc_freq, self.total_term_freq)
    }
}

/// Write side of a postings codec.
pub trait PostingsWriter: Send {
    /// Per-term state produced by [`PostingsWriter::write_term`].
    type State: Clone + Default + Debug + Send + Sync + 'static;

    /// What a caller hands in for one term.
    type Postings: ?Sized;

    /// Write the codec's header into the terms file.
    fn init(
        &mut self,
        terms_out: &mut StructWriter<Box<dyn StorageOutput>>,
        state: &SegmentWriteState,
    ) -> Result<()>;

    /// Start writing terms of a new field.
    fn set_field(&mut self, field: &FieldInfo) -> Result<()>;

    /// Write the postings of one term.
    ///
    /// Returns `None` when the term has no postings; such a term is dropped
    /// from the dictionary. Every document seen is marked in `docs_seen`.
    fn write_term(
        &mut self,
        term: &[u8],
        postings: &Self::Postings,
        docs_seen: &mut BitVec,
    ) -> Result<Option<BlockTermState<Self::State>>>;

    /// Encode a term's metadata into `out`.
    fn encode_term(
        &mut self,
        out: &mut Vec<u8>,
        field: &FieldInfo,
        state: &BlockTermState<Self::State>,
        absolute: bool,
    ) -> Result<()>;

    /// Finish the codec's own files.
    fn close(&mut self) -> Result<()>;
}

/// Read side of a postings codec.
pub trait PostingsReader: Send + Sync {
    /// Per-term state rebuilt by [`PostingsReader::decode_term`].
    type State: Clone + Default + Debug + Send + Sync + 'static;

    /// Read and check the codec's header from the terms file.
    fn init(
        &mut self,
        terms_in: &mut StructReader<Box<dyn StorageInput>>,
        state: &SegmentReadState,
    ) -> Result<()>;

    /// Decode one term's metadata.
    ///
    /// `state` holds the previous term's decoded state unless `absolute`
    /// is set. Its `doc_freq` and `total_term_freq` are already filled in.
    fn decode_term(
        &self,
        input: &mut SliceInput<'_>,
        field: &FieldInfo,
        state: &mut BlockTermState<Self::State>,
        absolute: bool,
    ) -> Result<()>;

    /// Verify checksums of the codec's own files.
    fn check_integrity(&self) -> Result<()>;
}
