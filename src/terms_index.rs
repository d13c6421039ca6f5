//! Seekable terms indexes.
//!
//! A terms index samples some of a field's terms and remembers, for each
//! sample, where the dictionary block starting with that term lives. The
//! dictionary asks the index for the greatest sample at or before a target
//! (a floor seek) and scans forward from the block it points to.
//!
//! Two implementations exist:
//!
//! - [`fixed_gap`]: every Nth term, stored in packed arrays. Samples are
//!   addressable by position, so the index supports seeking by ordinal.
//! - [`variable_gap`]: a [`policy`] picks the samples, which are stored in an
//!   FST keyed by term prefix. No ordinals.
//!
//! Only the shortest prefix of a sample that still sorts after the term
//! before it is stored. The dictionary relies on that prefix matching the
//! first bytes of the sampled term up to the block's shared prefix.

use crate::error::Result;
use crate::postings::TermStats;
use crate::segment::FieldInfo;

pub mod fixed_gap;
pub mod policy;
pub mod variable_gap;

pub use fixed_gap::{FixedGapTermsIndexReader, FixedGapTermsIndexWriter};
pub use variable_gap::{VariableGapTermsIndexReader, VariableGapTermsIndexWriter};

/// Write side of a terms index.
///
/// Fields are written one at a time: [`add_field`](Self::add_field), then
/// for every term a [`check_index_term`](Self::check_index_term) call and,
/// when it returns `true`, an [`add`](Self::add) call, then
/// [`finish_field`](Self::finish_field).
pub trait TermsIndexWriter: Send {
    /// Start a field whose terms begin at `terms_file_pointer` in the
    /// dictionary.
    fn add_field(&mut self, field: &FieldInfo, terms_file_pointer: u64) -> Result<()>;

    /// Whether `term` should become a sample. The first term of a field
    /// always is.
    fn check_index_term(&mut self, term: &[u8], stats: &TermStats) -> Result<bool>;

    /// Record `term` as a sample whose block starts at `terms_file_pointer`.
    fn add(&mut self, term: &[u8], stats: &TermStats, terms_file_pointer: u64) -> Result<()>;

    /// Finish the current field.
    fn finish_field(&mut self, terms_file_pointer: u64) -> Result<()>;

    /// Write the directory and footer. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Read side of a terms index, shared by every cursor of a segment.
pub trait TermsIndexReader: Send + Sync + std::fmt::Debug {
    /// Whether [`FieldIndexEnum::ord`] and [`FieldIndexEnum::seek_ord`] work.
    fn supports_ord(&self) -> bool;

    /// A fresh enumerator over the samples of a field, or `None` if the
    /// field has no samples.
    fn field_enum(&self, field_number: u32) -> Option<Box<dyn FieldIndexEnum>>;
}

/// Enumerator over the samples of one field. Not shared between cursors.
pub trait FieldIndexEnum: Send {
    /// Position on the greatest sample at or before `target` and return the
    /// file pointer of its block.
    fn seek(&mut self, target: &[u8]) -> Result<u64>;

    /// Advance to the next sample, returning its block's file pointer.
    fn next(&mut self) -> Result<Option<u64>>;

    /// The current sample's stored prefix.
    fn term(&self) -> &[u8];

    /// Ordinal of the current sample's term.
    fn ord(&self) -> Result<u64>;

    /// Position on the greatest sample whose ordinal is at or before `ord`.
    fn seek_ord(&mut self, ord: u64) -> Result<u64>;
}
