//! Block compressed terms dictionary.
//!
//! Terms of a field are grouped into blocks. Each block stores the bytes its
//! terms share with the last term of the previous block once, and then per
//! term only the remaining suffix. Statistics and postings metadata live in
//! two more blobs of the same block and are decoded only when asked for.
//!
//! Every block starts at a terms index sample, so a lookup floor-seeks the
//! index, jumps to the block and scans forward.
//!
//! Terms file layout (`.tib`):
//!
//! ```text
//! header | postings header
//! per field: block* | vint 0
//!   block: vint count | vint commonPrefix
//!          | vint len, suffixes (vint suffixLen, bytes)*
//!          | vint len, stats (vint docFreq [, vlong totalTermFreq - docFreq])*
//!          | vint len, postings metadata
//! directory: vint numFields, then per field
//!     vint field | vlong numTerms | vlong termsStart
//!     | [vlong sumTotalTermFreq] | vlong sumDocFreq | vint docCount
//! trailer | footer
//! ```

pub mod cursor;
pub mod reader;
pub mod writer;

pub use cursor::TermCursor;
pub use reader::{BlockTermsReader, FieldTerms};
pub use writer::{BlockTermsWriter, FieldTermsWriter};

/// Terms file extension.
pub const TERMS_EXTENSION: &str = "tib";

pub(crate) const CODEC_NAME: &str = "BlockTermsDict";
pub(crate) const VERSION_START: u32 = 0;
pub(crate) const VERSION_CURRENT: u32 = 1;

/// Outcome of [`TermCursor::seek_ceil`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeekStatus {
    /// The target term exists; the cursor is on it.
    Found,
    /// The target does not exist; the cursor is on the smallest term after
    /// it.
    NotFound,
    /// Every term sorts before the target.
    End,
}
