//! # blockterms
//!
//! A block compressed terms dictionary for inverted index segments.
//!
//! ## Features
//!
//! - Shared prefix compression of sorted terms, grouped into blocks
//! - Lazy decoding of term statistics and postings metadata
//! - Pluggable terms indexes: fixed gap (packed arrays, seek by ordinal)
//!   and variable gap (FST, frequency aware sampling)
//! - Checksummed file formats with corruption checks at open
//! - Memory and memory-mapped file storage backends
//!
//! Postings themselves are written by a [`postings::PostingsWriter`]; the
//! dictionary only stores their per-term metadata. A simple doc id codec is
//! included in [`postings::simple`].

pub mod block_terms;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod postings;
pub mod segment;
pub mod storage;
pub mod terms_index;
pub mod util;

pub mod prelude {
    pub use crate::block_terms::{
        BlockTermsReader, BlockTermsWriter, FieldTerms, FieldTermsWriter, SeekStatus, TermCursor,
    };
    pub use crate::config::{BlockTermsConfig, IndexTermPolicy, TermIndexConfig};
    pub use crate::error::{BlockTermsError, Result};
    pub use crate::format::BlockTermsFormat;
    pub use crate::postings::{BlockTermState, PostingsReader, PostingsWriter, TermStats};
    pub use crate::segment::{
        FieldInfo, FieldInfos, IndexOptions, SegmentInfo, SegmentReadState, SegmentWriteState,
    };
    pub use crate::storage::Storage;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
