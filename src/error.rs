//! Error types for the blockterms library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`BlockTermsError`] enum. Structural problems found while opening a
//! segment's files are reported as [`BlockTermsError::Corrupt`]; the segment
//! is unusable after such an error and nothing in this crate retries.
//!
//! # Examples
//!
//! ```
//! use blockterms::error::{BlockTermsError, Result};
//!
//! fn open_segment() -> Result<()> {
//!     Err(BlockTermsError::corrupt("invalid docCount: 12 maxDoc: 10"))
//! }
//!
//! match open_segment() {
//!     Ok(_) => println!("opened"),
//!     Err(e) => assert!(e.is_corruption()),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for blockterms operations.
#[derive(Error, Debug)]
pub enum BlockTermsError {
    /// I/O errors from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The index data is structurally invalid (bad counts, checksum
    /// mismatch, truncated file, duplicate fields, ...).
    #[error("Corrupt index: {0}")]
    Corrupt(String),

    /// Unknown magic, codec name, or a version outside the supported range.
    #[error("Format error: {0}")]
    Format(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Index-related errors
    #[error("Index error: {0}")]
    Index(String),

    /// The operation is not supported by this implementation, e.g. ordinal
    /// seeks against a terms index without ordinals.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The object is not in a state that allows the call.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with BlockTermsError.
pub type Result<T> = std::result::Result<T, BlockTermsError>;

impl BlockTermsError {
    /// Create a new corruption error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        BlockTermsError::Corrupt(msg.into())
    }

    /// Create a new format error.
    pub fn format<S: Into<String>>(msg: S) -> Self {
        BlockTermsError::Format(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        BlockTermsError::Storage(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        BlockTermsError::Index(msg.into())
    }

    /// Create a new unsupported operation error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        BlockTermsError::UnsupportedOperation(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        BlockTermsError::InvalidArgument(msg.into())
    }

    /// Create a new invalid configuration error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        BlockTermsError::InvalidArgument(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new invalid state error.
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        BlockTermsError::InvalidState(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        BlockTermsError::Other(msg.into())
    }

    /// Whether this error means the on-disk data cannot be trusted.
    ///
    /// An unexpected end of file while decoding is treated as corruption
    /// too: it is what a truncated file looks like from the inside.
    pub fn is_corruption(&self) -> bool {
        match self {
            BlockTermsError::Corrupt(_) | BlockTermsError::Format(_) => true,
            BlockTermsError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
