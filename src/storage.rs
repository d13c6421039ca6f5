//! Storage abstraction layer.
//!
//! The terms dictionary never touches the file system directly. It reads and
//! writes named files through the [`Storage`] trait, which has two backends:
//!
//! - [`memory::MemoryStorage`]: files live in shared, immutable byte buffers.
//!   Used by tests and for transient segments.
//! - [`file::FileStorage`]: files in a directory on disk. Inputs are
//!   memory-mapped by default so that cloning an input is cheap.
//!
//! Inputs are the unit of read concurrency: a reader opens a file once and
//! every enumerator works on its own [`StorageInput::clone_input`] copy, an
//! independent cursor over the same immutable bytes.
//!
//! # Example
//!
//! ```
//! use std::io::{Read, Write};
//!
//! use blockterms::storage::memory::MemoryStorage;
//! use blockterms::storage::{Storage, StorageConfig};
//!
//! # fn main() -> blockterms::error::Result<()> {
//! let storage = MemoryStorage::new(StorageConfig::default());
//!
//! let mut output = storage.create_output("_0.tib")?;
//! output.write_all(b"test data")?;
//! output.close()?;
//!
//! let mut input = storage.open_input("_0.tib")?;
//! let mut buffer = Vec::new();
//! input.read_to_end(&mut buffer)?;
//! assert_eq!(buffer, b"test data");
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Seek, Write};

use crate::error::{BlockTermsError, Result};

pub mod file;
pub mod memory;
pub mod structured;

pub use structured::{StructReader, StructWriter};

/// A trait for storage backends that can store and retrieve data.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files in the storage, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Get the size of the input stream.
    fn size(&self) -> Result<u64>;

    /// Clone this input stream.
    ///
    /// The clone shares the underlying bytes but has its own position,
    /// starting at the beginning of the file.
    fn clone_input(&self) -> Result<Box<dyn StorageInput>>;

    /// Close the input stream.
    fn close(&mut self) -> Result<()>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Get the current position in the output stream.
    fn position(&self) -> Result<u64>;

    /// Close the output stream, publishing its contents.
    ///
    /// Closing an already closed output is a no-op.
    fn close(&mut self) -> Result<()>;
}

// Implement StorageOutput for Box<dyn StorageOutput> to allow trait objects
impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn position(&self) -> Result<u64> {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

// Implement StorageInput for Box<dyn StorageInput> to allow trait objects
impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        self.as_ref().clone_input()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// Configuration for storage backends.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Whether file inputs are memory-mapped.
    pub use_mmap: bool,

    /// Buffer size for buffered I/O.
    pub buffer_size: usize,

    /// Whether to fsync outputs when they are closed.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            use_mmap: true,
            buffer_size: 65536, // 64KB buffer for better I/O performance
            sync_writes: false,
        }
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// I/O error.
    IoError(String),

    /// The output was already closed.
    OutputClosed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::OutputClosed(name) => write!(f, "Output is closed: {name}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for BlockTermsError {
    fn from(err: StorageError) -> Self {
        BlockTermsError::storage(err.to_string())
    }
}
