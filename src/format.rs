//! Opens terms dictionary writers and readers for a segment.
//!
//! A [`BlockTermsFormat`] pairs the block terms dictionary with the terms
//! index chosen in its [`BlockTermsConfig`]. Segments must be read with a
//! format configured for the same kind of index they were written with.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use blockterms::config::BlockTermsConfig;
//! use blockterms::format::BlockTermsFormat;
//! use blockterms::postings::simple::{Posting, SimplePostingsReader, SimplePostingsWriter};
//! use blockterms::segment::{FieldInfo, FieldInfos, IndexOptions, SegmentInfo, SegmentWriteState};
//! use blockterms::storage::Storage;
//! use blockterms::storage::memory::MemoryStorage;
//!
//! let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
//! let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
//! let field_infos = Arc::new(FieldInfos::new(vec![field.clone()]).unwrap());
//! let state = SegmentWriteState::new(storage, SegmentInfo::new("_0", 10), field_infos);
//!
//! let format = BlockTermsFormat::new(BlockTermsConfig::fixed_gap(16)).unwrap();
//! let postings = SimplePostingsWriter::new(&state).unwrap();
//! let mut writer = format.fields_writer(&state, postings).unwrap();
//! let mut terms = writer.add_field(&field).unwrap();
//! terms.write(b"hello", &[Posting::with_freq(1, 2)]).unwrap();
//! terms.write(b"world", &[Posting::new(3)]).unwrap();
//! terms.finish().unwrap();
//! writer.close().unwrap();
//!
//! let read_state = state.to_read_state();
//! let postings = SimplePostingsReader::open(&read_state).unwrap();
//! let reader = format.fields_reader(&read_state, postings).unwrap();
//! let mut cursor = reader.terms("body").unwrap().iterator().unwrap();
//! assert!(cursor.seek_exact(b"world").unwrap());
//! assert_eq!(cursor.doc_freq().unwrap(), 1);
//! ```

use crate::block_terms::{BlockTermsReader, BlockTermsWriter};
use crate::config::{BlockTermsConfig, TermIndexConfig};
use crate::error::Result;
use crate::postings::{PostingsReader, PostingsWriter};
use crate::segment::{SegmentReadState, SegmentWriteState};
use crate::terms_index::{
    FixedGapTermsIndexReader, FixedGapTermsIndexWriter, TermsIndexReader, TermsIndexWriter,
    VariableGapTermsIndexReader, VariableGapTermsIndexWriter,
};

/// The block terms dictionary with a configured terms index.
#[derive(Debug, Clone, Default)]
pub struct BlockTermsFormat {
    config: BlockTermsConfig,
}

impl BlockTermsFormat {
    /// Create a format from a validated configuration.
    pub fn new(config: BlockTermsConfig) -> Result<Self> {
        config.validate()?;
        Ok(BlockTermsFormat { config })
    }

    /// The format's configuration.
    pub fn config(&self) -> &BlockTermsConfig {
        &self.config
    }

    /// Create the terms dictionary and terms index files of a segment.
    ///
    /// If the terms index cannot be created, the postings writer is closed
    /// before the error is returned.
    pub fn fields_writer<P: PostingsWriter>(
        &self,
        state: &SegmentWriteState,
        mut postings_writer: P,
    ) -> Result<BlockTermsWriter<P>> {
        log::debug!(
            "writing segment {} with {} terms index",
            state.segment.name,
            self.config.term_index.index_type_name()
        );
        let index_writer: Result<Box<dyn TermsIndexWriter>> = match &self.config.term_index {
            TermIndexConfig::FixedGap {
                interval,
                packed_block_size,
            } => FixedGapTermsIndexWriter::new(state, *interval, *packed_block_size)
                .map(|w| Box::new(w) as Box<dyn TermsIndexWriter>),
            TermIndexConfig::VariableGap { policy } => VariableGapTermsIndexWriter::new(state, policy)
                .map(|w| Box::new(w) as Box<dyn TermsIndexWriter>),
        };

        match index_writer {
            Ok(index_writer) => BlockTermsWriter::new(state, postings_writer, index_writer),
            Err(e) => {
                if let Err(close_err) = postings_writer.close() {
                    log::warn!("failed to close postings writer: {close_err}");
                }
                Err(e)
            }
        }
    }

    /// Open the terms dictionary and terms index of a segment.
    pub fn fields_reader<P: PostingsReader>(
        &self,
        state: &SegmentReadState,
        postings_reader: P,
    ) -> Result<BlockTermsReader<P>> {
        let index_reader: Box<dyn TermsIndexReader> = match &self.config.term_index {
            TermIndexConfig::FixedGap { .. } => Box::new(FixedGapTermsIndexReader::open(state)?),
            TermIndexConfig::VariableGap { .. } => {
                Box::new(VariableGapTermsIndexReader::open(state)?)
            }
        };
        BlockTermsReader::open(state, postings_reader, index_reader)
    }
}
