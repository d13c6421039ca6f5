//! Segment and field metadata consumed by the terms dictionary.
//!
//! The dictionary stores field numbers on disk and resolves them to names
//! through [`FieldInfos`] when a segment is opened.

use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::codec::segment_file_name;
use crate::error::{BlockTermsError, Result};
use crate::storage::Storage;

/// What is recorded in the postings of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexOptions {
    /// Only document ids.
    Docs,
    /// Document ids and term frequencies.
    DocsAndFreqs,
    /// Document ids, frequencies and positions.
    DocsAndFreqsAndPositions,
}

impl IndexOptions {
    /// Whether term frequencies are tracked.
    pub fn has_freqs(self) -> bool {
        !matches!(self, IndexOptions::Docs)
    }

    /// Whether positions are tracked.
    pub fn has_positions(self) -> bool {
        matches!(self, IndexOptions::DocsAndFreqsAndPositions)
    }
}

/// Metadata for one indexed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field name.
    pub name: String,
    /// Field number, unique within a segment.
    pub number: u32,
    /// What the field's postings record.
    pub index_options: IndexOptions,
}

impl FieldInfo {
    /// Create a new field info.
    pub fn new<S: Into<String>>(name: S, number: u32, index_options: IndexOptions) -> Self {
        FieldInfo {
            name: name.into(),
            number,
            index_options,
        }
    }

    /// Whether term frequencies are tracked for this field.
    pub fn has_freqs(&self) -> bool {
        self.index_options.has_freqs()
    }
}

/// The set of fields of a segment, addressable by name and by number.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    by_number: AHashMap<u32, Arc<FieldInfo>>,
    by_name: AHashMap<String, Arc<FieldInfo>>,
}

impl FieldInfos {
    /// Build from a list of fields, rejecting duplicate names or numbers.
    pub fn new(fields: Vec<FieldInfo>) -> Result<Self> {
        let mut infos = FieldInfos::default();
        for field in fields {
            let field = Arc::new(field);
            if infos.by_number.contains_key(&field.number) {
                return Err(BlockTermsError::invalid_argument(format!(
                    "duplicate field number: {}",
                    field.number
                )));
            }
            if infos.by_name.contains_key(&field.name) {
                return Err(BlockTermsError::invalid_argument(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }
            infos.by_number.insert(field.number, Arc::clone(&field));
            infos.by_name.insert(field.name.clone(), field);
        }
        Ok(infos)
    }

    /// Look up a field by number.
    pub fn by_number(&self, number: u32) -> Option<&Arc<FieldInfo>> {
        self.by_number.get(&number)
    }

    /// Look up a field by name.
    pub fn by_name(&self, name: &str) -> Option<&Arc<FieldInfo>> {
        self.by_name.get(name)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// Iterate over fields in field-number order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FieldInfo>> {
        let mut fields: Vec<_> = self.by_number.values().collect();
        fields.sort_by_key(|f| f.number);
        fields.into_iter()
    }
}

/// Identity and size of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment name, used as the file name prefix.
    pub name: String,
    /// Number of documents in the segment.
    pub max_doc: u32,
}

impl SegmentInfo {
    /// Create a new segment info.
    pub fn new<S: Into<String>>(name: S, max_doc: u32) -> Self {
        SegmentInfo {
            name: name.into(),
            max_doc,
        }
    }
}

/// Everything a writer needs to create a segment's files.
#[derive(Debug, Clone)]
pub struct SegmentWriteState {
    /// Storage the files are created in.
    pub storage: Arc<dyn Storage>,
    /// The segment being written.
    pub segment: SegmentInfo,
    /// Fields of the segment.
    pub field_infos: Arc<FieldInfos>,
    /// Suffix distinguishing files of different formats in one segment.
    pub suffix: String,
}

impl SegmentWriteState {
    /// Create a new write state with an empty suffix.
    pub fn new(storage: Arc<dyn Storage>, segment: SegmentInfo, field_infos: Arc<FieldInfos>) -> Self {
        SegmentWriteState {
            storage,
            segment,
            field_infos,
            suffix: String::new(),
        }
    }

    /// Name of this segment's file with the given extension.
    pub fn file_name(&self, ext: &str) -> String {
        segment_file_name(&self.segment.name, &self.suffix, ext)
    }

    /// The matching read state.
    pub fn to_read_state(&self) -> SegmentReadState {
        SegmentReadState {
            storage: Arc::clone(&self.storage),
            segment: self.segment.clone(),
            field_infos: Arc::clone(&self.field_infos),
            suffix: self.suffix.clone(),
        }
    }
}

/// Everything a reader needs to open a segment's files.
#[derive(Debug, Clone)]
pub struct SegmentReadState {
    /// Storage the files live in.
    pub storage: Arc<dyn Storage>,
    /// The segment being read.
    pub segment: SegmentInfo,
    /// Fields of the segment.
    pub field_infos: Arc<FieldInfos>,
    /// Suffix distinguishing files of different formats in one segment.
    pub suffix: String,
}

impl SegmentReadState {
    /// Create a new read state with an empty suffix.
    pub fn new(storage: Arc<dyn Storage>, segment: SegmentInfo, field_infos: Arc<FieldInfos>) -> Self {
        SegmentReadState {
            storage,
            segment,
            field_infos,
            suffix: String::new(),
        }
    }

    /// Name of this segment's file with the given extension.
    pub fn file_name(&self, ext: &str) -> String {
        segment_file_name(&self.segment.name, &self.suffix, ext)
    }
}
