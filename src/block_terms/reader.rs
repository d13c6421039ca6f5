//! Reads the `.tib` terms file.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::block_terms::cursor::TermCursor;
use crate::block_terms::{CODEC_NAME, TERMS_EXTENSION, VERSION_CURRENT, VERSION_START};
use crate::codec::{check_header, checksum_entire_file, retrieve_checksum, seek_dir};
use crate::error::{BlockTermsError, Result};
use crate::postings::PostingsReader;
use crate::segment::{FieldInfo, SegmentReadState};
use crate::storage::{StorageInput, StructReader};
use crate::terms_index::TermsIndexReader;

/// Directory entry of one field.
#[derive(Debug, Clone)]
pub(crate) struct FieldReader {
    pub(crate) field_info: Arc<FieldInfo>,
    pub(crate) num_terms: u64,
    pub(crate) terms_start: u64,
    pub(crate) sum_total_term_freq: Option<u64>,
    pub(crate) sum_doc_freq: u64,
    pub(crate) doc_count: u32,
}

/// Terms dictionary of one segment, opened for reading.
///
/// The reader is immutable after [`open`](Self::open) and can be shared
/// between threads. Each [`TermCursor`] works on its own clone of the
/// terms file.
pub struct BlockTermsReader<P: PostingsReader> {
    name: String,
    input: Mutex<StructReader<Box<dyn StorageInput>>>,
    postings_reader: P,
    index_reader: Box<dyn TermsIndexReader>,
    fields: BTreeMap<String, FieldReader>,
}

impl<P: PostingsReader> std::fmt::Debug for BlockTermsReader<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTermsReader")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("index_reader", &self.index_reader)
            .finish()
    }
}

impl<P: PostingsReader> BlockTermsReader<P> {
    /// Open the terms file of a segment.
    ///
    /// The header, the footer structure and the field directory are
    /// validated; any inconsistency is reported as [`BlockTermsError::Corrupt`].
    pub fn open(
        state: &SegmentReadState,
        mut postings_reader: P,
        index_reader: Box<dyn TermsIndexReader>,
    ) -> Result<Self> {
        let name = state.file_name(TERMS_EXTENSION);
        let mut input = StructReader::new(state.storage.open_input(&name)?)?;

        check_header(
            &mut input,
            CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &state.suffix,
        )?;
        postings_reader.init(&mut input, state)?;
        retrieve_checksum(&mut input)?;
        seek_dir(&mut input)?;

        let fields = read_directory(&mut input, state, index_reader.as_ref())?;
        log::debug!(
            "opened terms dictionary {} ({} bytes) with {} fields",
            name,
            input.size(),
            fields.len()
        );

        Ok(BlockTermsReader {
            name,
            input: Mutex::new(input),
            postings_reader,
            index_reader,
            fields,
        })
    }

    /// The terms of a field, or `None` if the field has no terms.
    pub fn terms(&self, field: &str) -> Option<FieldTerms<'_, P>> {
        self.fields
            .get(field)
            .map(|field| FieldTerms { reader: self, field })
    }

    /// Names of the fields with terms, in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields with terms.
    pub fn size(&self) -> usize {
        self.fields.len()
    }

    /// The postings reader the dictionary decodes term metadata with.
    pub fn postings_reader(&self) -> &P {
        &self.postings_reader
    }

    /// Verify the checksum of the whole terms file, then the postings
    /// codec's own files.
    pub fn check_integrity(&self) -> Result<()> {
        checksum_entire_file(&*self.input.lock())?;
        self.postings_reader.check_integrity()
    }
}

fn read_directory(
    input: &mut StructReader<Box<dyn StorageInput>>,
    state: &SegmentReadState,
    index_reader: &dyn TermsIndexReader,
) -> Result<BTreeMap<String, FieldReader>> {
    let max_doc = state.segment.max_doc;
    let num_fields = input.read_vint()?;
    let mut fields = BTreeMap::new();

    for _ in 0..num_fields {
        let number = input.read_vint()?;
        let field_info = state.field_infos.by_number(number).ok_or_else(|| {
            BlockTermsError::corrupt(format!("invalid field number: {number}"))
        })?;

        let num_terms = input.read_vlong()?;
        if num_terms == 0 {
            return Err(BlockTermsError::corrupt(format!(
                "illegal numTerms for field number: {number}"
            )));
        }
        let terms_start = input.read_vlong()?;
        let sum_total_term_freq = if field_info.has_freqs() {
            Some(input.read_vlong()?)
        } else {
            None
        };
        let sum_doc_freq = input.read_vlong()?;
        let doc_count = input.read_vint()?;

        if terms_start >= input.size() {
            return Err(BlockTermsError::corrupt(format!(
                "invalid termsStart: {terms_start} (field {})",
                field_info.name
            )));
        }
        if doc_count > max_doc {
            return Err(BlockTermsError::corrupt(format!(
                "invalid docCount: {doc_count} maxDoc: {max_doc}"
            )));
        }
        if sum_doc_freq < doc_count as u64 {
            return Err(BlockTermsError::corrupt(format!(
                "invalid sumDocFreq: {sum_doc_freq} docCount: {doc_count}"
            )));
        }
        if let Some(sum_ttf) = sum_total_term_freq.filter(|&ttf| ttf < sum_doc_freq) {
            return Err(BlockTermsError::corrupt(format!(
                "invalid sumTotalTermFreq: {sum_ttf} sumDocFreq: {sum_doc_freq}"
            )));
        }
        if index_reader.field_enum(number).is_none() {
            return Err(BlockTermsError::corrupt(format!(
                "no terms index for field: {}",
                field_info.name
            )));
        }

        let entry = FieldReader {
            field_info: Arc::clone(field_info),
            num_terms,
            terms_start,
            sum_total_term_freq,
            sum_doc_freq,
            doc_count,
        };
        if fields.insert(field_info.name.clone(), entry).is_some() {
            return Err(BlockTermsError::corrupt(format!(
                "duplicate fields: {}",
                field_info.name
            )));
        }
    }
    Ok(fields)
}

/// The terms of one field.
pub struct FieldTerms<'a, P: PostingsReader> {
    reader: &'a BlockTermsReader<P>,
    field: &'a FieldReader,
}

impl<P: PostingsReader> Clone for FieldTerms<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: PostingsReader> Copy for FieldTerms<'_, P> {}

impl<P: PostingsReader> std::fmt::Debug for FieldTerms<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldTerms")
            .field("field", &self.field.field_info.name)
            .field("num_terms", &self.field.num_terms)
            .finish()
    }
}

impl<'a, P: PostingsReader> FieldTerms<'a, P> {
    /// Number of terms.
    pub fn size(&self) -> u64 {
        self.field.num_terms
    }

    /// Sum of the total term frequencies, or `None` when the field does not
    /// track frequencies.
    pub fn sum_total_term_freq(&self) -> Option<u64> {
        self.field.sum_total_term_freq
    }

    /// Sum of the doc frequencies.
    pub fn sum_doc_freq(&self) -> u64 {
        self.field.sum_doc_freq
    }

    /// Number of documents with at least one term.
    pub fn doc_count(&self) -> u32 {
        self.field.doc_count
    }

    /// Whether term frequencies are tracked.
    pub fn has_freqs(&self) -> bool {
        self.field.field_info.has_freqs()
    }

    /// The field's metadata.
    pub fn field_info(&self) -> &'a FieldInfo {
        &self.field.field_info
    }

    /// Whether cursors over this field can seek by ordinal.
    pub fn supports_ord(&self) -> bool {
        self.reader.index_reader.supports_ord()
    }

    /// A new cursor, positioned before the first term.
    pub fn iterator(&self) -> Result<TermCursor<'a, P>> {
        let reader = self.reader;
        let index_enum = reader
            .index_reader
            .field_enum(self.field.field_info.number)
            .ok_or_else(|| {
                BlockTermsError::index(format!(
                    "no terms index for field: {}",
                    self.field.field_info.name
                ))
            })?;
        let mut input = reader.input.lock().try_clone()?;
        input.seek_to(self.field.terms_start)?;

        Ok(TermCursor::new(
            &reader.postings_reader,
            self.field,
            input,
            index_enum,
            reader.index_reader.supports_ord(),
        ))
    }
}
