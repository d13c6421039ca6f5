//! Cursor over the terms of one field.

use std::cmp::Ordering;

use crate::block_terms::SeekStatus;
use crate::block_terms::reader::FieldReader;
use crate::error::{BlockTermsError, Result};
use crate::postings::{BlockTermState, PostingsReader};
use crate::segment::FieldInfo;
use crate::storage::{StorageInput, StructReader};
use crate::terms_index::FieldIndexEnum;
use crate::util::bytes::{ByteSliceReader, SliceInput};

/// Seeks and iterates over the terms of a field.
///
/// A cursor owns its clone of the terms file and its own terms index
/// enumerator, so independent cursors never interfere. Statistics and
/// postings metadata are decoded only when asked for.
pub struct TermCursor<'a, P: PostingsReader> {
    postings_reader: &'a P,
    field: &'a FieldReader,
    input: StructReader<Box<dyn StorageInput>>,
    index_enum: Box<dyn FieldIndexEnum>,
    do_ord: bool,

    state: BlockTermState<P::State>,
    term: Vec<u8>,
    positioned: bool,

    // The index enum sits on the sample that starts the current block
    index_is_current: bool,
    did_index_next: bool,
    next_index_term: Option<Vec<u8>>,

    // Set by seek_exact_with_state; the block is re-read on next()
    seek_pending: bool,

    block_term_count: u32,
    block_prefix: usize,
    suffixes: Vec<u8>,
    suffix_reader: ByteSliceReader,
    stats: Vec<u8>,
    stats_reader: ByteSliceReader,
    meta: Vec<u8>,
    meta_reader: ByteSliceReader,
    metadata_upto: u32,
}

impl<P: PostingsReader> std::fmt::Debug for TermCursor<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermCursor")
            .field("field", &self.field.field_info.name)
            .field("term", &String::from_utf8_lossy(&self.term))
            .field("positioned", &self.positioned)
            .field("ord", &self.state.ord)
            .field("block_file_pointer", &self.state.block_file_pointer)
            .field("term_block_ord", &self.state.term_block_ord)
            .field("block_term_count", &self.block_term_count)
            .finish()
    }
}

impl<'a, P: PostingsReader> TermCursor<'a, P> {
    pub(crate) fn new(
        postings_reader: &'a P,
        field: &'a FieldReader,
        input: StructReader<Box<dyn StorageInput>>,
        index_enum: Box<dyn FieldIndexEnum>,
        do_ord: bool,
    ) -> Self {
        TermCursor {
            postings_reader,
            field,
            input,
            index_enum,
            do_ord,
            state: BlockTermState::new(),
            term: Vec::new(),
            positioned: false,
            index_is_current: false,
            did_index_next: false,
            next_index_term: None,
            seek_pending: false,
            block_term_count: 0,
            block_prefix: 0,
            suffixes: Vec::new(),
            suffix_reader: ByteSliceReader::default(),
            stats: Vec::new(),
            stats_reader: ByteSliceReader::default(),
            meta: Vec::new(),
            meta_reader: ByteSliceReader::default(),
            metadata_upto: 0,
        }
    }

    /// The field this cursor iterates.
    pub fn field_info(&self) -> &FieldInfo {
        &self.field.field_info
    }

    /// The current term. Empty before the cursor is first positioned.
    pub fn term(&self) -> &[u8] {
        &self.term
    }

    /// Position on `target` if it exists, otherwise on the smallest term
    /// after it.
    ///
    /// When the target sorts before the next index sample and after the
    /// current term, the terms index is not consulted and the scan goes on
    /// from the current position.
    pub fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        self.positioned = false;
        match self.scan_to(target) {
            Ok(status) => {
                self.positioned = status != SeekStatus::End;
                Ok(status)
            }
            Err(e) => {
                self.index_is_current = false;
                Err(e)
            }
        }
    }

    /// Whether `target` exists. The cursor is left where
    /// [`seek_ceil`](Self::seek_ceil) would leave it.
    pub fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        Ok(self.seek_ceil(target)? == SeekStatus::Found)
    }

    /// Position on `target` using a state previously returned by
    /// [`term_state`](Self::term_state) for that term.
    ///
    /// Nothing is read: statistics come from the saved state, and the block
    /// is only re-read if [`next`](Self::next) is called afterwards.
    pub fn seek_exact_with_state(&mut self, target: &[u8], state: &BlockTermState<P::State>) {
        debug_assert!(!self.do_ord || (state.ord >= 0 && (state.ord as u64) < self.field.num_terms));
        self.state.clone_from(state);
        self.seek_pending = true;
        self.index_is_current = false;
        self.term.clear();
        self.term.extend_from_slice(target);
        self.positioned = true;
    }

    /// Position on the term with ordinal `ord`.
    ///
    /// Only available when the terms index supports ordinals.
    pub fn seek_exact_ord(&mut self, ord: u64) -> Result<()> {
        if !self.do_ord {
            return Err(BlockTermsError::unsupported(
                "terms index does not support ordinals",
            ));
        }
        if ord >= self.field.num_terms {
            return Err(BlockTermsError::invalid_argument(format!(
                "ord {ord} out of range (numTerms={})",
                self.field.num_terms
            )));
        }

        self.positioned = false;
        self.index_is_current = false;
        let fp = self.index_enum.seek_ord(ord)?;
        self.input.seek_to(fp)?;
        if !self.next_block()? {
            return Err(BlockTermsError::corrupt(format!(
                "terms index points at the end of field {}",
                self.field.field_info.name
            )));
        }
        self.index_is_current = true;
        self.did_index_next = false;
        self.seek_pending = false;

        let index_ord = self.index_enum.ord()?;
        if index_ord > ord {
            return Err(BlockTermsError::corrupt(format!(
                "terms index sample ord {index_ord} is past requested ord {ord}"
            )));
        }
        self.state.ord = index_ord as i64 - 1;
        self.term.clear();
        self.term.extend_from_slice(self.index_enum.term());

        for _ in index_ord..=ord {
            if !self.next_term()? {
                return Err(BlockTermsError::corrupt(format!(
                    "field {} ended before ord {ord}",
                    self.field.field_info.name
                )));
            }
        }
        self.positioned = true;
        Ok(())
    }

    /// Advance to the next term, or return `None` at the end of the field.
    pub fn next(&mut self) -> Result<Option<&[u8]>> {
        if self.seek_pending {
            debug_assert!(!self.index_is_current);
            self.input.seek_to(self.state.block_file_pointer)?;
            let pending_seek_count = self.state.term_block_ord;
            if !self.next_block()? {
                return Err(BlockTermsError::corrupt(
                    "saved term state points at the end of the field",
                ));
            }
            let saved_ord = self.state.ord;
            while self.state.term_block_ord < pending_seek_count {
                if !self.next_term()? {
                    return Err(BlockTermsError::corrupt(
                        "saved term state points past the end of its block",
                    ));
                }
            }
            self.seek_pending = false;
            self.state.ord = saved_ord;
        }

        if self.next_term()? {
            self.positioned = true;
            Ok(Some(&self.term))
        } else {
            self.positioned = false;
            Ok(None)
        }
    }

    /// Ordinal of the current term.
    pub fn ord(&self) -> Result<u64> {
        if !self.do_ord {
            return Err(BlockTermsError::unsupported(
                "terms index does not support ordinals",
            ));
        }
        self.check_positioned()?;
        Ok(self.state.ord as u64)
    }

    /// Number of documents containing the current term.
    pub fn doc_freq(&mut self) -> Result<u32> {
        self.decode_meta_data()?;
        Ok(self.state.doc_freq)
    }

    /// Total occurrences of the current term; equals the doc freq when the
    /// field does not track frequencies.
    pub fn total_term_freq(&mut self) -> Result<u64> {
        self.decode_meta_data()?;
        Ok(self.state.total_term_freq)
    }

    /// The postings codec's state for the current term.
    pub fn postings_state(&mut self) -> Result<&P::State> {
        self.decode_meta_data()?;
        Ok(&self.state.postings)
    }

    /// A snapshot of the current term's state, for
    /// [`seek_exact_with_state`](Self::seek_exact_with_state).
    pub fn term_state(&mut self) -> Result<BlockTermState<P::State>> {
        self.decode_meta_data()?;
        Ok(self.state.clone())
    }

    fn check_positioned(&self) -> Result<()> {
        if self.positioned {
            Ok(())
        } else {
            Err(BlockTermsError::invalid_state(
                "cursor is not positioned on a term",
            ))
        }
    }

    fn scan_to(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let mut do_seek = true;

        if self.index_is_current {
            match self.term.as_slice().cmp(target) {
                Ordering::Equal => return Ok(SeekStatus::Found),
                Ordering::Less => {
                    if !self.did_index_next {
                        self.next_index_term = match self.index_enum.next()? {
                            Some(_) => Some(self.index_enum.term().to_vec()),
                            None => None,
                        };
                        self.did_index_next = true;
                    }
                    // Target is inside the current block: no need to seek
                    if self
                        .next_index_term
                        .as_deref()
                        .is_none_or(|next| target < next)
                    {
                        do_seek = false;
                    }
                }
                Ordering::Greater => {}
            }
        }

        if do_seek {
            let fp = self.index_enum.seek(target)?;
            self.input.seek_to(fp)?;
            if !self.next_block()? {
                return Err(BlockTermsError::corrupt(format!(
                    "terms index points at the end of field {}",
                    self.field.field_info.name
                )));
            }
            self.index_is_current = true;
            self.did_index_next = false;
            if self.do_ord {
                self.state.ord = self.index_enum.ord()? as i64 - 1;
            }
            self.term.clear();
            self.term.extend_from_slice(self.index_enum.term());
        } else if self.state.term_block_ord == self.block_term_count && !self.next_block()? {
            self.index_is_current = false;
            return Ok(SeekStatus::End);
        }

        self.seek_pending = false;

        let mut common = 0;
        loop {
            // First match the target against the block's shared prefix
            if common < self.block_prefix {
                let term_byte = *self.term.get(common).ok_or_else(|| {
                    BlockTermsError::corrupt("term is shorter than its block prefix")
                })?;
                let cmp = match target.get(common) {
                    Some(target_byte) => term_byte.cmp(target_byte),
                    None => Ordering::Greater,
                };

                match cmp {
                    Ordering::Less => {
                        // Target sorts after every term of this block. The
                        // last term is still needed as the next block's prefix.
                        if self.state.term_block_ord < self.block_term_count {
                            while self.state.term_block_ord < self.block_term_count - 1 {
                                self.state.term_block_ord += 1;
                                self.state.ord += 1;
                                let suffix_len = self.suffix_reader.read_vint(&self.suffixes)?;
                                self.suffix_reader.skip(suffix_len as usize)?;
                            }
                            self.read_term()?;
                            self.state.ord += 1;
                        }
                        if !self.next_block()? {
                            self.index_is_current = false;
                            return Ok(SeekStatus::End);
                        }
                        common = 0;
                    }
                    Ordering::Greater => {
                        // Target sorts before this block
                        debug_assert_eq!(self.state.term_block_ord, 0);
                        self.read_term()?;
                        self.state.term_block_ord += 1;
                        self.state.ord += 1;
                        return Ok(SeekStatus::NotFound);
                    }
                    Ordering::Equal => common += 1,
                }
                continue;
            }

            // Then compare suffixes in place, materializing only the term we
            // stop on
            loop {
                self.state.term_block_ord += 1;
                self.state.ord += 1;

                let suffix_len = self.suffix_reader.read_vint(&self.suffixes)? as usize;
                let term_len = self.block_prefix + suffix_len;
                let start = self.suffix_reader.position();
                let suffix = self
                    .suffixes
                    .get(start..start + suffix_len)
                    .ok_or_else(|| BlockTermsError::corrupt("term suffix past end of block"))?;
                let target_rest = target.get(self.block_prefix..).unwrap_or_default();
                let limit = suffix_len.min(target_rest.len());
                let cmp = suffix[..limit].cmp(&target_rest[..limit]);

                match cmp {
                    Ordering::Less => {}
                    Ordering::Greater => {
                        self.fill_term(suffix_len)?;
                        return Ok(SeekStatus::NotFound);
                    }
                    Ordering::Equal if target.len() <= term_len => {
                        self.fill_term(suffix_len)?;
                        return Ok(if target.len() == term_len {
                            SeekStatus::Found
                        } else {
                            SeekStatus::NotFound
                        });
                    }
                    // Term is a proper prefix of the target
                    Ordering::Equal => {}
                }

                if self.state.term_block_ord == self.block_term_count {
                    // Seeds the next block's prefix
                    self.fill_term(suffix_len)?;
                    break;
                }
                self.suffix_reader.skip(suffix_len)?;
            }

            if !self.next_block()? {
                self.index_is_current = false;
                return Ok(SeekStatus::End);
            }
            common = 0;
        }
    }

    fn next_term(&mut self) -> Result<bool> {
        if self.state.term_block_ord == self.block_term_count && !self.next_block()? {
            self.index_is_current = false;
            return Ok(false);
        }
        self.read_term()?;
        self.state.term_block_ord += 1;
        self.state.ord += 1;
        Ok(true)
    }

    fn read_term(&mut self) -> Result<()> {
        let suffix_len = self.suffix_reader.read_vint(&self.suffixes)?;
        self.fill_term(suffix_len as usize)
    }

    // Replace everything after the block prefix with the next suffix
    fn fill_term(&mut self, suffix_len: usize) -> Result<()> {
        let suffix = self.suffix_reader.read_slice(&self.suffixes, suffix_len)?;
        if self.term.len() < self.block_prefix {
            return Err(BlockTermsError::corrupt(format!(
                "block prefix {} longer than previous term {}",
                self.block_prefix,
                self.term.len()
            )));
        }
        self.term.truncate(self.block_prefix);
        self.term.extend_from_slice(suffix);
        Ok(())
    }

    fn next_block(&mut self) -> Result<bool> {
        self.state.block_file_pointer = self.input.position();
        self.block_term_count = self.input.read_vint()?;
        if self.block_term_count == 0 {
            // Stay on the end marker so later calls hit it again
            self.input.seek_to(self.state.block_file_pointer)?;
            self.state.term_block_ord = 0;
            return Ok(false);
        }
        self.block_prefix = self.input.read_vint()? as usize;

        let len = self.input.read_vint()? as usize;
        self.input.read_into(&mut self.suffixes, len)?;
        self.suffix_reader.reset(len);

        let len = self.input.read_vint()? as usize;
        self.input.read_into(&mut self.stats, len)?;
        self.stats_reader.reset(len);

        let len = self.input.read_vint()? as usize;
        self.input.read_into(&mut self.meta, len)?;
        self.meta_reader.reset(len);

        self.metadata_upto = 0;
        self.state.term_block_ord = 0;
        self.index_is_current = false;
        Ok(true)
    }

    // Decode stats and postings metadata of every term of the block up to
    // the current one
    fn decode_meta_data(&mut self) -> Result<()> {
        self.check_positioned()?;
        if self.seek_pending {
            return Ok(());
        }

        let field_reader = self.field;
        let field: &FieldInfo = &field_reader.field_info;
        let postings_reader = self.postings_reader;
        let has_freqs = field.has_freqs();
        let mut meta = SliceInput::resume(&self.meta, self.meta_reader);

        while self.metadata_upto < self.state.term_block_ord {
            let doc_freq = self.stats_reader.read_vint(&self.stats)?;
            self.state.doc_freq = doc_freq;
            self.state.total_term_freq = if has_freqs {
                let extra = self.stats_reader.read_vlong(&self.stats)?;
                (doc_freq as u64)
                    .checked_add(extra)
                    .ok_or_else(|| BlockTermsError::corrupt("totalTermFreq overflow"))?
            } else {
                doc_freq as u64
            };
            postings_reader.decode_term(
                &mut meta,
                field,
                &mut self.state,
                self.metadata_upto == 0,
            )?;
            self.metadata_upto += 1;
        }
        self.meta_reader = meta.reader();
        Ok(())
    }
}
