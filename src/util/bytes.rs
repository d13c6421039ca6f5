//! Byte-string helpers shared by the terms dictionary and its indexes.

use crate::error::{BlockTermsError, Result};
use crate::util::varint;

/// Length of the longest common prefix of `a` and `b`.
#[inline]
pub fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Length of the shortest prefix of `indexed` that still sorts after `prior`.
///
/// `prior` must sort before `indexed` (unsigned byte order). Storing only this
/// prefix in a terms index is enough to floor-seek correctly, because every
/// target that sorts between `prior` and `indexed` still compares below the
/// trimmed prefix once they differ.
pub fn indexed_prefix_len(prior: &[u8], indexed: &[u8]) -> usize {
    let limit = prior.len().min(indexed.len());
    for i in 0..limit {
        if prior[i] != indexed[i] {
            return i + 1;
        }
    }
    (prior.len() + 1).min(indexed.len())
}

/// A cursor over an in-memory byte slice, used to decode the blobs of a
/// terms block without going back to storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteSliceReader {
    pos: usize,
    limit: usize,
}

impl ByteSliceReader {
    /// Reset the reader to the first `len` bytes of its backing buffer.
    pub fn reset(&mut self, len: usize) {
        self.pos = 0;
        self.limit = len;
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether all bytes up to the limit have been consumed.
    pub fn eof(&self) -> bool {
        self.pos >= self.limit
    }

    /// Read a vint from `buf`.
    #[inline]
    pub fn read_vint(&mut self, buf: &[u8]) -> Result<u32> {
        let (value, read) = varint::decode_u32(&buf[self.pos..self.limit])?;
        self.pos += read;
        Ok(value)
    }

    /// Read a vlong from `buf`.
    #[inline]
    pub fn read_vlong(&mut self, buf: &[u8]) -> Result<u64> {
        let (value, read) = varint::decode_u64(&buf[self.pos..self.limit])?;
        self.pos += read;
        Ok(value)
    }

    /// Borrow the next `len` bytes of `buf` and advance past them.
    #[inline]
    pub fn read_slice<'a>(&mut self, buf: &'a [u8], len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.limit {
            return Err(BlockTermsError::corrupt(format!(
                "read past end of block: pos={} len={} limit={}",
                self.pos, len, self.limit
            )));
        }
        let slice = &buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Skip `len` bytes.
    #[inline]
    pub fn skip(&mut self, len: usize) -> Result<()> {
        if self.pos + len > self.limit {
            return Err(BlockTermsError::corrupt("skip past end of block"));
        }
        self.pos += len;
        Ok(())
    }
}

/// A reader bound to its own byte slice, for one-shot decoding.
#[derive(Debug)]
pub struct SliceInput<'a> {
    buf: &'a [u8],
    reader: ByteSliceReader,
}

impl<'a> SliceInput<'a> {
    /// Create a reader over the whole slice.
    pub fn new(buf: &'a [u8]) -> Self {
        let mut reader = ByteSliceReader::default();
        reader.reset(buf.len());
        SliceInput { buf, reader }
    }

    /// Pair `buf` with a reader that already holds a position in it.
    pub fn resume(buf: &'a [u8], reader: ByteSliceReader) -> Self {
        SliceInput { buf, reader }
    }

    /// The position state, to be handed back to [`SliceInput::resume`].
    pub fn reader(&self) -> ByteSliceReader {
        self.reader
    }

    /// Read a vint.
    pub fn read_vint(&mut self) -> Result<u32> {
        self.reader.read_vint(self.buf)
    }

    /// Read a vlong.
    pub fn read_vlong(&mut self) -> Result<u64> {
        self.reader.read_vlong(self.buf)
    }

    /// Read `len` raw bytes.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        self.reader.read_slice(self.buf, len)
    }

    /// Whether the slice is exhausted.
    pub fn eof(&self) -> bool {
        self.reader.eof()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_prefix_len() {
        assert_eq!(shared_prefix_len(b"apple", b"apply"), 4);
        assert_eq!(shared_prefix_len(b"app", b"apple"), 3);
        assert_eq!(shared_prefix_len(b"", b"apple"), 0);
        assert_eq!(shared_prefix_len(b"b", b"apple"), 0);
    }

    #[test]
    fn test_indexed_prefix_len() {
        // Differ at byte 2 -> keep 3 bytes
        assert_eq!(indexed_prefix_len(b"apple", b"apricot"), 3);
        // Prior is a prefix -> one extra byte
        assert_eq!(indexed_prefix_len(b"app", b"apple"), 4);
        // Nothing before -> a single byte
        assert_eq!(indexed_prefix_len(b"", b"zebra"), 1);
        assert_eq!(indexed_prefix_len(b"", b""), 0);

        // The trimmed prefix must sort after the prior term
        let prior = b"cc".as_slice();
        let term = b"cd".as_slice();
        let trimmed = &term[..indexed_prefix_len(prior, term)];
        assert!(trimmed > prior);
        assert!(trimmed <= term);
    }

    #[test]
    fn test_slice_input() {
        let mut buf = Vec::new();
        varint::write_u32(&mut buf, 300).unwrap();
        buf.extend_from_slice(b"abc");
        varint::write_u64(&mut buf, 1 << 33).unwrap();

        let mut input = SliceInput::new(&buf);
        assert_eq!(input.read_vint().unwrap(), 300);
        assert_eq!(input.read_slice(3).unwrap(), b"abc");
        assert_eq!(input.read_vlong().unwrap(), 1 << 33);
        assert!(input.eof());
        assert!(input.read_slice(1).is_err());
    }

    #[test]
    fn test_slice_input_resume() {
        let buf = [1u8, 2, 3];
        let mut input = SliceInput::new(&buf);
        assert_eq!(input.read_vint().unwrap(), 1);

        let mut input = SliceInput::resume(&buf, input.reader());
        assert_eq!(input.read_vint().unwrap(), 2);
        assert_eq!(input.reader().position(), 2);
    }

    #[test]
    fn test_byte_slice_reader_skip() {
        let buf = [3u8, b'x', b'y', b'z', 1, b'q'];
        let mut reader = ByteSliceReader::default();
        reader.reset(buf.len());

        let len = reader.read_vint(&buf).unwrap() as usize;
        reader.skip(len).unwrap();
        let len = reader.read_vint(&buf).unwrap() as usize;
        assert_eq!(reader.read_slice(&buf, len).unwrap(), b"q");
        assert!(reader.skip(1).is_err());
    }
}
