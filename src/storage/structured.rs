//! Structured file I/O for binary data serialization.
//!
//! [`StructWriter`] and [`StructReader`] wrap a storage stream with typed
//! little-endian primitives, variable-length integers and length-prefixed
//! byte strings. The writer keeps a running CRC32 of every byte it emits so
//! that a footer can be appended without re-reading the file.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{BlockTermsError, Result};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint;

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: Hasher,
    position: u64,
}

impl<W: StorageOutput> std::fmt::Debug for StructWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructWriter")
            .field("writer", &self.writer)
            .field("position", &self.position)
            .finish()
    }
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_raw(&[value])
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        WriteBytesExt::write_u32::<LittleEndian>(self, value)?;
        Ok(())
    }

    /// Write an i32 value (little-endian).
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        WriteBytesExt::write_i32::<LittleEndian>(self, value)?;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        WriteBytesExt::write_u64::<LittleEndian>(self, value)?;
        Ok(())
    }

    /// Write a variable-length u32.
    pub fn write_vint(&mut self, value: u32) -> Result<()> {
        varint::write_u32(self, value)?;
        Ok(())
    }

    /// Write a variable-length u64.
    pub fn write_vlong(&mut self, value: u64) -> Result<()> {
        varint::write_u64(self, value)?;
        Ok(())
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_vint(value.len() as u32)?;
        self.write_raw(value)
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.write_all(value)?;
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// CRC32 of every byte written so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Flush and close the writer.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.close()
    }
}

impl<W: StorageOutput> Write for StructWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// A structured file reader for binary data.
pub struct StructReader<R: StorageInput> {
    reader: R,
    position: u64,
    file_size: u64,
}

impl<R: StorageInput> std::fmt::Debug for StructReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructReader")
            .field("position", &self.position)
            .field("file_size", &self.file_size)
            .finish()
    }
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured file reader positioned at the start.
    pub fn new(mut reader: R) -> Result<Self> {
        let file_size = reader.size()?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(StructReader {
            reader,
            position: 0,
            file_size,
        })
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(ReadBytesExt::read_u8(self)?)
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(ReadBytesExt::read_u32::<LittleEndian>(self)?)
    }

    /// Read an i32 value (little-endian).
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(ReadBytesExt::read_i32::<LittleEndian>(self)?)
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(ReadBytesExt::read_u64::<LittleEndian>(self)?)
    }

    /// Read a variable-length u32.
    pub fn read_vint(&mut self) -> Result<u32> {
        varint::read_u32(self)
    }

    /// Read a variable-length u64.
    pub fn read_vlong(&mut self) -> Result<u64> {
        varint::read_u64(self)
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| BlockTermsError::corrupt(format!("Invalid UTF-8: {e}")))
    }

    /// Read bytes with length prefix.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_vint()? as usize;
        self.read_raw(length)
    }

    /// Read exact number of raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; self.checked_len(length)?];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Fill `buf` with the next `length` bytes, reusing its allocation.
    pub fn read_into(&mut self, buf: &mut Vec<u8>, length: usize) -> Result<()> {
        buf.resize(self.checked_len(length)?, 0);
        self.read_exact(buf)?;
        Ok(())
    }

    fn checked_len(&self, length: usize) -> Result<usize> {
        let remaining = self.file_size.saturating_sub(self.position);
        if length as u64 > remaining {
            return Err(BlockTermsError::corrupt(format!(
                "read past EOF: pos={} len={} size={}",
                self.position, length, self.file_size
            )));
        }
        Ok(length)
    }

    /// Move to an absolute file position.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        if pos > self.file_size {
            return Err(BlockTermsError::corrupt(format!(
                "seek past EOF: pos={} size={}",
                pos, self.file_size
            )));
        }
        self.reader.seek(SeekFrom::Start(pos))?;
        self.position = pos;
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get file size.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// Open an independent reader over the same file, at the same position.
    pub fn try_clone(&self) -> Result<StructReader<Box<dyn StorageInput>>> {
        let mut reader = StructReader::new(self.reader.clone_input()?)?;
        reader.seek_to(self.position)?;
        Ok(reader)
    }

    /// Close the reader.
    pub fn close(mut self) -> Result<()> {
        self.reader.close()
    }
}

impl<R: StorageInput> Read for StructReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.reader.read(buf)?;
        self.position += read as u64;
        Ok(read)
    }
}
