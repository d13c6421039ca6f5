//! Variable-length integer encoding utilities.
//!
//! Integers are written 7 bits per byte, least significant group first, with
//! the high bit of each byte set when more bytes follow. Small values (the
//! common case for suffix lengths, block counts and deltas) take one byte.

use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::error::{BlockTermsError, Result};

/// Maximum encoded length of a u32.
pub const MAX_VINT_LEN: usize = 5;

/// Maximum encoded length of a u64.
pub const MAX_VLONG_LEN: usize = 10;

/// Encode a u64 into `buf`, returning the number of bytes used.
#[inline]
pub fn encode_u64_into(value: u64, buf: &mut [u8; MAX_VLONG_LEN]) -> usize {
    let mut val = value;
    let mut len = 0;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        buf[len] = byte;
        len += 1;

        if val == 0 {
            return len;
        }
    }
}

/// Encode a u32 value using variable-length encoding.
pub fn encode_u32(value: u32) -> Vec<u8> {
    encode_u64(value as u64)
}

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut buf = [0u8; MAX_VLONG_LEN];
    let len = encode_u64_into(value, &mut buf);
    buf[..len].to_vec()
}

/// Decode a u32 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let (value, read) = decode_bounded(bytes, 32)?;
    Ok((value as u32, read))
}

/// Decode a u64 value from variable-length encoding.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    decode_bounded(bytes, 64)
}

#[inline]
fn decode_bounded(bytes: &[u8], bits: u32) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0u32;

    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= bits {
            return Err(BlockTermsError::corrupt("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, i + 1));
        }

        shift += 7;
    }

    Err(BlockTermsError::corrupt("Incomplete VarInt"))
}

/// Write a variable-length encoded u32 to a writer.
pub fn write_u32<W: Write + ?Sized>(writer: &mut W, value: u32) -> Result<usize> {
    write_u64(writer, value as u64)
}

/// Write a variable-length encoded u64 to a writer.
pub fn write_u64<W: Write + ?Sized>(writer: &mut W, value: u64) -> Result<usize> {
    let mut buf = [0u8; MAX_VLONG_LEN];
    let len = encode_u64_into(value, &mut buf);
    writer.write_all(&buf[..len])?;
    Ok(len)
}

/// Read a variable-length encoded u32 from a reader.
pub fn read_u32<R: Read + ?Sized>(reader: &mut R) -> Result<u32> {
    Ok(read_bounded(reader, 32)? as u32)
}

/// Read a variable-length encoded u64 from a reader.
pub fn read_u64<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    read_bounded(reader, 64)
}

fn read_bounded<R: Read + ?Sized>(reader: &mut R, bits: u32) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = reader.read_u8()?;

        if shift >= bits {
            return Err(BlockTermsError::corrupt("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }
}

/// Map a signed value onto an unsigned one so small magnitudes stay small.
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
