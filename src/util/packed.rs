//! Block-packed storage for monotonically increasing integer sequences.
//!
//! Values are split into fixed-size blocks. For each block the encoder fits a
//! line through the first and last value and stores, per value, only the
//! distance from that line, bit-packed at the smallest width that holds the
//! largest distance. File pointers and byte offsets into a term store grow
//! nearly linearly, so the residuals stay small.
//!
//! Block layout:
//!
//! ```text
//! vlong  zigzag(min residual)
//! u32    f32 bits of the average step
//! u8     bits per value
//! bytes  ceil(count * bits / 8) packed residuals, LSB first
//! ```

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{BlockTermsError, Result};
use crate::util::varint;

/// Current version of the packed block layout.
pub const PACKED_VERSION_CURRENT: u32 = 1;

/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: u32 = 64;

/// Largest accepted block size.
pub const MAX_BLOCK_SIZE: u32 = 1 << 27;

/// Default number of values per block.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Compute the number of bits needed to represent the maximum value.
#[inline]
pub fn bits_needed(max_val: u64) -> u8 {
    (64 - max_val.leading_zeros()) as u8
}

/// Check that a block size read from disk (or supplied by a caller) is usable.
pub fn check_block_size(block_size: u32) -> Result<u32> {
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) || !block_size.is_power_of_two()
    {
        return Err(BlockTermsError::corrupt(format!(
            "invalid packed block size: {block_size}"
        )));
    }
    Ok(block_size)
}

#[inline]
fn expected(avg: f32, i: usize) -> i64 {
    (avg as f64 * i as f64) as i64
}

/// Encode `values` (non-decreasing) as monotonic packed blocks.
pub fn write_monotonic<W: Write + ?Sized>(
    out: &mut W,
    values: &[u64],
    block_size: u32,
) -> Result<()> {
    debug_assert!(values.windows(2).all(|w| w[0] <= w[1]));
    let mut packed = Vec::new();

    for block in values.chunks(block_size as usize) {
        let avg = if block.len() == 1 {
            0f32
        } else {
            (block[block.len() - 1] - block[0]) as f32 / (block.len() - 1) as f32
        };

        let deltas: Vec<i64> = block
            .iter()
            .enumerate()
            .map(|(i, &v)| v as i64 - expected(avg, i))
            .collect();
        let min = deltas.iter().copied().min().unwrap_or(0);
        let max_residual = deltas
            .iter()
            .map(|&d| (d - min) as u64)
            .max()
            .unwrap_or(0);
        let bits = bits_needed(max_residual);

        varint::write_u64(out, varint::zigzag_encode(min))?;
        out.write_u32::<LittleEndian>(avg.to_bits())?;
        out.write_u8(bits)?;

        packed.clear();
        pack(deltas.iter().map(|&d| (d - min) as u64), bits, &mut packed);
        out.write_all(&packed)?;
    }

    Ok(())
}

fn pack(values: impl Iterator<Item = u64>, bits: u8, output: &mut Vec<u8>) {
    if bits == 0 {
        return;
    }

    let mut bit_pos = 0usize;
    for value in values {
        let mut remaining_bits = bits as usize;
        let mut val = value;
        while remaining_bits > 0 {
            let byte_idx = bit_pos / 8;
            let bit_offset = bit_pos % 8;
            if byte_idx == output.len() {
                output.push(0);
            }
            let bits_in_byte = (8 - bit_offset).min(remaining_bits);
            let mask = ((1u16 << bits_in_byte) - 1) as u8;
            output[byte_idx] |= ((val as u8) & mask) << bit_offset;
            val = val.checked_shr(bits_in_byte as u32).unwrap_or(0);
            remaining_bits -= bits_in_byte;
            bit_pos += bits_in_byte;
        }
    }
}

#[inline]
fn unpack_one(input: &[u8], bits: u8, index: usize) -> u64 {
    let mut bit_pos = index * bits as usize;
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut remaining_bits = bits as usize;

    while remaining_bits > 0 {
        let bit_offset = bit_pos % 8;
        let bits_in_byte = (8 - bit_offset).min(remaining_bits);
        let mask = ((1u16 << bits_in_byte) - 1) as u8;
        let byte_val = (input[bit_pos / 8] >> bit_offset) & mask;
        value |= (byte_val as u64) << shift;
        shift += bits_in_byte as u32;
        remaining_bits -= bits_in_byte;
        bit_pos += bits_in_byte;
    }

    value
}

#[derive(Debug, Clone)]
struct BlockMeta {
    min: i64,
    avg: f32,
    bits: u8,
    offset: usize,
}

/// Random-access reader over monotonic packed blocks, fully loaded in memory.
#[derive(Debug, Clone)]
pub struct MonotonicBlockPackedReader {
    blocks: Vec<BlockMeta>,
    data: Vec<u8>,
    block_shift: u32,
    block_mask: usize,
    count: usize,
}

impl MonotonicBlockPackedReader {
    /// Load `count` values written by [`write_monotonic`] with `block_size`.
    pub fn load<R: Read + ?Sized>(input: &mut R, count: usize, block_size: u32) -> Result<Self> {
        let block_size = check_block_size(block_size)?;
        let num_blocks = count.div_ceil(block_size as usize);
        let mut blocks = Vec::with_capacity(num_blocks);
        let mut data = Vec::new();

        for block in 0..num_blocks {
            let len = (count - block * block_size as usize).min(block_size as usize);
            let min = varint::zigzag_decode(varint::read_u64(input)?);
            let avg = f32::from_bits(input.read_u32::<LittleEndian>()?);
            let bits = input.read_u8()?;
            if bits > 64 {
                return Err(BlockTermsError::corrupt(format!(
                    "invalid packed bits per value: {bits}"
                )));
            }

            let offset = data.len();
            let bytes = (len * bits as usize).div_ceil(8);
            data.resize(offset + bytes, 0);
            input.read_exact(&mut data[offset..])?;
            blocks.push(BlockMeta {
                min,
                avg,
                bits,
                offset,
            });
        }

        Ok(MonotonicBlockPackedReader {
            blocks,
            data,
            block_shift: block_size.trailing_zeros(),
            block_mask: block_size as usize - 1,
            count,
        })
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether there are no values.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Get the value at `index`.
    pub fn get(&self, index: usize) -> u64 {
        debug_assert!(index < self.count);
        let block = &self.blocks[index >> self.block_shift];
        let i = index & self.block_mask;
        let residual = if block.bits == 0 {
            0
        } else {
            unpack_one(&self.data[block.offset..], block.bits, i)
        };
        (block.min + expected(block.avg, i) + residual as i64) as u64
    }

    /// Approximate heap usage in bytes.
    pub fn ram_bytes_used(&self) -> usize {
        self.data.capacity() + self.blocks.capacity() * std::mem::size_of::<BlockMeta>()
    }
}
