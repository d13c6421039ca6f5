//! File header, footer and trailer plumbing shared by every file in a segment.
//!
//! Every file starts with a header identifying the codec that wrote it and
//! ends with a 16 byte footer carrying a CRC32 of everything before it:
//!
//! ```text
//! header:  u32 magic | string codec | u32 version | string suffix
//! footer:  u32 !magic | u32 algorithm (0 = CRC32) | u64 checksum
//! ```
//!
//! Files with a directory at the end (the terms dictionary and the fixed gap
//! index) write the directory's start offset as an 8 byte trailer right
//! before the footer.

use std::io::Read;

use crate::error::{BlockTermsError, Result};
use crate::storage::{StorageInput, StorageOutput, StructReader, StructWriter};

/// Magic number at the start of every file.
pub const CODEC_MAGIC: u32 = 0x3fd7_6c17;

/// Magic number at the start of every footer.
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;

/// Footer length in bytes.
pub const FOOTER_LENGTH: u64 = 16;

/// Length of the directory offset trailer.
pub const TRAILER_LENGTH: u64 = 8;

const ALGORITHM_CRC32: u32 = 0;

/// Build the name of a segment file.
pub fn segment_file_name(segment: &str, suffix: &str, ext: &str) -> String {
    if suffix.is_empty() {
        format!("{segment}.{ext}")
    } else {
        format!("{segment}_{suffix}.{ext}")
    }
}

/// Write a codec header.
pub fn write_header<W: StorageOutput>(
    out: &mut StructWriter<W>,
    codec: &str,
    version: u32,
    suffix: &str,
) -> Result<()> {
    out.write_u32(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_u32(version)?;
    out.write_string(suffix)?;
    Ok(())
}

/// Read and validate a codec header, returning the file's version.
pub fn check_header<R: StorageInput>(
    input: &mut StructReader<R>,
    codec: &str,
    min_version: u32,
    max_version: u32,
    suffix: &str,
) -> Result<u32> {
    let magic = input.read_u32()?;
    if magic != CODEC_MAGIC {
        return Err(BlockTermsError::format(format!(
            "codec header mismatch: actual header={magic:#x} vs expected header={CODEC_MAGIC:#x}"
        )));
    }

    let actual_codec = input.read_string()?;
    if actual_codec != codec {
        return Err(BlockTermsError::format(format!(
            "codec mismatch: actual codec={actual_codec} vs expected codec={codec}"
        )));
    }

    let version = input.read_u32()?;
    if version < min_version || version > max_version {
        return Err(BlockTermsError::format(format!(
            "version {version} is not supported by {codec} (must be in {min_version}..={max_version})"
        )));
    }

    let actual_suffix = input.read_string()?;
    if actual_suffix != suffix {
        return Err(BlockTermsError::corrupt(format!(
            "file mismatch: actual suffix={actual_suffix} vs expected suffix={suffix}"
        )));
    }

    Ok(version)
}

/// Write the checksum footer. Must be the last thing written to `out`.
pub fn write_footer<W: StorageOutput>(out: &mut StructWriter<W>) -> Result<()> {
    out.write_u32(FOOTER_MAGIC)?;
    out.write_u32(ALGORITHM_CRC32)?;
    let checksum = out.checksum();
    out.write_u64(checksum as u64)?;
    Ok(())
}

fn validate_footer<R: StorageInput>(input: &mut StructReader<R>) -> Result<u64> {
    let magic = input.read_u32()?;
    if magic != FOOTER_MAGIC {
        return Err(BlockTermsError::corrupt(format!(
            "codec footer mismatch (file truncated?): actual footer={magic:#x} vs expected footer={FOOTER_MAGIC:#x}"
        )));
    }

    let algorithm = input.read_u32()?;
    if algorithm != ALGORITHM_CRC32 {
        return Err(BlockTermsError::corrupt(format!(
            "unknown checksum algorithm: {algorithm}"
        )));
    }

    let checksum = input.read_u64()?;
    if checksum >> 32 != 0 {
        return Err(BlockTermsError::corrupt(format!(
            "illegal CRC-32 checksum: {checksum}"
        )));
    }

    Ok(checksum)
}

/// Validate the footer's structure and return the stored checksum.
///
/// Only the last [`FOOTER_LENGTH`] bytes are read. Leaves the input
/// positioned at the end of the file.
pub fn retrieve_checksum<R: StorageInput>(input: &mut StructReader<R>) -> Result<u64> {
    if input.size() < FOOTER_LENGTH {
        return Err(BlockTermsError::corrupt(format!(
            "misplaced codec footer (file truncated?): length={} but footerLength=={FOOTER_LENGTH}",
            input.size()
        )));
    }
    input.seek_to(input.size() - FOOTER_LENGTH)?;
    validate_footer(input)
}

/// Recompute the CRC32 of the whole file and compare it against the footer.
///
/// Works on a clone, so the caller's position is not disturbed.
pub fn checksum_entire_file<R: StorageInput>(input: &StructReader<R>) -> Result<u64> {
    let mut clone = input.try_clone()?;
    let expected = retrieve_checksum(&mut clone)?;

    // The checksum covers the footer magic and algorithm id.
    let covered = clone.size() - TRAILER_LENGTH;
    clone.seek_to(0)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 8192];
    let mut remaining = covered;
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        clone.read_exact(&mut buf[..chunk])?;
        hasher.update(&buf[..chunk]);
        remaining -= chunk as u64;
    }

    let actual = hasher.finalize() as u64;
    if actual != expected {
        return Err(BlockTermsError::corrupt(format!(
            "checksum failed (hardware problem?): expected={expected:#x} actual={actual:#x}"
        )));
    }

    Ok(actual)
}

/// Write the directory start offset trailer.
pub fn write_trailer<W: StorageOutput>(out: &mut StructWriter<W>, dir_start: u64) -> Result<()> {
    out.write_u64(dir_start)
}

/// Read the trailer and position `input` at the start of the directory.
pub fn seek_dir<R: StorageInput>(input: &mut StructReader<R>) -> Result<()> {
    let trailer_pos = input
        .size()
        .checked_sub(FOOTER_LENGTH + TRAILER_LENGTH)
        .ok_or_else(|| BlockTermsError::corrupt("file too short for directory trailer"))?;
    input.seek_to(trailer_pos)?;
    let dir_start = input.read_u64()?;
    if dir_start > trailer_pos {
        return Err(BlockTermsError::corrupt(format!(
            "invalid directory offset: {dir_start} (trailer at {trailer_pos})"
        )));
    }
    input.seek_to(dir_start)
}
