//! Shared utility modules used across the terms dictionary and its indexes.

pub mod bytes;
pub mod packed;
pub mod varint;
