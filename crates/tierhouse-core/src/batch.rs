//! Record-batch sniffing for the compression heuristic.
//!
//! Log segments start with a record batch whose header carries a
//! compression codec in the low bits of the attributes field. When the
//! producer already compressed its batches, re-compressing the segment on
//! upload wastes CPU for no gain, so the write path peeks at the first
//! batch before deciding.

use crate::error::{Error, Result};

/// Bytes needed to read through the attributes field of a batch header:
/// base offset (8), batch length (4), leader epoch (4), magic (1),
/// crc (4), attributes (2).
pub const BATCH_HEADER_MIN_SIZE: usize = 23;

const MAGIC_OFFSET: usize = 16;
const ATTRIBUTES_OFFSET: usize = 21;
const SUPPORTED_MAGIC: i8 = 2;
const COMPRESSION_CODEC_MASK: u16 = 0x07;

/// Returns whether the first record batch of `segment` declares a
/// compression codec.
///
/// Fails on segments too short to hold a batch header or written with an
/// unsupported batch format; callers decide what the fallback is.
pub fn first_batch_is_compressed(segment: &[u8]) -> Result<bool> {
    if segment.len() < BATCH_HEADER_MIN_SIZE {
        return Err(Error::InvalidBatch(format!(
            "segment of {} bytes is shorter than a batch header",
            segment.len()
        )));
    }
    let magic = segment[MAGIC_OFFSET] as i8;
    if magic != SUPPORTED_MAGIC {
        return Err(Error::InvalidBatch(format!(
            "unsupported batch magic {magic}"
        )));
    }
    let attributes = u16::from_be_bytes([
        segment[ATTRIBUTES_OFFSET],
        segment[ATTRIBUTES_OFFSET + 1],
    ]);
    Ok(attributes & COMPRESSION_CODEC_MASK != 0)
}
