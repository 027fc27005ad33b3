//! Chunk index: maps plaintext byte offsets to stored chunk byte ranges.
//!
//! ## Encodings
//!
//! - **Fixed**: every chunk shares one plaintext size and one transformed
//!   size, except possibly the final chunk, which may be shorter in
//!   either dimension. Lookups are pure arithmetic.
//! - **Variable**: an explicit transformed size per chunk (compression
//!   makes them differ). Transformed positions come from a prefix-sum
//!   array over the chunk sizes, computed once and memoized, so lookups
//!   index into it in O(1).
//!
//! Both encodings are structural proofs of the index invariants: chunks
//! are contiguous, non-overlapping, and densely numbered from 0 in both
//! coordinate spaces, because positions are derived rather than stored.
//! After construction an index is immutable and safe to share across
//! readers.
//!
//! ## Usage
//!
//! ```ignore
//! use tierhouse_core::{ChunkIndex, FixedSizeChunkIndex};
//!
//! let index = ChunkIndex::Fixed(FixedSizeChunkIndex {
//!     original_chunk_size: 10,
//!     original_file_size: 25,
//!     transformed_chunk_size: 12,
//!     transformed_file_size: 29,
//! });
//!
//! // which chunk serves plaintext byte 17?
//! let chunk = index.find_chunk_for_original_offset(17)?;
//! assert_eq!(chunk.ordinal, 1);
//!
//! // where do its bytes live in the uploaded object?
//! let range = chunk.transformed_range();
//! ```

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::error::{Error, Result};

/// Serialized with a `type` tag so parsers can reject unknown encodings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChunkIndex {
    #[serde(rename = "fixed")]
    Fixed(FixedSizeChunkIndex),
    #[serde(rename = "variable")]
    Variable(VariableSizeChunkIndex),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedSizeChunkIndex {
    pub original_chunk_size: u32,
    pub original_file_size: u64,
    pub transformed_chunk_size: u32,
    pub transformed_file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSizeChunkIndex {
    pub original_chunk_size: u32,
    pub original_file_size: u64,
    pub transformed_chunks: Vec<u32>,
    /// Prefix sums of `transformed_chunks`, built on first lookup.
    #[serde(skip)]
    transformed_offsets: OnceLock<Vec<u64>>,
}

impl VariableSizeChunkIndex {
    pub fn new(
        original_chunk_size: u32,
        original_file_size: u64,
        transformed_chunks: Vec<u32>,
    ) -> Self {
        Self {
            original_chunk_size,
            original_file_size,
            transformed_chunks,
            transformed_offsets: OnceLock::new(),
        }
    }

    /// `transformed_offsets()[i]` is where chunk `i` starts in the
    /// uploaded object.
    fn transformed_offsets(&self) -> &[u64] {
        self.transformed_offsets.get_or_init(|| {
            let mut offsets = Vec::with_capacity(self.transformed_chunks.len());
            let mut position = 0u64;
            for &size in &self.transformed_chunks {
                offsets.push(position);
                position += size as u64;
            }
            offsets
        })
    }
}

// the memoized offsets are derived state and do not affect identity
impl PartialEq for VariableSizeChunkIndex {
    fn eq(&self, other: &Self) -> bool {
        self.original_chunk_size == other.original_chunk_size
            && self.original_file_size == other.original_file_size
            && self.transformed_chunks == other.transformed_chunks
    }
}

impl Eq for VariableSizeChunkIndex {}

impl ChunkIndex {
    /// Number of chunks in the segment.
    pub fn count(&self) -> u32 {
        match self {
            ChunkIndex::Fixed(ix) => {
                chunk_count(ix.original_file_size, ix.original_chunk_size)
            }
            ChunkIndex::Variable(ix) => ix.transformed_chunks.len() as u32,
        }
    }

    /// Plaintext size of the whole segment.
    pub fn original_file_size(&self) -> u64 {
        match self {
            ChunkIndex::Fixed(ix) => ix.original_file_size,
            ChunkIndex::Variable(ix) => ix.original_file_size,
        }
    }

    /// Size of the uploaded object.
    pub fn transformed_file_size(&self) -> u64 {
        match self {
            ChunkIndex::Fixed(ix) => ix.transformed_file_size,
            ChunkIndex::Variable(ix) => match ix.transformed_chunks.last() {
                Some(&last) => {
                    let offsets = ix.transformed_offsets();
                    offsets[offsets.len() - 1] + last as u64
                }
                None => 0,
            },
        }
    }

    /// Returns the chunk at `ordinal`, or `None` past the end.
    pub fn get(&self, ordinal: u32) -> Option<Chunk> {
        if ordinal >= self.count() {
            return None;
        }
        match self {
            ChunkIndex::Fixed(ix) => {
                let ocs = ix.original_chunk_size as u64;
                let tcs = ix.transformed_chunk_size as u64;
                let original_from = ordinal as u64 * ocs;
                let transformed_from = ordinal as u64 * tcs;
                Some(Chunk {
                    ordinal,
                    original_from,
                    original_size: size_at(original_from, ocs, ix.original_file_size),
                    transformed_from,
                    transformed_size: size_at(
                        transformed_from,
                        tcs,
                        ix.transformed_file_size,
                    ),
                })
            }
            ChunkIndex::Variable(ix) => {
                let ocs = ix.original_chunk_size as u64;
                let original_from = ordinal as u64 * ocs;
                Some(Chunk {
                    ordinal,
                    original_from,
                    original_size: size_at(original_from, ocs, ix.original_file_size),
                    transformed_from: ix.transformed_offsets()[ordinal as usize],
                    transformed_size: ix.transformed_chunks[ordinal as usize],
                })
            }
        }
    }

    /// All chunks in ordinal order, computed lazily.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.count()).filter_map(move |ordinal| self.get(ordinal))
    }

    /// Returns the unique chunk whose plaintext extent contains `offset`.
    ///
    /// The base chunker fixes plaintext boundaries at multiples of the
    /// chunk size, so the ordinal is a division in both encodings; the
    /// transformed position of a variable chunk comes from its memoized
    /// prefix-sum table inside [`ChunkIndex::get`].
    pub fn find_chunk_for_original_offset(&self, offset: u64) -> Result<Chunk> {
        let total = self.original_file_size();
        if offset >= total {
            return Err(Error::OffsetOutOfRange { offset, total });
        }
        let ocs = match self {
            ChunkIndex::Fixed(ix) => ix.original_chunk_size,
            ChunkIndex::Variable(ix) => ix.original_chunk_size,
        };
        let ordinal = (offset / ocs as u64) as u32;
        self.get(ordinal).ok_or(Error::OffsetOutOfRange { offset, total })
    }

    /// Checks the internal consistency a parser cannot guarantee from
    /// shape alone.
    pub fn validate(&self) -> Result<()> {
        match self {
            ChunkIndex::Fixed(ix) => {
                if ix.original_chunk_size == 0 || ix.transformed_chunk_size == 0 {
                    return Err(Error::InvalidChunkIndex(
                        "chunk sizes must be positive".to_string(),
                    ));
                }
                let original = chunk_count(ix.original_file_size, ix.original_chunk_size);
                let transformed =
                    chunk_count(ix.transformed_file_size, ix.transformed_chunk_size);
                if original != transformed {
                    return Err(Error::InvalidChunkIndex(format!(
                        "chunk count mismatch: {original} original vs {transformed} transformed"
                    )));
                }
            }
            ChunkIndex::Variable(ix) => {
                if ix.original_chunk_size == 0 {
                    return Err(Error::InvalidChunkIndex(
                        "chunk sizes must be positive".to_string(),
                    ));
                }
                let expected = chunk_count(ix.original_file_size, ix.original_chunk_size);
                if expected != ix.transformed_chunks.len() as u32 {
                    return Err(Error::InvalidChunkIndex(format!(
                        "expected {expected} chunks, found {}",
                        ix.transformed_chunks.len()
                    )));
                }
                if ix.transformed_chunks.iter().any(|&s| s == 0) {
                    return Err(Error::InvalidChunkIndex(
                        "transformed chunks must be non-empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn chunk_count(file_size: u64, chunk_size: u32) -> u32 {
    (file_size.div_ceil(chunk_size as u64)) as u32
}

fn size_at(from: u64, chunk_size: u64, file_size: u64) -> u32 {
    chunk_size.min(file_size.saturating_sub(from)) as u32
}
