//! Drives a write-path stream to completion and emits the chunk index.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::index::{ChunkIndex, FixedSizeChunkIndex, VariableSizeChunkIndex};
use crate::transform::TransformStream;

/// Pulls every transformed block out of a write-path chain, concatenating
/// them into the upload body while recording their sizes.
///
/// The chunk index only exists once the stream has been fully consumed,
/// so [`TransformFinisher::complete`] takes the finisher by value and
/// returns both the body and the index together.
pub struct TransformFinisher {
    stream: Box<dyn TransformStream>,
    original_file_size: u64,
}

impl TransformFinisher {
    pub fn new(stream: Box<dyn TransformStream>, original_file_size: u64) -> Self {
        Self {
            stream,
            original_file_size,
        }
    }

    /// Consumes the stream. Any stage error surfaces unchanged and the
    /// body is discarded.
    pub fn complete(mut self) -> Result<(Bytes, ChunkIndex)> {
        let original_chunk_size = self.stream.original_chunk_size();
        let mut body = BytesMut::new();
        let mut transformed_sizes = Vec::new();
        while let Some(block) = self.stream.next_chunk()? {
            transformed_sizes.push(block.len() as u32);
            body.extend_from_slice(&block);
        }

        let expected = self
            .original_file_size
            .div_ceil(original_chunk_size as u64) as usize;
        if transformed_sizes.len() != expected {
            return Err(Error::InvalidChunkIndex(format!(
                "stream produced {} chunks for a {}-byte segment, expected {expected}",
                transformed_sizes.len(),
                self.original_file_size
            )));
        }

        let index = build_index(
            original_chunk_size,
            self.original_file_size,
            &transformed_sizes,
            body.len() as u64,
        );
        Ok((body.freeze(), index))
    }
}

/// Emits the compact fixed form when every non-final chunk came out the
/// same size and the final one is no larger; otherwise falls back to the
/// explicit per-chunk form.
fn build_index(
    original_chunk_size: u32,
    original_file_size: u64,
    transformed_sizes: &[u32],
    transformed_file_size: u64,
) -> ChunkIndex {
    let uniform_size = match transformed_sizes {
        [] => Some(original_chunk_size),
        [only] => Some(*only),
        [head @ .., last] => {
            let first = head[0];
            (head.iter().all(|&s| s == first) && *last <= first).then_some(first)
        }
    };
    match uniform_size {
        Some(transformed_chunk_size) => ChunkIndex::Fixed(FixedSizeChunkIndex {
            original_chunk_size,
            original_file_size,
            transformed_chunk_size,
            transformed_file_size,
        }),
        None => ChunkIndex::Variable(VariableSizeChunkIndex::new(
            original_chunk_size,
            original_file_size,
            transformed_sizes.to_vec(),
        )),
    }
}
