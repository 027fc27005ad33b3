//! Pull-based chunk transform streams.
//!
//! Both directions of the pipeline are lazy, finite, non-restartable
//! sequences of byte blocks. Each stage wraps the previous one and maps a
//! single input block to a single output block, so block identity is
//! preserved end to end and a random read always lands on one chunk:
//!
//! ```text
//! write path:  source ─ BaseChunker ─ Compression? ─ Encryption? ─ finisher
//! read path:   ranged GET ─ BaseDechunker ─ Decryption? ─ Decompression?
//! ```
//!
//! On the write path the base chunker defines the boundaries by splitting
//! the source into fixed-size plaintext blocks (the last one may be
//! shorter). On the read path the base dechunker reads exactly the
//! transformed extent of the chunk(s) it was seeded with.
//!
//! Chains are assembled once per request as boxed trait objects and
//! handed to a driver; stages never buffer more than the block in flight.
//!
//! ## Usage
//!
//! ```ignore
//! use std::io::Cursor;
//! use tierhouse_core::transform::{
//!     BaseChunker, CompressionTransform, TransformFinisher, TransformStream,
//! };
//!
//! // write path: chunk + compress, then drive to get the upload body
//! let mut stream: Box<dyn TransformStream> =
//!     Box::new(BaseChunker::new(Cursor::new(segment_bytes.clone()), chunk_size));
//! stream = Box::new(CompressionTransform::new(stream));
//!
//! let finisher = TransformFinisher::new(stream, segment_bytes.len() as u64);
//! let (body, chunk_index) = finisher.complete()?;
//! // upload `body`, persist `chunk_index` in the manifest
//! ```

mod finisher;
mod inbound;
mod outbound;

pub use finisher::TransformFinisher;
pub use inbound::{BaseChunker, CompressionTransform, EncryptionTransform};
pub use outbound::{BaseDechunker, DecompressionTransform, DecryptionTransform};

use bytes::Bytes;

use crate::error::Result;

/// A write-path stage: plaintext blocks in, transformed blocks out.
pub trait TransformStream: Send {
    /// The fixed plaintext block size the source was split with.
    fn original_chunk_size(&self) -> u32;

    /// The transformed block size, when it is constant and known before
    /// consumption. `None` once a variable-size stage (compression) is in
    /// the chain.
    fn transformed_chunk_size(&self) -> Option<u32>;

    /// Pulls the next transformed block, or `None` when the source is
    /// exhausted.
    fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// A read-path stage: transformed blocks in, plaintext blocks out.
pub trait DetransformStream: Send {
    fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}
