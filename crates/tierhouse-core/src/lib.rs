//! Core data model and transforms for tierhouse, a tiered-storage plug-in
//! for distributed log systems.
//!
//! This crate holds everything that does not touch the network: the chunk
//! index that maps plaintext offsets to stored byte ranges, the segment
//! manifest and its JSON encoding, envelope encryption (RSA-wrapped
//! per-segment AES data keys), and the pull-based transform streams that
//! turn a raw segment into its uploaded form and back.
//!
//! The async half of the plug-in (object store access, caches, the host
//! adapter) lives in `tierhouse-storage` and composes these pieces.

pub mod batch;
pub mod chunk;
pub mod error;
pub mod index;
pub mod manifest;
pub mod security;
pub mod segment;
pub mod transform;

pub use chunk::{BytesRange, Chunk};
pub use error::{Error, Result};
pub use index::{ChunkIndex, FixedSizeChunkIndex, VariableSizeChunkIndex};
pub use manifest::{SegmentEncryptionMetadata, SegmentManifest, SegmentManifestV1};
pub use segment::{IndexType, SegmentData, SegmentMetadata};
