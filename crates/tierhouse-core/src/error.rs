//! Error types for the tiered-storage core.
//!
//! All fallible operations in this crate return `Result<T>` aliased to
//! `Result<T, Error>`, so callers can propagate with `?`. None of these
//! errors are retryable: they indicate bad input, corruption, or a key
//! mismatch, never a transient condition.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offset {offset} out of range [0, {total})")]
    OffsetOutOfRange { offset: u64, total: u64 },

    #[error("chunk {ordinal} out of range: segment has {count} chunks")]
    ChunkOutOfRange { ordinal: u32, count: u32 },

    #[error("invalid chunk index: {0}")]
    InvalidChunkIndex(String),

    #[error("chunk data truncated: expected {expected} bytes, {available} available")]
    ChunkTruncated { expected: u32, available: usize },

    #[error("failed to load encryption key: {0}")]
    InvalidKey(String),

    #[error("failed to wrap data key: {0}")]
    KeyWrap(String),

    #[error("failed to unwrap data key: {0}")]
    KeyUnwrap(String),

    #[error("authentication tag verification failed")]
    AuthTagInvalid,

    #[error("encryption failure: {0}")]
    Encryption(String),

    #[error("corrupt compressed chunk: {0}")]
    CompressionCorrupt(String),

    #[error("manifest serialization error: {0}")]
    ManifestSerde(#[from] serde_json::Error),

    #[error("invalid record batch: {0}")]
    InvalidBatch(String),
}
