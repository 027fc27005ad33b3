//! tierhouse storage layer
//!
//! This crate is the async half of the tierhouse tiered-storage plug-in:
//! it moves immutable log segments between the host and an object store,
//! and serves random-access reads out of them through a chunk cache.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐
//! │  Host (log broker)   │
//! └─────┬──────────┬─────┘
//!       │ copy     │ fetch(start, end)
//!       ▼          ▼
//! ┌──────────────────────────┐
//! │  TieredStorageManager    │
//! │  - transform pipeline    │──── PUT log / indexes / manifest ───┐
//! │  - compression heuristic │                                     │
//! └─────┬────────────────────┘                                     ▼
//!       │                                              ┌──────────────────┐
//!       │ byte range                                   │   Object store   │
//!       ▼                                              │  (S3 / GCS / …)  │
//! ┌──────────────────┐   miss   ┌──────────────┐       └──────────────────┘
//! │ FetchChunkStream │─────────▶│  ChunkCache  │             ▲
//! │ (range assembly) │          │ single-flight│── ranged ───┘
//! └──────────────────┘          │ TTL + bytes  │    GET + detransform
//!                               └──────────────┘
//! ```
//!
//! Write path: the segment is split into fixed plaintext chunks, each
//! chunk optionally compressed and sealed, and the whole body uploaded in
//! one object next to its index files and a JSON manifest recording how
//! to get the bytes back.
//!
//! Read path: the manifest (cached, single-flight) maps a plaintext byte
//! range onto chunk ordinals; each chunk is served from the cache or
//! fetched with a ranged GET and reversed through the pipeline. The
//! assembler trims the first and last block so callers see exactly the
//! bytes they asked for.
//!
//! The data model and the transforms themselves live in `tierhouse-core`.

pub mod cache;
pub mod chunk_manager;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manager;
pub mod manifest_cache;
pub mod object_key;

pub use cache::{CacheStats, CachingChunkManager, ChunkCache, ChunkKey};
pub use chunk_manager::ChunkManager;
pub use config::{ChunkCacheConfig, ManifestCacheConfig, TieredStorageConfig};
pub use error::{Error, Result};
pub use fetch::FetchChunkStream;
pub use manager::TieredStorageManager;
pub use manifest_cache::SegmentManifestProvider;
pub use object_key::{ObjectKeyFactory, ObjectKeySuffix};
