//! Chunk fetch cache with single-flight materialization.
//!
//! ## Why Caching?
//!
//! Random reads of a tiered segment land on individual chunks, and the
//! same hot chunks get requested by many consumers at once. Without a
//! cache every read pays an object-store round trip; without
//! single-flight a popular chunk gets fetched N times on a cold start.
//!
//! ## How It Works
//!
//! ```text
//! fetch(key)
//!     ↓
//! Present? ──YES──→ fresh view over cached bytes (<1ms)
//!     │
//!     NO
//!     ↓
//! Loading? ──YES──→ join the in-flight load, share its result
//!     │
//!     NO
//!     ↓
//! run the supplier once (ranged GET + decrypt + decompress)
//!     ↓
//! memory payload, or a file under the cache path
//!     ↓
//! evict by TTL / total payload bytes when bounded
//! ```
//!
//! Failures are never cached: a failed load removes the entry, so the
//! next caller retries the supplier. Every `fetch` returns bytes that are
//! positioned independently of any other caller.
//!
//! ## Eviction
//!
//! An entry leaves the cache for one of four recorded causes:
//!
//! - **Expired**: older than `retention_ms`
//! - **Size**: total payload bytes exceeded `size`, coldest entries go
//!   first
//! - **Explicit**: `invalidate` was called
//! - **Replaced**: a newer payload was inserted under the same key
//!
//! Disk-backed payloads have their file deleted on eviction,
//! best-effort; a failed delete is logged and ignored.
//!
//! ## Usage
//!
//! ```ignore
//! use tierhouse_storage::{ChunkCache, ChunkCacheConfig, ChunkKey};
//!
//! let cache = ChunkCache::new(&ChunkCacheConfig {
//!     size: 256 * 1024 * 1024,
//!     retention_ms: 10 * 60 * 1000,
//!     path: None,
//! })?;
//!
//! let key = ChunkKey { segment_key: log_key, ordinal: 0 };
//! let bytes = cache
//!     .fetch(key, async move { chunk_manager.get_chunk(&meta, &manifest, 0).await })
//!     .await?;
//!
//! let stats = cache.stats();
//! println!("hits={} misses={}", stats.hits, stats.misses);
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use moka::future::Cache;
use moka::notification::RemovalCause;
use sha2::{Digest, Sha256};
use tierhouse_core::{SegmentManifest, SegmentMetadata};

use crate::chunk_manager::ChunkManager;
use crate::config::ChunkCacheConfig;
use crate::error::{Error, Result};

/// Cache key: the segment's log object key plus the chunk ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub segment_key: String,
    pub ordinal: u32,
}

impl ChunkKey {
    /// Deterministic file name for disk-backed payloads.
    fn file_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.segment_key.as_bytes());
        hasher.update(self.ordinal.to_be_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.segment_key, self.ordinal)
    }
}

/// Where a cached plaintext payload lives.
#[derive(Debug, Clone)]
enum CachedPayload {
    Memory(Bytes),
    Disk { path: PathBuf, len: u64 },
}

impl CachedPayload {
    fn len(&self) -> u64 {
        match self {
            CachedPayload::Memory(bytes) => bytes.len() as u64,
            CachedPayload::Disk { len, .. } => *len,
        }
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
    evictions_expired: AtomicU64,
    evictions_size: AtomicU64,
    evictions_explicit: AtomicU64,
    evictions_replaced: AtomicU64,
}

impl CacheCounters {
    fn record_eviction(&self, cause: RemovalCause) {
        let counter = match cause {
            RemovalCause::Expired => &self.evictions_expired,
            RemovalCause::Size => &self.evictions_size,
            RemovalCause::Explicit => &self.evictions_explicit,
            RemovalCause::Replaced => &self.evictions_replaced,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub load_successes: u64,
    pub load_failures: u64,
    pub evictions_expired: u64,
    pub evictions_size: u64,
    pub evictions_explicit: u64,
    pub evictions_replaced: u64,
}

/// Bounded, time-expiring cache of plaintext chunk payloads.
pub struct ChunkCache {
    cache: Cache<ChunkKey, CachedPayload>,
    disk_root: Option<PathBuf>,
    stats: Arc<CacheCounters>,
}

impl ChunkCache {
    pub fn new(config: &ChunkCacheConfig) -> Result<Self> {
        let disk_root = config.path.clone();
        if let Some(root) = &disk_root {
            std::fs::create_dir_all(root).map_err(tierhouse_core::Error::Io)?;
        }

        let stats = Arc::new(CacheCounters::default());
        let listener_stats = stats.clone();
        let mut builder = Cache::builder().eviction_listener(
            move |key: Arc<ChunkKey>, payload: CachedPayload, cause| {
                listener_stats.record_eviction(cause);
                if let CachedPayload::Disk { path, .. } = payload {
                    if let Err(e) = std::fs::remove_file(&path) {
                        tracing::warn!(
                            key = %key,
                            error = %e,
                            "Failed to delete cached chunk file"
                        );
                    }
                }
                tracing::debug!(key = %key, ?cause, "Evicted cached chunk");
            },
        );
        if config.size >= 0 {
            builder = builder
                .max_capacity(config.size as u64)
                .weigher(|_key, payload: &CachedPayload| {
                    payload.len().min(u32::MAX as u64) as u32
                });
        }
        if config.retention_ms >= 0 {
            builder = builder.time_to_live(Duration::from_millis(config.retention_ms as u64));
        }

        Ok(Self {
            cache: builder.build(),
            disk_root,
            stats,
        })
    }

    /// Returns the plaintext bytes for `key`, running `load` at most once
    /// across all concurrent callers of the same key.
    ///
    /// The returned `Bytes` is an independent view; handing it to one
    /// caller never advances another caller's position. The load itself
    /// runs as a detached task, so a caller that gives up waiting does
    /// not abandon work other callers can still use.
    pub async fn fetch<F>(&self, key: ChunkKey, load: F) -> Result<Bytes>
    where
        F: std::future::Future<Output = Result<Bytes>> + Send + 'static,
    {
        if let Some(payload) = self.cache.get(&key).await {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return self.read_payload(&payload).await;
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let disk_target = self
            .disk_root
            .as_ref()
            .map(|root| root.join(key.file_name()));
        let stats = self.stats.clone();
        let payload = self
            .cache
            .try_get_with(key, async move {
                let task = tokio::spawn(Self::materialize(disk_target, stats, load));
                match task.await {
                    Ok(result) => result,
                    Err(e) => Err(Error::Internal(format!("chunk load task failed: {e}"))),
                }
            })
            .await
            .map_err(|e: Arc<Error>| match Arc::try_unwrap(e) {
                Ok(err) => err,
                Err(shared) => Error::CacheLoad(shared),
            })?;
        self.read_payload(&payload).await
    }

    async fn materialize<F>(
        disk_target: Option<PathBuf>,
        stats: Arc<CacheCounters>,
        load: F,
    ) -> Result<CachedPayload>
    where
        F: std::future::Future<Output = Result<Bytes>> + Send,
    {
        let bytes = match load.await {
            Ok(bytes) => bytes,
            Err(e) => {
                stats.load_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        stats.load_successes.fetch_add(1, Ordering::Relaxed);
        match disk_target {
            None => Ok(CachedPayload::Memory(bytes)),
            Some(path) => {
                let len = bytes.len() as u64;
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(tierhouse_core::Error::Io)?;
                Ok(CachedPayload::Disk { path, len })
            }
        }
    }

    async fn read_payload(&self, payload: &CachedPayload) -> Result<Bytes> {
        match payload {
            CachedPayload::Memory(bytes) => Ok(bytes.clone()),
            CachedPayload::Disk { path, .. } => Ok(Bytes::from(
                tokio::fs::read(path)
                    .await
                    .map_err(tierhouse_core::Error::Io)?,
            )),
        }
    }

    /// Drops one entry; the eviction is recorded as explicit.
    pub async fn invalidate(&self, key: &ChunkKey) {
        self.cache.invalidate(key).await;
    }

    /// Processes pending maintenance: expired entries are dropped, the
    /// size bound is enforced, and eviction callbacks run. Expiry is
    /// otherwise lazy, so periodic sweeping is optional.
    pub async fn sweep(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Drops every entry and removes any files left under the cache
    /// directory. Called on orderly shutdown.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        if let Some(root) = &self.disk_root {
            if let Ok(entries) = std::fs::read_dir(root) {
                for entry in entries.flatten() {
                    if let Err(e) = std::fs::remove_file(entry.path()) {
                        tracing::warn!(
                            path = %entry.path().display(),
                            error = %e,
                            "Failed to delete cached chunk file"
                        );
                    }
                }
            }
        }
    }

    /// Total weight of live entries, in payload bytes.
    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            load_successes: self.stats.load_successes.load(Ordering::Relaxed),
            load_failures: self.stats.load_failures.load(Ordering::Relaxed),
            evictions_expired: self.stats.evictions_expired.load(Ordering::Relaxed),
            evictions_size: self.stats.evictions_size.load(Ordering::Relaxed),
            evictions_explicit: self.stats.evictions_explicit.load(Ordering::Relaxed),
            evictions_replaced: self.stats.evictions_replaced.load(Ordering::Relaxed),
        }
    }
}

/// A [`ChunkManager`] front that serves chunk payloads through the cache
/// and can warm it in the background.
#[derive(Clone)]
pub struct CachingChunkManager {
    inner: Arc<ChunkManager>,
    cache: Arc<ChunkCache>,
}

impl CachingChunkManager {
    pub fn new(inner: Arc<ChunkManager>, cache: Arc<ChunkCache>) -> Self {
        Self { inner, cache }
    }

    /// Plaintext bytes of one chunk, cache-aware and single-flight.
    pub async fn get_chunk(
        &self,
        meta: &SegmentMetadata,
        manifest: &Arc<SegmentManifest>,
        ordinal: u32,
    ) -> Result<Bytes> {
        let key = ChunkKey {
            segment_key: self.inner.log_key(meta),
            ordinal,
        };
        let inner = self.inner.clone();
        let meta = meta.clone();
        let manifest = manifest.clone();
        self.cache
            .fetch(key, async move {
                inner.get_chunk(&meta, &manifest, ordinal).await
            })
            .await
    }

    /// Schedules background materialization of the given chunks without
    /// blocking; completion is observable through `get_chunk`.
    pub fn prepare(
        &self,
        meta: &SegmentMetadata,
        manifest: &Arc<SegmentManifest>,
        ordinals: impl IntoIterator<Item = u32>,
    ) {
        for ordinal in ordinals {
            let this = self.clone();
            let meta = meta.clone();
            let manifest = manifest.clone();
            tokio::spawn(async move {
                if let Err(e) = this.get_chunk(&meta, &manifest, ordinal).await {
                    tracing::warn!(
                        segment = %meta.topic,
                        partition = meta.partition,
                        ordinal,
                        error = %e,
                        "Chunk prefetch failed"
                    );
                }
            });
        }
    }

    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }
}
