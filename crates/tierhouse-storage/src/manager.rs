//! The host-facing remote storage adapter.
//!
//! This is the plug-in's public surface: the host hands over finished
//! segments with their index files, later asks for positional reads and
//! index bytes, and eventually tells us to delete everything a segment
//! owns. All coordination below (transform pipeline, manifest provider,
//! chunk cache) hangs off this type.
//!
//! ## Architecture
//!
//! ```text
//! copy_log_segment          fetch_log_segment
//!     │                          │
//!     ▼                          ▼
//! chunk ─ compress? ─ encrypt  manifest provider (cached)
//!     │                          │
//!     ▼                          ▼
//! PUT log + indexes + manifest   range assembler ─ chunk cache ─ ranged GET
//! ```
//!
//! ## Operations
//!
//! - **copy_log_segment**: transform + upload log, index files, manifest
//! - **fetch_log_segment** / **fetch_log_segment_range**: positional
//!   plaintext reads as a lazy stream
//! - **fetch_index**: raw index bytes; a missing TRANSACTION index is
//!   `None`, any other missing index is an error
//! - **delete_log_segment_data**: removes every object the segment owns
//! - **close**: logs final cache stats, clears cached chunk files
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use object_store::aws::AmazonS3Builder;
//! use tierhouse_storage::{TieredStorageConfig, TieredStorageManager};
//!
//! let store = Arc::new(AmazonS3Builder::new().build()?);
//! let manager = TieredStorageManager::new(TieredStorageConfig::default(), store)?;
//!
//! // offload a finished segment
//! manager.copy_log_segment(&meta, &segment_data).await?;
//!
//! // serve a positional read back out of it
//! let stream = manager.fetch_log_segment_range(&meta, 5, 14).await?;
//! let bytes = stream.read_to_end().await?;
//! ```

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path;
use object_store::ObjectStore;
use tierhouse_core::batch;
use tierhouse_core::security::{DataKeyAndAad, RsaKeyRing, SegmentCipher};
use tierhouse_core::transform::{
    BaseChunker, CompressionTransform, EncryptionTransform, TransformFinisher, TransformStream,
};
use tierhouse_core::{
    BytesRange, IndexType, SegmentData, SegmentEncryptionMetadata, SegmentManifest,
    SegmentManifestV1, SegmentMetadata,
};
use tracing::{info, warn};

use crate::cache::{CacheStats, CachingChunkManager, ChunkCache};
use crate::chunk_manager::ChunkManager;
use crate::config::TieredStorageConfig;
use crate::error::{Error, Result};
use crate::fetch::FetchChunkStream;
use crate::manifest_cache::SegmentManifestProvider;
use crate::object_key::{ObjectKeyFactory, ObjectKeySuffix};

pub struct TieredStorageManager {
    config: TieredStorageConfig,
    store: Arc<dyn ObjectStore>,
    keys: ObjectKeyFactory,
    keyring: Option<Arc<RsaKeyRing>>,
    chunks: CachingChunkManager,
    manifests: SegmentManifestProvider,
}

impl TieredStorageManager {
    pub fn new(config: TieredStorageConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        config.validate()?;
        let keys = ObjectKeyFactory::new(config.key_prefix.clone());

        let keyring = if config.encryption_enabled {
            // validate() guarantees both paths are present
            let public = config.encryption_public_key_file.as_ref().ok_or_else(|| {
                Error::Config("encryption public key file not configured".to_string())
            })?;
            let private = config.encryption_private_key_file.as_ref().ok_or_else(|| {
                Error::Config("encryption private key file not configured".to_string())
            })?;
            Some(Arc::new(RsaKeyRing::from_pem_files(public, private)?))
        } else {
            None
        };

        let chunk_manager = Arc::new(ChunkManager::new(
            store.clone(),
            keys.clone(),
            keyring.clone(),
        ));
        let chunk_cache = Arc::new(ChunkCache::new(&config.chunk_cache)?);
        let chunks = CachingChunkManager::new(chunk_manager, chunk_cache);
        let manifests =
            SegmentManifestProvider::new(store.clone(), keys.clone(), &config.manifest_cache);

        Ok(Self {
            config,
            store,
            keys,
            keyring,
            chunks,
            manifests,
        })
    }

    /// Uploads the transformed log, every present index file, and the
    /// manifest describing the transforms.
    pub async fn copy_log_segment(
        &self,
        meta: &SegmentMetadata,
        data: &SegmentData,
    ) -> Result<()> {
        let requires_compression = self.requires_compression(&data.log);

        let mut stream: Box<dyn TransformStream> = Box::new(BaseChunker::new(
            Cursor::new(data.log.clone()),
            self.config.chunk_size,
        ));
        if requires_compression {
            stream = Box::new(CompressionTransform::new(stream));
        }
        let mut encryption = None;
        if let Some(keyring) = &self.keyring {
            let data_key = DataKeyAndAad::generate();
            let cipher = SegmentCipher::new(&data_key.key, &data_key.aad)?;
            stream = Box::new(EncryptionTransform::new(stream, cipher));
            encryption = Some(SegmentEncryptionMetadata {
                data_key: keyring.wrap_data_key(&data_key.key)?,
                aad: data_key.aad.clone(),
            });
        }

        let finisher = TransformFinisher::new(stream, data.log.len() as u64);
        let (body, chunk_index) = finisher.complete()?;
        let uploaded_size = body.len();
        self.put(meta, ObjectKeySuffix::Log, body).await?;

        let index_uploads = data.indexes().into_iter().map(|(index_type, bytes)| {
            let size = bytes.len() as u64;
            let bytes = bytes.clone();
            async move {
                self.put(meta, ObjectKeySuffix::from_index_type(index_type), bytes)
                    .await?;
                Ok::<_, Error>((index_type, size))
            }
        });
        let index_sizes: BTreeMap<IndexType, u64> = futures::future::try_join_all(index_uploads)
            .await?
            .into_iter()
            .collect();

        let manifest = SegmentManifest::V1(SegmentManifestV1 {
            chunk_index,
            compression: requires_compression,
            encryption,
            segment_indexes: Some(index_sizes),
        });
        let manifest_json = manifest.to_json()?;
        self.put(meta, ObjectKeySuffix::Manifest, Bytes::from(manifest_json))
            .await?;

        info!(
            topic = %meta.topic,
            partition = meta.partition,
            base_offset = meta.base_offset,
            original_size = data.log.len(),
            uploaded_size,
            compression = requires_compression,
            encryption = self.keyring.is_some(),
            "Copied log segment"
        );
        Ok(())
    }

    /// Streams plaintext bytes from `start` to the end of the segment.
    pub async fn fetch_log_segment(
        &self,
        meta: &SegmentMetadata,
        start: u64,
    ) -> Result<FetchChunkStream> {
        self.fetch_log_segment_range(meta, start, meta.size.saturating_sub(1))
            .await
    }

    /// Streams plaintext bytes for `[start, end]`, with `end` clamped to
    /// the last byte of the segment.
    pub async fn fetch_log_segment_range(
        &self,
        meta: &SegmentMetadata,
        start: u64,
        end: u64,
    ) -> Result<FetchChunkStream> {
        if start >= meta.size || end < start {
            return Err(tierhouse_core::Error::OffsetOutOfRange {
                offset: start,
                total: meta.size,
            }
            .into());
        }
        let range = BytesRange::new(start, end.min(meta.size - 1));

        let manifest = self.manifests.get(meta).await?;
        let stream =
            FetchChunkStream::new(self.chunks.clone(), meta.clone(), manifest.clone(), range)?;

        // warm the rest of the range while the caller reads the first chunk
        if stream.last_ordinal() > stream.first_ordinal() {
            self.chunks.prepare(
                meta,
                &manifest,
                stream.first_ordinal() + 1..=stream.last_ordinal(),
            );
        }
        Ok(stream)
    }

    /// Returns the raw bytes of an index file.
    ///
    /// A missing TRANSACTION index yields `Ok(None)` because segments
    /// without aborted transactions never upload one; any other missing
    /// index is a permanent backend error.
    pub async fn fetch_index(
        &self,
        meta: &SegmentMetadata,
        index_type: IndexType,
    ) -> Result<Option<Bytes>> {
        let key = self.keys.key(meta, ObjectKeySuffix::from_index_type(index_type));
        match self.store.get(&Path::from(key.as_str())).await {
            Ok(result) => Ok(Some(result.bytes().await.map_err(Error::from)?)),
            Err(object_store::Error::NotFound { .. })
                if index_type == IndexType::Transaction =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every object the segment owns. Objects that were never
    /// uploaded (an absent transaction index) are skipped silently.
    pub async fn delete_log_segment_data(&self, meta: &SegmentMetadata) -> Result<()> {
        for suffix in ObjectKeySuffix::ALL {
            let key = self.keys.key(meta, suffix);
            match self.store.delete(&Path::from(key.as_str())).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(
            topic = %meta.topic,
            partition = meta.partition,
            base_offset = meta.base_offset,
            "Deleted log segment data"
        );
        Ok(())
    }

    /// Counter snapshot of the chunk cache.
    pub fn chunk_cache_stats(&self) -> CacheStats {
        self.chunks.cache().stats()
    }

    /// Flushes final stats to the log and releases cached resources,
    /// including any chunk files on disk.
    pub async fn close(&self) {
        let stats = self.chunk_cache_stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            load_failures = stats.load_failures,
            "Closing tiered storage manager"
        );
        self.chunks.cache().clear().await;
    }

    fn requires_compression(&self, log: &[u8]) -> bool {
        if !self.config.compression_enabled {
            return false;
        }
        if !self.config.compression_heuristic_enabled {
            return true;
        }
        match batch::first_batch_is_compressed(log) {
            Ok(already_compressed) => !already_compressed,
            Err(e) => {
                warn!(error = %e, "Failed to sniff segment compression; uploading uncompressed");
                false
            }
        }
    }

    async fn put(
        &self,
        meta: &SegmentMetadata,
        suffix: ObjectKeySuffix,
        body: Bytes,
    ) -> Result<()> {
        let key = self.keys.key(meta, suffix);
        self.store
            .put(&Path::from(key.as_str()), body.into())
            .await?;
        Ok(())
    }
}
