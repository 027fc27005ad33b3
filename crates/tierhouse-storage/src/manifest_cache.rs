//! Bounded, time-expiring provider of parsed segment manifests.
//!
//! Keyed by the manifest object key. Concurrent requests for the same
//! missing key share one fetch+parse; failures are never cached, so the
//! next call retries against the store.
//!
//! ## Failure Modes
//!
//! - **BackendTransient / BackendPermanent**: the GET itself failed
//! - **ManifestParse**: malformed JSON, or a chunk index that is
//!   internally inconsistent
//! - **ManifestVersionUnknown**: a well-formed document with a version
//!   tag this build does not know
//!
//! ## Usage
//!
//! ```ignore
//! use tierhouse_storage::{ManifestCacheConfig, SegmentManifestProvider};
//!
//! let provider = SegmentManifestProvider::new(store, keys, &ManifestCacheConfig::default());
//!
//! // one fetch+parse per segment, shared by concurrent readers
//! let manifest = provider.get(&meta).await?;
//! let chunk = manifest.chunk_index().find_chunk_for_original_offset(0)?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use object_store::path::Path;
use object_store::ObjectStore;
use tierhouse_core::manifest::MANIFEST_VERSION_V1;
use tierhouse_core::{SegmentManifest, SegmentMetadata};

use crate::config::ManifestCacheConfig;
use crate::error::{Error, Result};
use crate::object_key::{ObjectKeyFactory, ObjectKeySuffix};

pub struct SegmentManifestProvider {
    store: Arc<dyn ObjectStore>,
    keys: ObjectKeyFactory,
    cache: Cache<String, Arc<SegmentManifest>>,
}

impl SegmentManifestProvider {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        keys: ObjectKeyFactory,
        config: &ManifestCacheConfig,
    ) -> Self {
        let mut builder = Cache::builder();
        if config.size >= 0 {
            builder = builder.max_capacity(config.size as u64);
        }
        if config.retention_ms >= 0 {
            builder = builder.time_to_live(Duration::from_millis(config.retention_ms as u64));
        }
        Self {
            store,
            keys,
            cache: builder.build(),
        }
    }

    /// Returns the parsed manifest for `meta`, fetching it at most once
    /// per cache entry lifetime.
    pub async fn get(&self, meta: &SegmentMetadata) -> Result<Arc<SegmentManifest>> {
        let key = self.keys.key(meta, ObjectKeySuffix::Manifest);
        self.cache
            .try_get_with(key.clone(), async {
                let path = Path::from(key.as_str());
                let body = self
                    .store
                    .get(&path)
                    .await
                    .map_err(Error::from)?
                    .bytes()
                    .await
                    .map_err(Error::from)?;
                let manifest = parse_manifest(&body)?;
                tracing::debug!(key = %key, "Loaded segment manifest");
                Ok(Arc::new(manifest))
            })
            .await
            .map_err(|e: Arc<Error>| match Arc::try_unwrap(e) {
                Ok(err) => err,
                Err(shared) => Error::CacheLoad(shared),
            })
    }

    /// Drops any cached manifest for `meta`; the next `get` refetches.
    pub async fn invalidate(&self, meta: &SegmentMetadata) {
        let key = self.keys.key(meta, ObjectKeySuffix::Manifest);
        self.cache.invalidate(&key).await;
    }
}

/// Parses manifest JSON, distinguishing an unknown version tag from a
/// malformed document, and rejects indexes that are internally
/// inconsistent.
fn parse_manifest(body: &[u8]) -> Result<SegmentManifest> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Error::ManifestParse(e.to_string()))?;
    match value.get("type").and_then(serde_json::Value::as_str) {
        Some(MANIFEST_VERSION_V1) => {
            let manifest: SegmentManifest = serde_json::from_value(value)
                .map_err(|e| Error::ManifestParse(e.to_string()))?;
            manifest
                .chunk_index()
                .validate()
                .map_err(|e| Error::ManifestParse(e.to_string()))?;
            Ok(manifest)
        }
        Some(version) => Err(Error::ManifestVersionUnknown(version.to_string())),
        None => Err(Error::ManifestParse("missing version tag".to_string())),
    }
}
