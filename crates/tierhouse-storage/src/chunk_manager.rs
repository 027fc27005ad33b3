//! Fetches one transformed chunk from the object store and reverses its
//! transforms.
//!
//! The chunk index pins every chunk to an exact byte range of the log
//! object, so a single ranged GET plus the reverse pipeline (dechunk,
//! decrypt, decompress) recovers exactly one plaintext block. This is the
//! supplier behind every chunk-cache miss.

use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path;
use object_store::ObjectStore;
use tierhouse_core::security::{RsaKeyRing, SegmentCipher};
use tierhouse_core::transform::{
    BaseDechunker, DecompressionTransform, DecryptionTransform, DetransformStream,
};
use tierhouse_core::{SegmentManifest, SegmentMetadata};

use crate::error::{Error, Result};
use crate::object_key::{ObjectKeyFactory, ObjectKeySuffix};

pub struct ChunkManager {
    store: Arc<dyn ObjectStore>,
    keys: ObjectKeyFactory,
    keyring: Option<Arc<RsaKeyRing>>,
}

impl ChunkManager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        keys: ObjectKeyFactory,
        keyring: Option<Arc<RsaKeyRing>>,
    ) -> Self {
        Self {
            store,
            keys,
            keyring,
        }
    }

    /// The log object key for `meta`, which also identifies the segment
    /// in cache keys.
    pub fn log_key(&self, meta: &SegmentMetadata) -> String {
        self.keys.key(meta, ObjectKeySuffix::Log)
    }

    /// Fetches chunk `ordinal` of the segment and returns its plaintext
    /// bytes.
    pub async fn get_chunk(
        &self,
        meta: &SegmentMetadata,
        manifest: &SegmentManifest,
        ordinal: u32,
    ) -> Result<Bytes> {
        let index = manifest.chunk_index();
        let chunk = index
            .get(ordinal)
            .ok_or(tierhouse_core::Error::ChunkOutOfRange {
                ordinal,
                count: index.count(),
            })?;

        let key = self.log_key(meta);
        let path = Path::from(key.as_str());
        let from = chunk.transformed_from as usize;
        let to = from + chunk.transformed_size as usize;
        let sealed = self.store.get_range(&path, from..to).await?;
        tracing::debug!(
            key = %key,
            ordinal,
            from,
            len = sealed.len(),
            "Fetched chunk range"
        );

        let mut stream: Box<dyn DetransformStream> =
            Box::new(BaseDechunker::new(sealed, vec![chunk]));
        if let Some(encryption) = manifest.encryption() {
            let keyring = self.keyring.as_ref().ok_or_else(|| {
                Error::Config("segment is encrypted but no key ring is configured".to_string())
            })?;
            let data_key = keyring.unwrap_data_key(&encryption.data_key)?;
            let cipher = SegmentCipher::new(&data_key, &encryption.aad)?;
            stream = Box::new(DecryptionTransform::new(stream, cipher));
        }
        if manifest.compression() {
            stream = Box::new(DecompressionTransform::new(stream));
        }

        stream
            .next_chunk()
            .map_err(Error::from)?
            .ok_or_else(|| Error::Internal("detransform stream produced no block".to_string()))
    }
}
