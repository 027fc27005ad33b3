//! The segment manifest: a JSON sidecar uploaded next to every segment,
//! describing how it was chunked and transformed.
//!
//! ## Wire Format
//!
//! Stable JSON, versioned by a `type` tag. Parsers must treat an unknown
//! version tag as a hard error rather than guessing. A v1 document:
//!
//! ```text
//! {"type":"v1",
//!  "chunkIndex":{"type":"fixed","originalChunkSize":10,...},
//!  "compression":false,
//!  "encryption":{"dataKey":"<base64>","aad":"<base64>"},
//!  "segmentIndexes":{"OFFSET":16,"TIMESTAMP":24,...}}
//! ```
//!
//! - **chunkIndex**: fixed or variable chunk geometry (see
//!   [`crate::index`])
//! - **compression**: whether chunks were compressed on upload
//! - **encryption**: wrapped data key + AAD; absent on plaintext
//!   segments, omitted rather than null
//! - **segmentIndexes**: byte size of each uploaded index file; absent
//!   on manifests written before index sizes were recorded
//!
//! Binary fields (the wrapped data key and the AAD) are base64 strings.
//!
//! ## Usage
//!
//! ```ignore
//! use tierhouse_core::{SegmentManifest, SegmentManifestV1};
//!
//! let manifest = SegmentManifest::V1(SegmentManifestV1 {
//!     chunk_index,
//!     compression: true,
//!     encryption: None,
//!     segment_indexes: Some(index_sizes),
//! });
//!
//! // upload next to the segment
//! let body = manifest.to_json()?;
//!
//! // and read it back on the fetch path
//! let parsed = SegmentManifest::from_json(&body)?;
//! assert!(parsed.compression());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::ChunkIndex;
use crate::segment::IndexType;

pub const MANIFEST_VERSION_V1: &str = "v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SegmentManifest {
    #[serde(rename = "v1")]
    V1(SegmentManifestV1),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentManifestV1 {
    pub chunk_index: ChunkIndex,
    pub compression: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<SegmentEncryptionMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_indexes: Option<BTreeMap<IndexType, u64>>,
}

/// Envelope-encryption material for one segment.
///
/// `data_key` is the AES data key wrapped under the configured public
/// key; `aad` is bound into every chunk's authentication tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentEncryptionMetadata {
    #[serde(with = "base64_bytes")]
    pub data_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub aad: Vec<u8>,
}

impl SegmentManifest {
    pub fn chunk_index(&self) -> &ChunkIndex {
        match self {
            SegmentManifest::V1(m) => &m.chunk_index,
        }
    }

    pub fn compression(&self) -> bool {
        match self {
            SegmentManifest::V1(m) => m.compression,
        }
    }

    pub fn encryption(&self) -> Option<&SegmentEncryptionMetadata> {
        match self {
            SegmentManifest::V1(m) => m.encryption.as_ref(),
        }
    }

    pub fn segment_indexes(&self) -> Option<&BTreeMap<IndexType, u64>> {
        match self {
            SegmentManifest::V1(m) => m.segment_indexes.as_ref(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}
