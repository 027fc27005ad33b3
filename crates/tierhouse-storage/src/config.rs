//! Plug-in configuration.
//!
//! Read once at startup into immutable structs and passed by reference;
//! nothing here mutates after configure.
//!
//! ## TieredStorageConfig
//!
//! Controls the write-path transforms and the object-key namespace:
//!
//! - **chunk_size**: plaintext block size for the chunk transform
//!   (default: 4 MiB)
//! - **compression_enabled**: compress chunks on upload
//! - **compression_heuristic_enabled**: skip compression when the first
//!   record batch already declares a codec
//! - **encryption_enabled** + **encryption_{public,private}_key_file**:
//!   envelope-encrypt chunks under the configured RSA key pair
//! - **key_prefix**: prefix for every object key written by the plug-in
//!
//! ## Cache bounds
//!
//! Both cache configs follow the convention that `-1` disables the
//! corresponding limit:
//!
//! - **chunk_cache.size**: maximum total cached plaintext bytes
//! - **chunk_cache.retention_ms**: evict entries this long after insert
//! - **chunk_cache.path**: when set, payloads spill to files under this
//!   directory instead of living in memory
//! - **manifest_cache.size** / **manifest_cache.retention_ms**: entry
//!   count and TTL for parsed manifests
//!
//! ## Usage
//!
//! ```ignore
//! use tierhouse_storage::{ChunkCacheConfig, TieredStorageConfig};
//!
//! // production: compressed uploads, 1 GiB disk-backed chunk cache
//! let config = TieredStorageConfig {
//!     compression_enabled: true,
//!     key_prefix: "tiered".to_string(),
//!     chunk_cache: ChunkCacheConfig {
//!         size: 1024 * 1024 * 1024,
//!         retention_ms: 10 * 60 * 1000,
//!         path: Some("/var/cache/tierhouse".into()),
//!     },
//!     ..Default::default()
//! };
//! config.validate()?;
//!
//! // tests: tiny chunks, unbounded in-memory caches
//! let config = TieredStorageConfig {
//!     chunk_size: 10,
//!     ..Default::default()
//! };
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieredStorageConfig {
    /// Plaintext block size for the chunk transform (default: 4 MiB).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Compress segments on upload.
    #[serde(default)]
    pub compression_enabled: bool,

    /// Skip compression when the first record batch already declares a
    /// compression codec.
    #[serde(default)]
    pub compression_heuristic_enabled: bool,

    /// Envelope-encrypt segments on upload.
    #[serde(default)]
    pub encryption_enabled: bool,

    /// PEM file with the RSA public key (required when encryption is on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_public_key_file: Option<PathBuf>,

    /// PEM file with the RSA private key (required when encryption is on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_private_key_file: Option<PathBuf>,

    /// Prefix for every object key written by this plug-in.
    #[serde(default)]
    pub key_prefix: String,

    #[serde(default)]
    pub chunk_cache: ChunkCacheConfig,

    #[serde(default)]
    pub manifest_cache: ManifestCacheConfig,
}

impl Default for TieredStorageConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            compression_enabled: false,
            compression_heuristic_enabled: false,
            encryption_enabled: false,
            encryption_public_key_file: None,
            encryption_private_key_file: None,
            key_prefix: String::new(),
            chunk_cache: ChunkCacheConfig::default(),
            manifest_cache: ManifestCacheConfig::default(),
        }
    }
}

impl TieredStorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".to_string()));
        }
        if self.encryption_enabled
            && (self.encryption_public_key_file.is_none()
                || self.encryption_private_key_file.is_none())
        {
            return Err(Error::Config(
                "encryption enabled but key files not configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bounds for the chunk fetch cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCacheConfig {
    /// Maximum total cached plaintext bytes; `-1` disables the bound.
    #[serde(default = "unbounded")]
    pub size: i64,

    /// Evict entries this many milliseconds after insertion; `-1`
    /// disables time-based expiry.
    #[serde(default = "unbounded")]
    pub retention_ms: i64,

    /// When set, cached payloads are materialized as files under this
    /// directory instead of being held in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for ChunkCacheConfig {
    fn default() -> Self {
        Self {
            size: unbounded(),
            retention_ms: unbounded(),
            path: None,
        }
    }
}

/// Bounds for the parsed-manifest cache. `size` counts entries, not
/// bytes; manifests are small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestCacheConfig {
    #[serde(default = "default_manifest_cache_size")]
    pub size: i64,

    #[serde(default = "default_manifest_cache_retention_ms")]
    pub retention_ms: i64,
}

impl Default for ManifestCacheConfig {
    fn default() -> Self {
        Self {
            size: default_manifest_cache_size(),
            retention_ms: default_manifest_cache_retention_ms(),
        }
    }
}

fn default_chunk_size() -> u32 {
    4 * 1024 * 1024
}

fn unbounded() -> i64 {
    -1
}

fn default_manifest_cache_size() -> i64 {
    1000
}

fn default_manifest_cache_retention_ms() -> i64 {
    60 * 60 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = TieredStorageConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunk_size, 4 * 1024 * 1024);
        assert_eq!(config.chunk_cache.size, -1);
        assert_eq!(config.manifest_cache.size, 1000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: TieredStorageConfig = serde_json::from_str(
            r#"{"chunk_size": 1024, "chunk_cache": {"size": 4096}}"#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.chunk_cache.size, 4096);
        assert_eq!(config.chunk_cache.retention_ms, -1);
        assert!(!config.compression_enabled);
    }

    #[test]
    fn encryption_requires_key_files() {
        let config = TieredStorageConfig {
            encryption_enabled: true,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = TieredStorageConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
