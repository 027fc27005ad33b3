//! Error types for the storage layer.
//!
//! Object-store failures are split into transient and permanent at the
//! boundary, so the host can decide what to retry without parsing
//! messages. Retry logic itself never lives here.

use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Object-store failure the host may reasonably retry.
    #[error("transient object store failure: {0}")]
    BackendTransient(#[source] object_store::Error),

    /// Object-store failure retrying will not fix (missing object,
    /// rejected credentials, bad key).
    #[error("permanent object store failure: {0}")]
    BackendPermanent(#[source] object_store::Error),

    #[error(transparent)]
    Core(#[from] tierhouse_core::Error),

    #[error("failed to parse segment manifest: {0}")]
    ManifestParse(String),

    #[error("unknown segment manifest version: {0}")]
    ManifestVersionUnknown(String),

    /// A failure raised while materializing a cache entry on behalf of
    /// several waiters; the shared underlying cause is preserved.
    #[error("chunk load failed: {0}")]
    CacheLoad(Arc<Error>),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<object_store::Error> for Error {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { .. }
            | object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. }
            | object_store::Error::InvalidPath { .. } => Error::BackendPermanent(e),
            _ => Error::BackendTransient(e),
        }
    }
}

impl Error {
    /// Whether the host may reasonably retry the failed operation.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::BackendTransient(_) => true,
            Error::CacheLoad(cause) => cause.is_transient(),
            _ => false,
        }
    }
}
