//! Storage module for image assets
//!
//! The rest of the service only talks to the [`ObjectStore`] trait, so the
//! backing bucket can be Cloudflare R2, AWS S3 or a process-local map.
//! R2 is S3-compatible, so both remote backends use the AWS SDK.

mod memory;
mod s3;
mod download_url;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageBackend, StorageSettings};
use crate::domain::{DownloadUrl, StorageKey};

pub use self::memory::MemoryObjectStore;
pub use self::s3::S3ObjectStore;
pub use self::download_url::{decode_storage_key, DownloadUrlCodec, DEFAULT_DOWNLOAD_QUERY, DEFAULT_URL_MARKER};

/// Errors reported by an object store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage not configured: {0}")]
    NotConfigured(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Minimal capability the asset helpers need from a bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Write `data` at `key`, replacing any existing object
    async fn put(
        &self,
        key: &StorageKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Canonical download URL of an existing object
    async fn resolve_url(&self, key: &StorageKey) -> Result<DownloadUrl, StoreError>;

    /// Remove the object at `key`; a missing object is `StoreError::NotFound`
    async fn delete(&self, key: &StorageKey) -> Result<(), StoreError>;
}

/// Build the configured object store
pub async fn connect(settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, StoreError> {
    let codec = DownloadUrlCodec::new(
        &settings.download_base_url,
        &settings.url_marker,
        settings.download_query.as_deref(),
    );

    let store: Arc<dyn ObjectStore> = match settings.backend {
        StorageBackend::Memory => Arc::new(MemoryObjectStore::new(codec)),
        StorageBackend::R2 => Arc::new(S3ObjectStore::r2(settings, codec)?),
        StorageBackend::S3 => Arc::new(S3ObjectStore::aws(settings, codec).await),
    };

    Ok(store)
}
