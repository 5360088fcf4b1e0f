//! Asset uploads
//!
//! An upload is two store calls: write the bytes, then ask the store for the
//! object's download URL. Either failing fails the upload; nothing is retried
//! and nothing is rolled back.

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

use super::paths::PathBuilder;
use crate::domain::{DownloadUrl, StorageKey, UploadableFile, UploadedAsset, DEFAULT_IMAGE_MIME};
use crate::storage::{ObjectStore, StoreError};

/// Errors that can occur while uploading an asset
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to write {key}: {source}")]
    Write {
        key: StorageKey,
        #[source]
        source: StoreError,
    },

    #[error("Failed to resolve download URL for {key}: {source}")]
    ResolveUrl {
        key: StorageKey,
        #[source]
        source: StoreError,
    },
}

/// Pushes bytes into the object store
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    paths: PathBuilder,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, paths: PathBuilder) -> Self {
        Self { store, paths }
    }

    /// Write `data` at `key` and return its download URL
    #[instrument(skip(self, data), fields(key = %key, size = data.len(), store = self.store.name()))]
    pub async fn upload(
        &self,
        key: &StorageKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<DownloadUrl, UploadError> {
        let size = data.len();

        if let Err(source) = self.store.put(key, data, content_type).await {
            error!(error = %source, "Upload failed");
            return Err(UploadError::Write { key: key.clone(), source });
        }

        let url = self.store.resolve_url(key).await.map_err(|source| {
            error!(error = %source, "Download URL resolution failed");
            UploadError::ResolveUrl { key: key.clone(), source }
        })?;

        info!(size, "Uploaded asset");
        Ok(url)
    }

    /// Upload a materialized file under its own MIME type
    pub async fn upload_file(&self, key: &StorageKey, file: UploadableFile) -> Result<DownloadUrl, UploadError> {
        self.upload(key, file.data, Some(&file.mime_type)).await
    }

    /// Upload a user image under `user-assets/{owner_id}/…`
    pub async fn upload_user_asset(
        &self,
        owner_id: &str,
        artifact_id: &str,
        file: UploadableFile,
    ) -> Result<UploadedAsset, UploadError> {
        let key = self.paths.user_asset_path(owner_id, artifact_id, &file.file_name);
        let url = self.upload_file(&key, file).await?;
        Ok(UploadedAsset { key, url })
    }

    /// Upload a server-generated PNG under `generated-assets/{owner_id}/…`
    pub async fn upload_generated_asset(
        &self,
        owner_id: &str,
        artifact_id: &str,
        data: Bytes,
    ) -> Result<UploadedAsset, UploadError> {
        let key = self.paths.generated_asset_path(owner_id, artifact_id);
        let url = self.upload(&key, data, Some(DEFAULT_IMAGE_MIME)).await?;
        Ok(UploadedAsset { key, url })
    }
}
