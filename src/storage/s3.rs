//! S3-compatible object store for image assets
//!
//! Backs the asset helpers with Cloudflare R2 (static credentials, custom
//! endpoint) or AWS S3 (default credential chain).
//!
//! ## Bucket layout
//! ```text
//! {bucket}/
//! ├── user-assets/
//! │   └── {owner_id}/
//! │       └── {artifact_id}_{timestamp_ms}.{ext}
//! └── generated-assets/
//!     └── {owner_id}/
//!         └── {artifact_id}_{timestamp_ms}.png
//! ```
//!
//! Download URLs are not presigned; they are built by the configured
//! [`DownloadUrlCodec`] once the object is known to exist.

use async_trait::async_trait;
use aws_sdk_s3::{
    Client as S3Client,
    config::{BehaviorVersion, Builder, Credentials, Region},
    error::{ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
};
use bytes::Bytes;
use std::fmt;
use tracing::{debug, info, instrument};

use super::{DownloadUrlCodec, ObjectStore, StoreError};
use crate::config::StorageSettings;
use crate::domain::{DownloadUrl, StorageKey};

/// [`ObjectStore`] over an S3-compatible bucket
#[derive(Clone)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    codec: DownloadUrlCodec,
}

impl S3ObjectStore {
    /// Create a Cloudflare R2 store from settings
    pub fn r2(settings: &StorageSettings, codec: DownloadUrlCodec) -> Result<Self, StoreError> {
        let account_id = required(&settings.account_id, "storage.account_id")?;
        let access_key_id = required(&settings.access_key_id, "storage.access_key_id")?;
        let secret_access_key = required(&settings.secret_access_key, "storage.secret_access_key")?;

        // R2 endpoint format: https://{account_id}.r2.cloudflarestorage.com
        let endpoint = format!("https://{}.r2.cloudflarestorage.com", account_id);

        debug!("Creating R2 client with endpoint: {}", endpoint);

        Ok(Self::with_static_credentials(
            &endpoint,
            "auto", // R2 uses "auto" region
            access_key_id,
            secret_access_key,
            &settings.bucket_name,
            codec,
        ))
    }

    /// Store over any S3-compatible endpoint with fixed credentials
    pub fn with_static_credentials(
        endpoint: &str,
        region: &str,
        access_key_id: &str,
        secret_access_key: &str,
        bucket: &str,
        codec: DownloadUrlCodec,
    ) -> Self {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None, // session token
            None, // expiry
            "static-credentials",
        );

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .force_path_style(true) // Required for R2
            .build();

        Self {
            client: S3Client::from_conf(config),
            bucket: bucket.to_string(),
            codec,
        }
    }

    /// Create an AWS S3 store using the default credential chain
    pub async fn aws(settings: &StorageSettings, codec: DownloadUrlCodec) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        debug!(bucket = %settings.bucket_name, "Created S3 client from AWS environment");

        Self {
            client: S3Client::new(&sdk_config),
            bucket: settings.bucket_name.clone(),
            codec,
        }
    }

    async fn head(&self, key: &StorageKey) -> Result<(), StoreError> {
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify_error(key, &e))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self, data), fields(bucket = %self.bucket, key = %key, size = data.len()))]
    async fn put(
        &self,
        key: &StorageKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        let size = data.len();

        let mut request = self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .body(ByteStream::from(data));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|e| classify_error(key, &e))?;

        info!("Uploaded to bucket: {} ({} bytes)", key, size);
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket, key = %key))]
    async fn resolve_url(&self, key: &StorageKey) -> Result<DownloadUrl, StoreError> {
        self.head(key).await?;
        Ok(self.codec.encode(key))
    }

    /// S3 deletes succeed for missing keys, so existence is checked first.
    /// Credentials without read access still get to delete.
    #[instrument(skip(self), fields(bucket = %self.bucket, key = %key))]
    async fn delete(&self, key: &StorageKey) -> Result<(), StoreError> {
        match self.head(key).await {
            Ok(()) => {}
            Err(StoreError::PermissionDenied(_)) => {
                debug!("HEAD denied, deleting without existence check");
            }
            Err(e) => return Err(e),
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| classify_error(key, &e))?;

        info!("Deleted from bucket: {}", key);
        Ok(())
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, StoreError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StoreError::NotConfigured(format!("{} is required", name)))
}

/// Map an SDK error onto the store error taxonomy
fn classify_error<E>(key: &StorageKey, err: &SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + fmt::Debug,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().unwrap_or_default();
    let debug_str = format!("{:?}", err);
    classify(key, status, code, &debug_str)
}

/// Error code first, then HTTP status. The debug text is only searched when
/// no response came back at all.
fn classify(key: &StorageKey, status: Option<u16>, code: &str, detail: &str) -> StoreError {
    let not_found = || StoreError::NotFound(key.to_string());
    let denied = || StoreError::PermissionDenied(format!("{}: {}", key, detail));

    match (code, status) {
        ("NoSuchKey" | "NotFound", _) => not_found(),
        ("AccessDenied" | "Forbidden", _) => denied(),
        (_, Some(404)) => not_found(),
        (_, Some(403)) => denied(),
        (_, None) if detail.contains("NoSuchKey") => not_found(),
        (_, None) if detail.contains("AccessDenied") => denied(),
        _ => StoreError::Backend(format!("{}: {}", key, detail)),
    }
}
