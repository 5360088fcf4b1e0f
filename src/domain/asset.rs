//! Asset value types
//!
//! Everything here is a transient value: the object store is the only owner
//! of uploaded bytes, these types just carry keys, URLs and payloads between
//! the path builder, the uploader and the deleter.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default MIME type for blobs that report none
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Top-level namespace an asset is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    /// Images uploaded by an owner
    UserAssets,
    /// Images produced server-side on behalf of an owner
    GeneratedAssets,
}

impl AssetCategory {
    /// Key prefix for this category
    pub fn prefix(&self) -> &'static str {
        match self {
            AssetCategory::UserAssets => "user-assets",
            AssetCategory::GeneratedAssets => "generated-assets",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Slash-delimited object key inside the bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(key: impl Into<String>) -> Self {
        StorageKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Provider-issued URL that serves an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadUrl(String);

impl DownloadUrl {
    pub fn new(url: impl Into<String>) -> Self {
        DownloadUrl(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DownloadUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DownloadUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Bytes ready for upload together with their name and MIME type
#[derive(Debug, Clone)]
pub struct UploadableFile {
    pub data: Bytes,
    pub file_name: String,
    pub mime_type: String,
}

impl UploadableFile {
    pub fn new(data: impl Into<Bytes>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Build a file whose type may be unknown, falling back to PNG
    ///
    /// Parameters such as `; charset=…` are not part of the type and are dropped.
    pub fn with_reported_type(
        data: impl Into<Bytes>,
        file_name: impl Into<String>,
        reported_type: Option<&str>,
    ) -> Self {
        let mime_type = reported_type
            .and_then(|t| t.split(';').next())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME);
        Self::new(data, file_name, mime_type)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Key and URL of a freshly uploaded asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedAsset {
    pub key: StorageKey,
    pub url: DownloadUrl,
}
