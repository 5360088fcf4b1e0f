//! Storage key construction
//!
//! Keys follow `{category}/{owner_id}/{artifact_id}_{timestamp_ms}.{ext}`.
//! The timestamp makes repeated uploads for the same artifact land on distinct
//! keys; two calls in the same millisecond produce the same key, which callers
//! have to tolerate.

use chrono::Utc;
use std::sync::Arc;

use crate::domain::{AssetCategory, StorageKey};

/// Extension used for server-generated images
pub const GENERATED_EXTENSION: &str = "png";

/// Source of the millisecond timestamp embedded in keys
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Always reports the same instant
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

#[cfg(test)]
impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// Computes storage keys; never touches the network
#[derive(Clone)]
pub struct PathBuilder {
    clock: Arc<dyn Clock>,
}

impl PathBuilder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Key for an image uploaded by `owner_id`, keeping the original extension
    pub fn user_asset_path(&self, owner_id: &str, artifact_id: &str, original_file_name: &str) -> StorageKey {
        asset_key(
            AssetCategory::UserAssets,
            owner_id,
            artifact_id,
            self.clock.now_millis(),
            file_extension(original_file_name),
        )
    }

    /// Key for a server-generated PNG
    pub fn generated_asset_path(&self, owner_id: &str, artifact_id: &str) -> StorageKey {
        asset_key(
            AssetCategory::GeneratedAssets,
            owner_id,
            artifact_id,
            self.clock.now_millis(),
            Some(GENERATED_EXTENSION),
        )
    }
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// Assemble a key from its parts; a missing extension drops the `.ext` suffix
pub fn asset_key(
    category: AssetCategory,
    owner_id: &str,
    artifact_id: &str,
    timestamp_ms: i64,
    extension: Option<&str>,
) -> StorageKey {
    let key = match extension {
        Some(ext) => format!("{}/{}/{}_{}.{}", category.prefix(), owner_id, artifact_id, timestamp_ms, ext),
        None => format!("{}/{}/{}_{}", category.prefix(), owner_id, artifact_id, timestamp_ms),
    };
    StorageKey::new(key)
}

/// Substring after the last `.` of a file name
///
/// `None` when there is no dot, nothing follows it, or it would smuggle a path
/// separator into the key.
pub fn file_extension(file_name: &str) -> Option<&str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || ext.contains(|c: char| c == '/' || c == '\\') {
        return None;
    }
    Some(ext)
}
