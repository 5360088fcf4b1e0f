//! Process-local object store
//!
//! Keeps objects in a map behind a lock. Used for local development when no
//! bucket is configured, and as the substitute store in tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use super::{DownloadUrlCodec, ObjectStore, StoreError};
use crate::domain::{DownloadUrl, StorageKey};

/// An object held by [`MemoryObjectStore`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// In-memory [`ObjectStore`]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<StorageKey, StoredObject>>,
    codec: DownloadUrlCodec,
}

impl MemoryObjectStore {
    pub fn new(codec: DownloadUrlCodec) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            codec,
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: &StorageKey) -> Option<StoredObject> {
        self.objects.read().get(key).cloned()
    }

    pub fn contains(&self, key: &StorageKey) -> bool {
        self.objects.read().contains_key(key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        key: &StorageKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        debug!(key = %key, size = data.len(), "Storing object in memory");
        self.objects.write().insert(
            key.clone(),
            StoredObject {
                data,
                content_type: content_type.map(String::from),
            },
        );
        Ok(())
    }

    async fn resolve_url(&self, key: &StorageKey) -> Result<DownloadUrl, StoreError> {
        if !self.contains(key) {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(self.codec.encode(key))
    }

    async fn delete(&self, key: &StorageKey) -> Result<(), StoreError> {
        match self.objects.write().remove(key) {
            Some(object) => {
                debug!(
                    key = %key,
                    size = object.data.len(),
                    content_type = ?object.content_type,
                    "Removed object from memory"
                );
                Ok(())
            }
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }
}
