//! Scripted object store for exercising failure paths in tests

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{DownloadUrlCodec, ObjectStore, StoreError};
use crate::domain::{DownloadUrl, StorageKey};

/// How a scripted operation responds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Ok,
    NotFound,
    PermissionDenied,
    Outage,
}

impl Scripted {
    fn into_result(self, key: &StorageKey) -> Result<(), StoreError> {
        match self {
            Scripted::Ok => Ok(()),
            Scripted::NotFound => Err(StoreError::NotFound(key.to_string())),
            Scripted::PermissionDenied => Err(StoreError::PermissionDenied(key.to_string())),
            Scripted::Outage => Err(StoreError::Backend("service unavailable".to_string())),
        }
    }
}

/// Store call as observed by [`ScriptedStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put { key: StorageKey, size: usize, content_type: Option<String> },
    ResolveUrl(StorageKey),
    Delete(StorageKey),
}

/// Records every call and answers with preset outcomes
pub struct ScriptedStore {
    pub codec: DownloadUrlCodec,
    pub put: Scripted,
    pub resolve: Scripted,
    pub delete: Scripted,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            codec: DownloadUrlCodec::new("https://storage.test/v0/b/bucket", "/o/", Some("alt=media")),
            put: Scripted::Ok,
            resolve: Scripted::Ok,
            delete: Scripted::Ok,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_put(mut self, outcome: Scripted) -> Self {
        self.put = outcome;
        self
    }

    pub fn with_resolve(mut self, outcome: Scripted) -> Self {
        self.resolve = outcome;
        self
    }

    pub fn with_delete(mut self, outcome: Scripted) -> Self {
        self.delete = outcome;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn put(
        &self,
        key: &StorageKey,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        self.calls.lock().push(Call::Put {
            key: key.clone(),
            size: data.len(),
            content_type: content_type.map(String::from),
        });
        self.put.into_result(key)
    }

    async fn resolve_url(&self, key: &StorageKey) -> Result<DownloadUrl, StoreError> {
        self.calls.lock().push(Call::ResolveUrl(key.clone()));
        self.resolve.into_result(key)?;
        Ok(self.codec.encode(key))
    }

    async fn delete(&self, key: &StorageKey) -> Result<(), StoreError> {
        self.calls.lock().push(Call::Delete(key.clone()));
        self.delete.into_result(key)
    }
}
