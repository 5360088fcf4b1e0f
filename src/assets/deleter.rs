//! Best-effort asset deletion
//!
//! Deletion is cleanup that runs alongside user-facing operations, so it never
//! fails its caller. Every call resolves to a [`DeleteOutcome`]; failures are
//! logged and carried in the outcome for callers that want to look.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::StorageKey;
use crate::storage::{decode_storage_key, ObjectStore};

/// What a delete request ended up doing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The object existed and was removed
    Deleted { key: StorageKey },
    /// The object was already gone
    NotFound { key: StorageKey },
    /// No storage key could be recovered from the URL; the store was not called
    Ignored,
    /// The store failed; the error was logged and dropped
    Suppressed { key: StorageKey, diagnostic: String },
}

/// Removes assets by download URL
#[derive(Clone)]
pub struct Deleter {
    store: Arc<dyn ObjectStore>,
    marker: String,
}

impl Deleter {
    /// `marker` must match the one the store's download URLs are built with
    pub fn new(store: Arc<dyn ObjectStore>, marker: impl Into<String>) -> Self {
        Self {
            store,
            marker: marker.into(),
        }
    }

    /// Delete the object a download URL points at
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn delete_by_url(&self, url: &str) -> DeleteOutcome {
        match decode_storage_key(url, &self.marker) {
            Some(key) => self.delete_key(&key).await,
            None => {
                debug!(marker = %self.marker, "No storage key in URL, skipping delete");
                DeleteOutcome::Ignored
            }
        }
    }

    /// Delete an object by key with the same suppression policy
    pub async fn delete_key(&self, key: &StorageKey) -> DeleteOutcome {
        match self.store.delete(key).await {
            Ok(()) => {
                info!(key = %key, "Deleted asset");
                DeleteOutcome::Deleted { key: key.clone() }
            }
            Err(e) if e.is_not_found() => {
                debug!(key = %key, "Asset already absent");
                DeleteOutcome::NotFound { key: key.clone() }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Asset delete failed, suppressing");
                DeleteOutcome::Suppressed {
                    key: key.clone(),
                    diagnostic: e.to_string(),
                }
            }
        }
    }
}
