//! Download URL encoding
//!
//! Download URLs carry the storage key as a single percent-encoded path
//! segment behind a fixed marker:
//!
//! ```text
//! https://host/v0/b/{bucket}/o/user-assets%2Fu1%2Ft1_1700000000000.jpg?alt=media
//! └──────── base_url ──────┘└┬┘└──────────── encoded key ──────────────┘└─query─┘
//!                          marker
//! ```
//!
//! The deleter relies on [`decode_storage_key`] inverting [`DownloadUrlCodec::encode`]
//! exactly; a URL that does not decode is never deleted.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::domain::{DownloadUrl, StorageKey};

/// Marker segment used when none is configured
pub const DEFAULT_URL_MARKER: &str = "/o/";

/// Query appended to download URLs when none is configured
pub const DEFAULT_DOWNLOAD_QUERY: &str = "alt=media";

/// Everything except RFC 3986 unreserved characters, so `/` becomes `%2F`
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Builds download URLs for storage keys
#[derive(Debug, Clone)]
pub struct DownloadUrlCodec {
    base_url: String,
    marker: String,
    query: Option<String>,
}

impl DownloadUrlCodec {
    pub fn new(base_url: &str, marker: &str, query: Option<&str>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            marker: marker.to_string(),
            query: query
                .map(|q| q.trim_start_matches('?'))
                .filter(|q| !q.is_empty())
                .map(String::from),
        }
    }

    /// Download URL for `key`
    pub fn encode(&self, key: &StorageKey) -> DownloadUrl {
        let encoded = utf8_percent_encode(key.as_str(), KEY_SEGMENT);
        let url = match &self.query {
            Some(query) => format!("{}{}{}?{}", self.base_url, self.marker, encoded, query),
            None => format!("{}{}{}", self.base_url, self.marker, encoded),
        };
        DownloadUrl::new(url)
    }
}

/// Recover the storage key from a download URL
///
/// Looks for `marker` in the URL's path, takes the rest of the path (the query
/// and fragment are never part of it) and percent-decodes it. Returns `None`
/// for unparseable URLs, URLs without the marker, empty keys and keys that are
/// not valid UTF-8 once decoded.
pub fn decode_storage_key(url: &str, marker: &str) -> Option<StorageKey> {
    if marker.is_empty() {
        return None;
    }

    let parsed = Url::parse(url.trim()).ok()?;
    let path = parsed.path();
    let start = path.find(marker)? + marker.len();
    let encoded = &path[start..];

    if encoded.is_empty() {
        return None;
    }

    let key = percent_decode_str(encoded).decode_utf8().ok()?;
    Some(StorageKey::new(key.into_owned()))
}
