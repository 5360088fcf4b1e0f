//! Configuration module for the asset store service

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::path::PathBuf;

use crate::storage::{DEFAULT_DOWNLOAD_QUERY, DEFAULT_URL_MARKER};

/// Main application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub blobs: BlobSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// Largest request body accepted for uploads
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Which object store implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store, for development and tests
    Memory,
    /// Cloudflare R2 with static credentials
    R2,
    /// AWS S3 using the default credential chain
    S3,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub bucket_name: String,
    /// R2 account ID (R2 only)
    pub account_id: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// AWS region override (S3 only)
    pub region: Option<String>,
    /// Everything in a download URL before the marker segment
    pub download_base_url: String,
    /// Path token that precedes the encoded key in download URLs
    #[serde(default = "default_url_marker")]
    pub url_marker: String,
    /// Query appended to download URLs, without the leading `?`
    #[serde(default = "default_download_query")]
    pub download_query: Option<String>,
}

/// Blob dereferencing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BlobSettings {
    /// Timeout for fetching `http(s)` blob references
    pub fetch_timeout_secs: u64,
    /// Hosts `http(s)` blob references may point at; empty refuses them all
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// Permit fetches that resolve to loopback, private or link-local addresses
    #[serde(default)]
    pub allow_private_addresses: bool,
    /// Seconds a registered blob stays addressable
    #[serde(default = "default_blob_ttl_secs")]
    pub ttl_secs: u64,
    /// Upper bound on bytes held by the blob registry
    #[serde(default = "default_blob_max_total_bytes")]
    pub max_total_bytes: usize,
}

fn default_max_body_bytes() -> usize { 20 * 1024 * 1024 }
fn default_url_marker() -> String { DEFAULT_URL_MARKER.to_string() }
fn default_download_query() -> Option<String> { Some(DEFAULT_DOWNLOAD_QUERY.to_string()) }
fn default_blob_ttl_secs() -> u64 { 15 * 60 }
fn default_blob_max_total_bytes() -> usize { 256 * 1024 * 1024 }

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (prefixed with ASSETS_)
    /// 2. config/local.toml (gitignored)
    /// 3. config/default.toml
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // ASSETS_STORAGE__BUCKET_NAME, ASSETS_SERVER__PORT, etc.
            .add_source(
                Environment::with_prefix("ASSETS")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("blobs.allowed_hosts")
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            blobs: BlobSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            backend: StorageBackend::Memory,
            bucket_name: "image-assets".to_string(),
            account_id: None,
            access_key_id: None,
            secret_access_key: None,
            region: None,
            download_base_url: "http://localhost:8080/v0/b/image-assets".to_string(),
            url_marker: default_url_marker(),
            download_query: default_download_query(),
        }
    }
}

impl Default for BlobSettings {
    fn default() -> Self {
        BlobSettings {
            fetch_timeout_secs: 30,
            allowed_hosts: Vec::new(),
            allow_private_addresses: false,
            ttl_secs: default_blob_ttl_secs(),
            max_total_bytes: default_blob_max_total_bytes(),
        }
    }
}
