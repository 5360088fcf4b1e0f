//! Blob dereferencing
//!
//! Turns a transient blob reference into an [`UploadableFile`]. Three kinds of
//! reference are understood:
//!
//! - `blob:{uuid}` - bytes registered in the process-local [`BlobRegistry`]
//! - `data:[<mime>][;base64],<payload>` - inline data URLs
//! - `http(s)://…` - fetched over HTTP
//!
//! Whatever the source, the file's MIME type is the type the blob reports,
//! falling back to `image/png` when it reports none.
//!
//! HTTP fetches only go to configured hosts, bypass proxies, never follow
//! redirects and are refused when the host resolves to a loopback, private or link-local address.
//! Bodies are read incrementally and abandoned once they pass the size limit.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use percent_encoding::percent_decode_str;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::{Host, Url};
use uuid::Uuid;

use crate::config::BlobSettings;
use crate::domain::UploadableFile;

const BLOB_SCHEME: &str = "blob:";
const DATA_SCHEME: &str = "data:";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while dereferencing a blob
#[derive(Error, Debug)]
pub enum DereferenceError {
    #[error("Unsupported blob reference: {0}")]
    Unsupported(String),

    #[error("Blob not found, expired or already released: {0}")]
    Released(String),

    #[error("Malformed data URL: {0}")]
    MalformedData(String),

    #[error("Blob host not allowed: {0}")]
    HostNotAllowed(String),

    #[error("Blob larger than {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Failed to fetch blob: {0}")]
    Fetch(String),
}

impl From<reqwest::Error> for DereferenceError {
    fn from(err: reqwest::Error) -> Self {
        DereferenceError::Fetch(err.to_string())
    }
}

/// Errors that can occur while registering a blob
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("Blob registry full: {held} of {limit} bytes in use")]
    Full { held: usize, limit: usize },
}

/// Bytes held by the registry
#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Bytes,
    pub mime_type: Option<String>,
    registered_at: Instant,
}

impl Blob {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.registered_at.elapsed() >= ttl
    }
}

/// Process-local table of transient blobs
///
/// A registered blob stays addressable until it is released or its TTL runs
/// out. Expired entries are evicted lazily on `register` and `get`. The byte
/// cap is checked before insertion, so concurrent registrations can overshoot
/// it by at most one blob each.
#[derive(Debug)]
pub struct BlobRegistry {
    blobs: DashMap<Uuid, Blob>,
    ttl: Duration,
    max_total_bytes: usize,
}

impl BlobRegistry {
    pub fn new(ttl: Duration, max_total_bytes: usize) -> Self {
        Self {
            blobs: DashMap::new(),
            ttl,
            max_total_bytes,
        }
    }

    pub fn from_settings(settings: &BlobSettings) -> Self {
        Self::new(Duration::from_secs(settings.ttl_secs), settings.max_total_bytes)
    }

    /// Store bytes and hand out a `blob:` reference to them
    pub fn register(&self, data: Bytes, mime_type: Option<String>) -> Result<String, RegisterError> {
        self.evict_expired();

        let held: usize = self.blobs.iter().map(|entry| entry.value().data.len()).sum();
        if held + data.len() > self.max_total_bytes {
            warn!(held, size = data.len(), limit = self.max_total_bytes, "Blob registry full");
            return Err(RegisterError::Full { held, limit: self.max_total_bytes });
        }

        let id = Uuid::new_v4();
        debug!(blob_id = %id, size = data.len(), "Registered blob");
        self.blobs.insert(
            id,
            Blob {
                data,
                mime_type,
                registered_at: Instant::now(),
            },
        );
        Ok(format!("{}{}", BLOB_SCHEME, id))
    }

    /// Drop a blob; returns whether it was still registered
    pub fn release(&self, blob_ref: &str) -> bool {
        parse_blob_id(blob_ref)
            .map(|id| self.blobs.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub fn get(&self, blob_ref: &str) -> Option<Blob> {
        let id = parse_blob_id(blob_ref)?;
        if self.blobs.remove_if(&id, |_, blob| blob.is_expired(self.ttl)).is_some() {
            debug!(blob_id = %id, "Blob expired");
            return None;
        }
        self.blobs.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    fn evict_expired(&self) {
        let before = self.blobs.len();
        self.blobs.retain(|_, blob| !blob.is_expired(self.ttl));
        let evicted = before.saturating_sub(self.blobs.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired blobs");
        }
    }
}

/// Accepts either `blob:{uuid}` or a bare UUID
fn parse_blob_id(blob_ref: &str) -> Option<Uuid> {
    let raw = blob_ref.trim();
    let raw = raw.strip_prefix(BLOB_SCHEME).unwrap_or(raw);
    Uuid::parse_str(raw).ok()
}

/// System resolver that drops every non-public address
struct PublicAddressResolver;

impl Resolve for PublicAddressResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(lookup_public(name.as_str().to_string()))
    }
}

async fn lookup_public(host: String) -> Result<Addrs, BoxError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .filter(|addr| is_public_address(addr.ip()))
        .collect();

    if addrs.is_empty() {
        warn!(host = %host, "Blob host has no public address");
        return Err(format!("{} has no public address", host).into());
    }

    Ok(Box::new(addrs.into_iter()))
}

/// Whether `ip` is routable on the public internet
fn is_public_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                // carrier-grade NAT, 100.64.0.0/10
                || (a == 100 && (b & 0xc0) == 64))
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public_address(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                // unique local, fc00::/7
                || (first & 0xfe00) == 0xfc00
                // link local, fe80::/10
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

/// Materializes blob references into uploadable files
#[derive(Clone)]
pub struct BlobConverter {
    registry: Arc<BlobRegistry>,
    http_client: reqwest::Client,
    allowed_hosts: Arc<[String]>,
    allow_private_addresses: bool,
    max_fetch_bytes: usize,
}

impl BlobConverter {
    /// `max_fetch_bytes` caps the body of `http(s)` blobs
    pub fn new(
        registry: Arc<BlobRegistry>,
        settings: &BlobSettings,
        max_fetch_bytes: usize,
    ) -> Result<Self, DereferenceError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .user_agent(concat!("image-asset-store/", env!("CARGO_PKG_VERSION")));

        if !settings.allow_private_addresses {
            builder = builder.dns_resolver(Arc::new(PublicAddressResolver));
        }

        let allowed_hosts = settings
            .allowed_hosts
            .iter()
            .map(|host| host.trim().to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();

        Ok(Self {
            registry,
            http_client: builder.build()?,
            allowed_hosts,
            allow_private_addresses: settings.allow_private_addresses,
            max_fetch_bytes,
        })
    }

    pub fn registry(&self) -> &Arc<BlobRegistry> {
        &self.registry
    }

    /// Dereference `blob_ref` and wrap its bytes as `file_name`
    #[instrument(skip_all, fields(file_name = %file_name))]
    pub async fn materialize(&self, blob_ref: &str, file_name: &str) -> Result<UploadableFile, DereferenceError> {
        let blob_ref = blob_ref.trim();

        let (data, mime_type) = if blob_ref.starts_with(BLOB_SCHEME) {
            let blob = self
                .registry
                .get(blob_ref)
                .ok_or_else(|| DereferenceError::Released(blob_ref.to_string()))?;
            (blob.data, blob.mime_type)
        } else if let Some(rest) = blob_ref.strip_prefix(DATA_SCHEME) {
            decode_data_url(rest)?
        } else if blob_ref.starts_with("http://") || blob_ref.starts_with("https://") {
            self.fetch(blob_ref).await?
        } else {
            return Err(DereferenceError::Unsupported(truncate(blob_ref)));
        };

        debug!(size = data.len(), mime_type = ?mime_type, "Blob materialized");
        Ok(UploadableFile::with_reported_type(data, file_name, mime_type.as_deref()))
    }

    /// Parse `url` and refuse hosts outside the allowlist
    ///
    /// Allowlist entries are host names or IP literals (IPv6 without brackets).
    /// An IP literal is also checked here, since it never reaches the resolver.
    fn check_url(&self, url: &str) -> Result<Url, DereferenceError> {
        let parsed = Url::parse(url)
            .map_err(|e| DereferenceError::Unsupported(format!("{}: {}", truncate(url), e)))?;

        let (name, literal) = match parsed.host() {
            Some(Host::Domain(domain)) => (domain.to_ascii_lowercase(), None),
            Some(Host::Ipv4(ip)) => (ip.to_string(), Some(IpAddr::V4(ip))),
            Some(Host::Ipv6(ip)) => (ip.to_string(), Some(IpAddr::V6(ip))),
            None => return Err(DereferenceError::Unsupported(truncate(url))),
        };

        if !self.allowed_hosts.iter().any(|host| *host == name) {
            warn!(host = %name, "Blob host not on allowlist");
            return Err(DereferenceError::HostNotAllowed(name));
        }

        if let Some(ip) = literal {
            if !self.allow_private_addresses && !is_public_address(ip) {
                warn!(host = %name, "Blob host is not a public address");
                return Err(DereferenceError::HostNotAllowed(name));
            }
        }

        Ok(parsed)
    }

    async fn fetch(&self, url: &str) -> Result<(Bytes, Option<String>), DereferenceError> {
        let url = self.check_url(url)?;
        debug!(url = %url, "Fetching blob");

        let mut response = self.http_client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Blob fetch rejected");
            return Err(DereferenceError::Fetch(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let limit = self.max_fetch_bytes;
        if response.content_length().is_some_and(|length| length > limit as u64) {
            warn!(url = %url, limit, "Blob Content-Length over limit");
            return Err(DereferenceError::TooLarge { limit });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut data = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if data.len() + chunk.len() > limit {
                warn!(url = %url, limit, "Blob body over limit, fetch abandoned");
                return Err(DereferenceError::TooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }

        Ok((data.freeze(), content_type))
    }
}

/// Decode the part of a data URL after `data:`
fn decode_data_url(rest: &str) -> Result<(Bytes, Option<String>), DereferenceError> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| DereferenceError::MalformedData("missing ',' separator".to_string()))?;

    let (mime, is_base64) = match meta.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (meta, false),
    };

    let data = if is_base64 {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| DereferenceError::MalformedData(e.to_string()))?
    } else {
        percent_decode_str(payload).collect::<Vec<u8>>()
    };

    Ok((Bytes::from(data), Some(mime.to_string())))
}

fn truncate(value: &str) -> String {
    value.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registry() -> Arc<BlobRegistry> {
        Arc::new(BlobRegistry::new(Duration::from_secs(60), 1024))
    }

    fn converter() -> BlobConverter {
        BlobConverter::new(registry(), &BlobSettings::default(), 1024).unwrap()
    }

    /// Converter allowed to reach the mock server on loopback
    fn local_converter(server: &MockServer, max_fetch_bytes: usize) -> BlobConverter {
        let settings = BlobSettings {
            allowed_hosts: vec![server.address().ip().to_string()],
            allow_private_addresses: true,
            ..BlobSettings::default()
        };
        BlobConverter::new(registry(), &settings, max_fetch_bytes).unwrap()
    }

    #[tokio::test]
    async fn test_registered_blob_without_type_is_png() {
        let converter = converter();
        let blob_ref = converter.registry().register(Bytes::from_static(b"raw"), None).unwrap();

        let file = converter.materialize(&blob_ref, "x.png").await.unwrap();

        assert_eq!(file.file_name, "x.png");
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.data.as_ref(), b"raw");
    }

    #[tokio::test]
    async fn test_registered_blob_keeps_reported_type() {
        let converter = converter();
        let blob_ref = converter
            .registry()
            .register(Bytes::from_static(b"jpg"), Some("image/jpeg".to_string()))
            .unwrap();

        let file = converter.materialize(&blob_ref, "photo.jpg").await.unwrap();
        assert_eq!(file.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_released_blob_fails() {
        let converter = converter();
        let blob_ref = converter.registry().register(Bytes::from_static(b"raw"), None).unwrap();
        assert!(converter.registry().release(&blob_ref));
        assert!(!converter.registry().release(&blob_ref));

        let err = converter.materialize(&blob_ref, "x.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::Released(_)));

        let err = converter.materialize("blob:not-a-uuid", "x.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::Released(_)));
    }

    #[tokio::test]
    async fn test_expired_blob_fails() {
        let registry = Arc::new(BlobRegistry::new(Duration::ZERO, 1024));
        let converter = BlobConverter::new(registry.clone(), &BlobSettings::default(), 1024).unwrap();
        let blob_ref = registry.register(Bytes::from_static(b"raw"), None).unwrap();

        let err = converter.materialize(&blob_ref, "x.png").await.unwrap_err();

        assert!(matches!(err, DereferenceError::Released(_)));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registration_evicts_expired_blobs() {
        let registry = BlobRegistry::new(Duration::ZERO, 1024);
        for _ in 0..10 {
            registry.register(Bytes::from_static(b"raw"), None).unwrap();
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_byte_cap() {
        let registry = BlobRegistry::new(Duration::from_secs(60), 4);
        let first = registry.register(Bytes::from_static(b"abc"), None).unwrap();

        let err = registry.register(Bytes::from_static(b"de"), None).unwrap_err();
        assert!(matches!(err, RegisterError::Full { held: 3, limit: 4 }));

        assert!(registry.release(&first));
        registry.register(Bytes::from_static(b"de"), None).unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_reference() {
        let err = converter().materialize("file:///etc/passwd", "x.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_data_urls() {
        let converter = converter();

        let file = converter
            .materialize("data:image/gif;base64,R0lGODlh", "a.gif")
            .await
            .unwrap();
        assert_eq!(file.mime_type, "image/gif");
        assert_eq!(file.data.as_ref(), b"GIF89a");

        let file = converter.materialize("data:,hello%20world", "a.txt").await.unwrap();
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.data.as_ref(), b"hello world");

        let file = converter
            .materialize("data:text/plain;charset=utf-8,hi", "a.txt")
            .await
            .unwrap();
        assert_eq!(file.mime_type, "text/plain");

        let err = converter.materialize("data:image/png;base64", "a.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::MalformedData(_)));

        let err = converter.materialize("data:;base64,@@@", "a.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::MalformedData(_)));
    }

    #[tokio::test]
    async fn test_http_blob_uses_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob/1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/webp")
                    .set_body_bytes(b"webp".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let file = local_converter(&server, 1024)
            .materialize(&format!("{}/blob/1", server.uri()), "a.webp")
            .await
            .unwrap();

        assert_eq!(file.mime_type, "image/webp");
        assert_eq!(file.data.as_ref(), b"webp");
    }

    #[tokio::test]
    async fn test_http_content_type_parameters_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png; charset=binary")
                    .set_body_bytes(b"png".to_vec()),
            )
            .mount(&server)
            .await;

        let file = local_converter(&server, 1024).materialize(&server.uri(), "a.png").await.unwrap();
        assert_eq!(file.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_http_blob_without_content_type_is_png() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"img".to_vec()))
            .mount(&server)
            .await;

        let file = local_converter(&server, 1024).materialize(&server.uri(), "a.png").await.unwrap();
        assert_eq!(file.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_http_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = local_converter(&server, 1024).materialize(&server.uri(), "a.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::Fetch(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_redirects_are_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "http://169.254.169.254/latest/meta-data/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = local_converter(&server, 1024)
            .materialize(&format!("{}/moved", server.uri()), "a.png")
            .await
            .unwrap_err();
        assert!(matches!(err, DereferenceError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_oversized_body_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let converter = local_converter(&server, 16);
        let err = converter.materialize(&server.uri(), "a.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::TooLarge { limit: 16 }));

        let file = local_converter(&server, 64).materialize(&server.uri(), "a.png").await.unwrap();
        assert_eq!(file.size(), 64);
    }

    #[tokio::test]
    async fn test_host_outside_allowlist_is_never_contacted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"img".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        // empty allowlist refuses every http reference
        let err = converter().materialize(&server.uri(), "a.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::HostNotAllowed(_)));

        let settings = BlobSettings {
            allowed_hosts: vec!["images.example.com".to_string()],
            allow_private_addresses: true,
            ..BlobSettings::default()
        };
        let converter = BlobConverter::new(registry(), &settings, 1024).unwrap();
        let err = converter.materialize(&server.uri(), "a.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::HostNotAllowed(host) if host == "127.0.0.1"));
    }

    #[tokio::test]
    async fn test_private_addresses_refused_even_when_allowlisted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"img".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let settings = BlobSettings {
            allowed_hosts: vec![
                "127.0.0.1".to_string(),
                "169.254.169.254".to_string(),
                "localhost".to_string(),
            ],
            ..BlobSettings::default()
        };
        let converter = BlobConverter::new(registry(), &settings, 1024).unwrap();

        let err = converter.materialize(&server.uri(), "a.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::HostNotAllowed(_)));

        let err = converter
            .materialize("http://169.254.169.254/latest/meta-data/", "a.png")
            .await
            .unwrap_err();
        assert!(matches!(err, DereferenceError::HostNotAllowed(_)));

        // a name that resolves to loopback fails at resolution
        let url = format!("http://localhost:{}/", server.address().port());
        let err = converter.materialize(&url, "a.png").await.unwrap_err();
        assert!(matches!(err, DereferenceError::Fetch(_)));
    }

    #[test]
    fn test_public_address_classification() {
        for ip in ["127.0.0.1", "10.1.2.3", "172.16.0.1", "192.168.1.1", "169.254.169.254", "100.64.0.1", "0.0.0.0", "::1", "fd00::1", "fe80::1", "::ffff:127.0.0.1"] {
            assert!(!is_public_address(ip.parse().unwrap()), "{}", ip);
        }
        for ip in ["93.184.216.34", "1.1.1.1", "2606:4700:4700::1111"] {
            assert!(is_public_address(ip.parse().unwrap()), "{}", ip);
        }
    }
}
