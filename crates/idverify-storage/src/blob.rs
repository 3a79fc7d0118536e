//! Blob storage for uploaded documents and derived face images
//!
//! Blobs are addressed by URL (`{public_base_url}/{container}/{blob_name}`).
//! [`LocalBlobStore`] keeps them in a directory on disk, which is what the
//! demo deployment serves statically; foreign URLs are fetched over HTTP.
//!
//! Read access for browsers goes through signed URLs: `sas_url` appends an
//! expiry (`se`), a permission (`sp=r`) and a signature (`sig`): the hex
//! HMAC-SHA256, keyed by the account key, of the container, blob name and
//! expiry. The API serves `/blobs/{container}/{blob}` only for URLs that
//! pass [`BlobStore::verify_sas`].

use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Blob storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Directory blobs are written to
    pub root: PathBuf,

    /// Base URL the blob directory is served from
    pub public_base_url: String,

    /// Container name (first path segment of every blob URL)
    pub container: String,

    /// Secret used to sign SAS URLs (`STORAGE_ACCOUNT_KEY` when loaded
    /// through settings); signing is refused while it is empty
    pub account_key: String,

    /// Timeout for downloading foreign URLs
    pub timeout_secs: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("blob_store"),
            public_base_url: "http://localhost:8000/blobs".to_string(),
            container: "kyc-documents".to_string(),
            account_key: String::new(),
            timeout_secs: 60,
        }
    }
}

/// Blob storage trait
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file, returning the URL of the stored blob
    async fn upload(&self, path: &Path) -> StorageResult<String>;

    /// Upload raw bytes under the given file name, returning the blob URL
    async fn upload_bytes(&self, name: &str, data: &[u8]) -> StorageResult<String>;

    /// Fetch a blob URL into `dest_dir`, returning the local path
    async fn download(&self, url: &str, dest_dir: &Path) -> StorageResult<PathBuf>;

    /// Issue a read-only signed URL for a blob reference (URL or bare name)
    fn sas_url(&self, blob_ref: &str, ttl: Duration) -> StorageResult<String>;

    /// Check a signed URL produced by [`BlobStore::sas_url`] at time `now`
    fn verify_sas(&self, _sas_url: &str, _now: DateTime<Utc>) -> bool {
        false
    }

    /// File backing a blob, for stores that keep blobs on local disk
    fn local_path(&self, _container: &str, _blob: &str) -> Option<PathBuf> {
        None
    }
}

/// Directory-backed blob store
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    config: BlobConfig,
    http: reqwest::Client,
}

impl LocalBlobStore {
    /// Create a blob store, creating the container directory if needed
    ///
    /// # Errors
    /// Returns an error if the container directory cannot be created or the
    /// HTTP client cannot be built.
    pub fn new(config: BlobConfig) -> StorageResult<Self> {
        if config.container.is_empty() || config.container.contains('/') {
            return Err(StorageError::InvalidConfig(format!(
                "invalid container name '{}'",
                config.container
            )));
        }

        std::fs::create_dir_all(config.root.join(&config.container))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StorageError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    /// Configuration this store was built with
    #[must_use]
    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    fn container_dir(&self) -> PathBuf {
        self.config.root.join(&self.config.container)
    }

    fn container_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            self.config.container
        )
    }

    /// Public URL of a blob in this store
    #[must_use]
    pub fn blob_url(&self, blob_name: &str) -> String {
        format!("{}/{}", self.container_url(), blob_name)
    }

    /// Local path of a blob in this store
    ///
    /// # Errors
    /// Returns an error if the reference does not name a valid blob.
    pub fn blob_path(&self, blob_ref: &str) -> StorageResult<PathBuf> {
        Ok(self.container_dir().join(blob_name(blob_ref)?))
    }

    /// Whether a URL points into this store's container
    #[must_use]
    pub fn owns(&self, url: &str) -> bool {
        url.starts_with(&format!("{}/", self.container_url()))
    }

    /// Keyed MAC over a read grant, `None` without an account key
    fn mac(&self, blob_name: &str, expiry: &str) -> Option<HmacSha256> {
        if self.config.account_key.is_empty() {
            return None;
        }
        let mut mac = HmacSha256::new_from_slice(self.config.account_key.as_bytes()).ok()?;
        mac.update(self.config.container.as_bytes());
        mac.update(b"\n");
        mac.update(blob_name.as_bytes());
        mac.update(b"\n");
        mac.update(expiry.as_bytes());
        mac.update(b"\nr");
        Some(mac)
    }

    async fn write_blob(&self, name: &str, data: &[u8]) -> StorageResult<String> {
        let blob = format!("{}_{}", Uuid::new_v4().simple(), sanitize_name(name));
        let path = self.container_dir().join(&blob);
        tokio::fs::write(&path, data).await?;
        debug!("Stored blob {} ({} bytes)", blob, data.len());
        Ok(self.blob_url(&blob))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, path: &Path) -> StorageResult<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidReference(path.display().to_string()))?;
        let data = tokio::fs::read(path).await?;
        let url = self.write_blob(name, &data).await?;
        info!("Uploaded {} to {}", path.display(), url);
        Ok(url)
    }

    async fn upload_bytes(&self, name: &str, data: &[u8]) -> StorageResult<String> {
        self.write_blob(name, data).await
    }

    async fn download(&self, url: &str, dest_dir: &Path) -> StorageResult<PathBuf> {
        let name = blob_name(url)?;
        let dest = dest_dir.join(sanitize_name(name));

        if self.owns(url) {
            let src = self.blob_path(url)?;
            if !src.exists() {
                return Err(StorageError::NotFound(url.to_string()));
            }
            tokio::fs::copy(&src, &dest).await?;
            debug!("Copied blob {} to {}", name, dest.display());
            return Ok(dest);
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(StorageError::InvalidReference(url.to_string()));
        }

        info!("Downloading blob from URL: {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::Download(format!("{url}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::Download(format!("{url}: HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Download(format!("{url}: {e}")))?;
        tokio::fs::write(&dest, &bytes).await?;
        debug!("Downloaded {} bytes to {}", bytes.len(), dest.display());

        Ok(dest)
    }

    fn sas_url(&self, blob_ref: &str, ttl: Duration) -> StorageResult<String> {
        if self.config.account_key.is_empty() {
            return Err(StorageError::InvalidConfig(
                "account key is required to sign URLs".to_string(),
            ));
        }

        let name = blob_name(blob_ref)?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::InvalidConfig(format!("SAS lifetime: {e}")))?;
        let expiry = (Utc::now() + ttl).to_rfc3339_opts(SecondsFormat::Secs, true);
        let mac = self
            .mac(name, &expiry)
            .ok_or_else(|| StorageError::InvalidConfig("invalid account key".to_string()))?;
        let sig = hex::encode(mac.finalize().into_bytes());

        Ok(format!(
            "{}?sp=r&se={}&sig={}",
            self.blob_url(name),
            expiry.replace(':', "%3A"),
            sig
        ))
    }

    fn verify_sas(&self, sas_url: &str, now: DateTime<Utc>) -> bool {
        let Some((base, query)) = sas_url.split_once('?') else {
            return false;
        };
        let Ok(name) = blob_name(base) else {
            return false;
        };

        let mut expiry = None;
        let mut sig = None;
        let mut permission = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("se", v)) => expiry = Some(v.replace("%3A", ":")),
                Some(("sig", v)) => sig = Some(v),
                Some(("sp", v)) => permission = Some(v),
                _ => {}
            }
        }

        let (Some(expiry), Some(sig), Some("r")) = (expiry, sig, permission) else {
            return false;
        };
        let Ok(expires_at) = DateTime::parse_from_rfc3339(&expiry) else {
            return false;
        };
        if expires_at.with_timezone(&Utc) <= now {
            return false;
        }
        let (Ok(sig), Some(mac)) = (hex::decode(sig), self.mac(name, &expiry)) else {
            return false;
        };
        mac.verify_slice(&sig).is_ok()
    }

    fn local_path(&self, container: &str, blob: &str) -> Option<PathBuf> {
        if container != self.config.container {
            return None;
        }
        match blob_name(blob) {
            Ok(name) if name == blob => Some(self.container_dir().join(name)),
            _ => None,
        }
    }
}

/// Final path segment of a blob reference, without any query string.
///
/// References may be full URLs (`https://host/container/name?sig=...`),
/// quoted strings as sent by browser clients, or bare blob names.
fn blob_name(blob_ref: &str) -> StorageResult<&str> {
    let trimmed = blob_ref.trim_matches(|c| c == '"' || c == '\'');
    let without_query = trimmed.split(['?', '#']).next().unwrap_or_default();
    let name = without_query.rsplit('/').next().unwrap_or_default();

    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        return Err(StorageError::InvalidReference(blob_ref.to_string()));
    }

    Ok(name)
}

/// Keep only characters that are safe in both file names and URLs.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "blob".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_store(dir: &Path) -> LocalBlobStore {
        LocalBlobStore::new(BlobConfig {
            root: dir.to_path_buf(),
            public_base_url: "http://localhost:8000/blobs/".to_string(),
            container: "docs".to_string(),
            account_key: "test-key".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_blob_name_from_reference() {
        assert_eq!(
            blob_name("https://acct.blob.core.windows.net/docs/a.png").unwrap(),
            "a.png"
        );
        assert_eq!(blob_name("'https://host/docs/a.png?sp=r'").unwrap(), "a.png");
        assert_eq!(blob_name("a.png").unwrap(), "a.png");
        assert!(blob_name("https://host/docs/").is_err());
        assert!(blob_name("..").is_err());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("my passport.png"), "my_passport.png");
        assert_eq!(sanitize_name("a/b"), "a_b");
        assert_eq!(sanitize_name(".."), "blob");
    }

    #[tokio::test]
    async fn test_upload_then_download_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let store = test_store(root.path());

        let src = scratch.path().join("license.png");
        std::fs::write(&src, b"png bytes").unwrap();

        let url = store.upload(&src).await.unwrap();
        assert!(url.starts_with("http://localhost:8000/blobs/docs/"));
        assert!(url.ends_with("_license.png"));
        assert!(store.owns(&url));

        let out = tempfile::tempdir().unwrap();
        let local = store.download(&url, out.path()).await.unwrap();
        assert_eq!(std::fs::read(local).unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn test_uploads_with_same_name_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let store = test_store(root.path());

        let a = store.upload_bytes("face.png", b"a").await.unwrap();
        let b = store.upload_bytes("face.png", b"b").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_download_missing_blob() {
        let root = tempfile::tempdir().unwrap();
        let store = test_store(root.path());
        let out = tempfile::tempdir().unwrap();

        let err = store
            .download("http://localhost:8000/blobs/docs/missing.png", out.path())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_download_rejects_non_http_reference() {
        let root = tempfile::tempdir().unwrap();
        let store = test_store(root.path());
        let out = tempfile::tempdir().unwrap();

        let err = store.download("ftp://host/a.png", out.path()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidReference(_)));
    }

    #[test]
    fn test_sas_url_verifies_until_expiry() {
        let root = tempfile::tempdir().unwrap();
        let store = test_store(root.path());

        let sas = store
            .sas_url("http://localhost:8000/blobs/docs/a.png", Duration::from_secs(3600))
            .unwrap();
        assert!(sas.contains("sp=r"));
        assert!(store.verify_sas(&sas, Utc::now()));
        assert!(!store.verify_sas(&sas, Utc::now() + chrono::Duration::hours(2)));
    }

    #[test]
    fn test_sas_url_rejects_tampering() {
        let root = tempfile::tempdir().unwrap();
        let store = test_store(root.path());

        let sas = store.sas_url("a.png", Duration::from_secs(60)).unwrap();
        let forged = sas.replace("/a.png?", "/b.png?");
        assert!(!store.verify_sas(&forged, Utc::now()));
        assert!(!store.verify_sas("http://localhost:8000/blobs/docs/a.png", Utc::now()));
    }

    #[test]
    fn test_sas_signature_is_keyed_hmac() {
        let root = tempfile::tempdir().unwrap();
        let store = test_store(root.path());

        let sas = store.sas_url("a.png", Duration::from_secs(60)).unwrap();
        let query = sas.split_once('?').unwrap().1;
        let expiry = query
            .split('&')
            .find_map(|p| p.strip_prefix("se="))
            .unwrap()
            .replace("%3A", ":");
        let sig = query.split('&').find_map(|p| p.strip_prefix("sig=")).unwrap();

        let mut mac = HmacSha256::new_from_slice(b"test-key").unwrap();
        mac.update(format!("docs\na.png\n{expiry}\nr").as_bytes());
        assert_eq!(sig, hex::encode(mac.finalize().into_bytes()));

        let other = LocalBlobStore::new(BlobConfig {
            account_key: "other-key".to_string(),
            ..store.config().clone()
        })
        .unwrap();
        assert!(!other.verify_sas(&sas, Utc::now()));
        assert!(!store.verify_sas(&sas.replace(sig, "zz"), Utc::now()));
        let flipped = if sig.starts_with('0') { "1" } else { "0" };
        let forged = sas.replace(&format!("sig={sig}"), &format!("sig={flipped}{}", &sig[1..]));
        assert!(!store.verify_sas(&forged, Utc::now()));
    }

    #[test]
    #[serial]
    fn test_default_config_ignores_environment_key() {
        std::env::set_var("STORAGE_ACCOUNT_KEY", "from-env");
        let config = BlobConfig::default();
        std::env::remove_var("STORAGE_ACCOUNT_KEY");
        assert!(config.account_key.is_empty());
    }

    #[test]
    fn test_local_path_stays_in_container() {
        let root = tempfile::tempdir().unwrap();
        let store = test_store(root.path());

        assert_eq!(
            store.local_path("docs", "a.png"),
            Some(root.path().join("docs").join("a.png"))
        );
        assert_eq!(store.local_path("other", "a.png"), None);
        assert_eq!(store.local_path("docs", ".."), None);
        assert_eq!(store.local_path("docs", "x\\a.png"), None);
    }

    #[test]
    fn test_sas_url_requires_account_key() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(BlobConfig {
            root: root.path().to_path_buf(),
            account_key: String::new(),
            ..BlobConfig::default()
        })
        .unwrap();

        let err = store.sas_url("a.png", Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));
    }
}
