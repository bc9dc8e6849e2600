//! Blob storage collaborators.
//!
//! The pipeline treats storage paths as opaque strings and only needs three
//! operations: fetch a blob, store a blob, and mint a time-limited download
//! URL. [`BlobStore`] is the injected seam; [`LocalBlobStore`] keeps blobs
//! under a root directory (dev/test), [`S3BlobStore`] talks to any
//! S3-compatible endpoint using AWS Signature V4 over plain `reqwest`
//! (`hmac` + `sha2`, no C dependencies).
//!
//! Credentials for S3 are read from the environment:
//! `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, optional `AWS_SESSION_TOKEN`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetches the raw bytes stored at `path`.
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Stores `bytes` at `path`, overwriting any existing blob. Returns the
    /// path the blob is addressable under.
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String>;

    /// Returns a URL a client can download the blob from without further
    /// authentication, valid for a store-configured expiry window.
    async fn presigned_url(&self, path: &str) -> Result<String>;
}

/// Builds the configured blob store.
pub fn open_store(config: &StorageConfig) -> Result<Box<dyn BlobStore>> {
    match config.backend.as_str() {
        "local" => {
            let root = config
                .root
                .clone()
                .context("storage.root missing for local backend")?;
            Ok(Box::new(LocalBlobStore::new(root)))
        }
        "s3" => Ok(Box::new(S3BlobStore::from_config(config)?)),
        other => bail!("Unknown storage backend: '{}'", other),
    }
}

// ============ Local filesystem store ============

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        // Storage paths are opaque but must stay inside the root.
        if path.contains("..") || path.starts_with('/') {
            bail!("invalid storage path: {}", path);
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("Failed to read blob {}", full.display()))
    }

    async fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<String> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("Failed to write blob {}", full.display()))?;
        Ok(path.to_string())
    }

    async fn presigned_url(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        Ok(format!("file://{}", full.display()))
    }
}

// ============ S3-compatible store ============

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

pub struct S3BlobStore {
    bucket: String,
    region: String,
    prefix: String,
    endpoint_url: Option<String>,
    presign_expiry_secs: u64,
    client: reqwest::Client,
}

impl S3BlobStore {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self {
            bucket: config
                .bucket
                .clone()
                .context("storage.bucket missing for s3 backend")?,
            region: config.region.clone(),
            prefix: config.prefix.clone(),
            endpoint_url: config.endpoint_url.clone(),
            presign_expiry_secs: config.presign_expiry_secs,
            client: reqwest::Client::new(),
        })
    }

    fn host(&self) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            // Custom endpoint (MinIO, LocalStack, etc.)
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!("{}.s3.{}.amazonaws.com", self.bucket, self.region)
        }
    }

    fn object_key(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), path)
        }
    }

    /// Signs one request with SigV4 headers and returns the Authorization
    /// value plus the amz-date it was computed for.
    fn sign_headers(
        &self,
        creds: &AwsCredentials,
        method: &str,
        canonical_uri: &str,
        payload_hash: &str,
    ) -> (String, String, Vec<(String, String)>) {
        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers = vec![
            ("host".to_string(), self.host()),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method, canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&creds.secret_access_key, &date_stamp, &self.region, "s3");
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        );

        (authorization, amz_date, headers)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let creds = AwsCredentials::from_env()?;
        let key = self.object_key(path);
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}", encoded_key);
        let payload_hash = hex_sha256(b"");

        let (authorization, amz_date, _) =
            self.sign_headers(&creds, "GET", &canonical_uri, &payload_hash);

        let url = format!("https://{}{}", self.host(), canonical_uri);
        let mut req = self
            .client
            .get(&url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(ref token) = creds.session_token {
            req = req.header("x-amz-security-token", token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get s3://{}/{}: {}", self.bucket, key, e))?;

        if !resp.status().is_success() {
            bail!(
                "S3 GetObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            );
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        let creds = AwsCredentials::from_env()?;
        let key = self.object_key(path);
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}", encoded_key);
        let payload_hash = hex_sha256(bytes);

        let (authorization, amz_date, _) =
            self.sign_headers(&creds, "PUT", &canonical_uri, &payload_hash);

        let url = format!("https://{}{}", self.host(), canonical_uri);
        let mut req = self
            .client
            .put(&url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .header("Content-Type", content_type)
            .body(bytes.to_vec());
        if let Some(ref token) = creds.session_token {
            req = req.header("x-amz-security-token", token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to put s3://{}/{}: {}", self.bucket, key, e))?;

        if !resp.status().is_success() {
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            );
        }
        Ok(path.to_string())
    }

    /// Query-string presigned GET (`X-Amz-*` parameters, `UNSIGNED-PAYLOAD`).
    async fn presigned_url(&self, path: &str) -> Result<String> {
        let creds = AwsCredentials::from_env()?;
        let key = self.object_key(path);
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}", encoded_key);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);

        let mut query_params = vec![
            (
                "X-Amz-Algorithm".to_string(),
                "AWS4-HMAC-SHA256".to_string(),
            ),
            (
                "X-Amz-Credential".to_string(),
                format!("{}/{}", creds.access_key_id, credential_scope),
            ),
            ("X-Amz-Date".to_string(), amz_date.clone()),
            (
                "X-Amz-Expires".to_string(),
                self.presign_expiry_secs.to_string(),
            ),
            ("X-Amz-SignedHeaders".to_string(), "host".to_string()),
        ];
        if let Some(ref token) = creds.session_token {
            query_params.push(("X-Amz-Security-Token".to_string(), token.clone()));
        }
        query_params.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical_querystring: String = query_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_headers = format!("host:{}\n", self.host());
        let canonical_request = format!(
            "GET\n{}\n{}\n{}\nhost\nUNSIGNED-PAYLOAD",
            canonical_uri, canonical_querystring, canonical_headers
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&creds.secret_access_key, &date_stamp, &self.region, "s3");
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        Ok(format!(
            "https://{}{}?{}&X-Amz-Signature={}",
            self.host(),
            canonical_uri,
            canonical_querystring,
            signature
        ))
    }
}

// ============ SigV4 helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// kDate = HMAC("AWS4"+secret, date); kRegion = HMAC(kDate, region);
/// kService = HMAC(kRegion, service); kSigning = HMAC(kService, "aws4_request")
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode per RFC 3986: everything except `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(tmp.path().to_path_buf());
        let path = store
            .put("docs/a1/cv.pdf", b"pdf bytes", "application/pdf")
            .await
            .unwrap();
        assert_eq!(path, "docs/a1/cv.pdf");
        let bytes = store.get("docs/a1/cv.pdf").await.unwrap();
        assert_eq!(bytes, b"pdf bytes");
    }

    #[tokio::test]
    async fn local_store_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(tmp.path().to_path_buf());
        assert!(store.get("../etc/passwd").await.is_err());
        assert!(store.get("/etc/passwd").await.is_err());
    }

    #[test]
    fn uri_encode_leaves_unreserved() {
        assert_eq!(uri_encode("abc-12_3.~"), "abc-12_3.~");
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
    }

    #[test]
    fn signing_key_is_deterministic() {
        let a = derive_signing_key("secret", "20260828", "us-east-1", "s3");
        let b = derive_signing_key("secret", "20260828", "us-east-1", "s3");
        assert_eq!(a, b);
        let c = derive_signing_key("secret", "20260829", "us-east-1", "s3");
        assert_ne!(a, c);
    }
}
