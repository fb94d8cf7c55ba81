//! Blob-store seam: opaque ciphertext by path, short-lived signed GETs.
//!
//! The production deployment fronts an object store; [`MemoryBlobStore`]
//! backs the test suite and [`FsBlobStore`] backs single-host embedders with
//! crash-safe temp-file writes. Content is always `application/octet-stream`;
//! nothing in this module inspects blob bytes.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob already exists at {0}")]
    AlreadyExists(String),

    #[error("no blob at {0}")]
    NotFound(String),

    #[error("invalid blob path")]
    InvalidPath,

    #[error("signed url rejected")]
    BadSignedUrl,

    #[error("signed url expired")]
    SignedUrlExpired,

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// A dispensed GET capability: the URL embeds its own expiry and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: u64,
}

pub trait BlobStore: Send + Sync {
    /// Write a new blob; fails with `AlreadyExists` if the path is taken.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError>;
    /// Write a blob, replacing any existing content at the path.
    fn put_upsert(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError>;
    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError>;
    fn delete(&self, path: &str) -> Result<(), BlobError>;
    /// Issue a GET URL valid for `ttl_secs` from `now`.
    fn signed_get(&self, path: &str, ttl_secs: u64, now: u64) -> Result<SignedUrl, BlobError>;
}

fn sign(key: &[u8], path: &str, expires_at: u64) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(path.as_bytes());
    mac.update(&expires_at.to_le_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn parse_signed(url: &str) -> Option<(&str, u64, &str)> {
    let (rest, query) = url.split_once('?')?;
    let path = rest.splitn(4, '/').nth(3)?;
    let mut expires_at = None;
    let mut sig = None;
    for pair in query.split('&') {
        match pair.split_once('=')? {
            ("expires", v) => expires_at = v.parse().ok(),
            ("sig", v) => sig = Some(v),
            _ => {}
        }
    }
    Some((path, expires_at?, sig?))
}

/// In-process blob store with HMAC-signed pseudo-URLs.
pub struct MemoryBlobStore {
    bucket: String,
    signing_key: [u8; 32],
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            signing_key: crate::crypto::random_bytes::<32>(),
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a previously dispensed signed URL, enforcing its signature and
    /// its own expiry. Revoking a link does not invalidate URLs already
    /// minted; they die on their `expires_at` alone.
    pub fn fetch_signed(&self, url: &str, now: u64) -> Result<Vec<u8>, BlobError> {
        let (path, expires_at, sig) = parse_signed(url).ok_or(BlobError::BadSignedUrl)?;
        let expected = sign(&self.signing_key, path, expires_at);
        if !bool::from(expected.as_bytes().ct_eq(sig.as_bytes())) {
            return Err(BlobError::BadSignedUrl);
        }
        if expires_at <= now {
            return Err(BlobError::SignedUrlExpired);
        }
        self.get(path)
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let mut blobs = self.blobs.write().expect("blob lock poisoned");
        if blobs.contains_key(path) {
            return Err(BlobError::AlreadyExists(path.to_string()));
        }
        blobs.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn put_upsert(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        self.blobs
            .write()
            .expect("blob lock poisoned")
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .read()
            .expect("blob lock poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }

    fn delete(&self, path: &str) -> Result<(), BlobError> {
        self.blobs
            .write()
            .expect("blob lock poisoned")
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }

    fn signed_get(&self, path: &str, ttl_secs: u64, now: u64) -> Result<SignedUrl, BlobError> {
        if !self.blobs.read().expect("blob lock poisoned").contains_key(path) {
            return Err(BlobError::NotFound(path.to_string()));
        }
        let expires_at = now + ttl_secs;
        let sig = sign(&self.signing_key, path, expires_at);
        Ok(SignedUrl {
            url: format!("memory://{}/{path}?expires={expires_at}&sig={sig}", self.bucket),
            expires_at,
        })
    }
}

/// Filesystem-backed blob store for single-host deployments. Writes use the
/// write-temp, flush, atomic-rename pattern.
pub struct FsBlobStore {
    root: PathBuf,
    bucket: String,
    signing_key: [u8; 32],
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
            signing_key: crate::crypto::random_bytes::<32>(),
        }
    }

    /// Blob paths are store-relative and must not escape the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        if path.is_empty()
            || path.starts_with('/')
            || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(BlobError::InvalidPath);
        }
        Ok(self.root.join(path))
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<(), BlobError> {
        let parent = target.parent().ok_or(BlobError::InvalidPath)?;
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.as_file_mut().write_all(bytes)?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(target).map_err(|err| BlobError::Io(err.error))?;
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        if target.exists() {
            return Err(BlobError::AlreadyExists(path.to_string()));
        }
        self.write_atomic(&target, bytes)
    }

    fn put_upsert(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        self.write_atomic(&target, bytes)
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let target = self.resolve(path)?;
        match fs::read(&target) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(path.to_string()))
            }
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    fn delete(&self, path: &str) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(path.to_string()))
            }
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    fn signed_get(&self, path: &str, ttl_secs: u64, now: u64) -> Result<SignedUrl, BlobError> {
        let target = self.resolve(path)?;
        if !target.exists() {
            return Err(BlobError::NotFound(path.to_string()));
        }
        let expires_at = now + ttl_secs;
        let sig = sign(&self.signing_key, path, expires_at);
        Ok(SignedUrl {
            url: format!("blob://{}/{path}?expires={expires_at}&sig={sig}", self.bucket),
            expires_at,
        })
    }
}
