//! Blob storage collaborator
//!
//! Documents keep only a `file_url` and the SHA-256 captured at upload; the
//! bytes themselves are kept by a [`BlobStore`].

use crate::digest::sha256_hex;
use crate::error::{IntegrityError, IntegrityResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use tradeflow_workflow::Upload;

/// Storage for uploaded document files
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Store `bytes`, returning their hash and the url to read them back
    async fn put(&self, bytes: &[u8]) -> IntegrityResult<Upload>;

    /// Read the bytes behind `file_url`
    async fn get(&self, file_url: &str) -> IntegrityResult<Vec<u8>>;
}

/// Content-addressed files under a root directory.
///
/// The url of a blob is its hash; the file lives at `<root>/<hash>`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a url to a path, refusing anything outside the root
    pub fn path_of(&self, file_url: &str) -> IntegrityResult<PathBuf> {
        let plain = !file_url.is_empty()
            && file_url
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !plain {
            return Err(IntegrityError::io(
                file_url,
                io::Error::new(io::ErrorKind::InvalidInput, "not a blob key"),
            ));
        }
        Ok(self.root.join(file_url))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn put(&self, bytes: &[u8]) -> IntegrityResult<Upload> {
        let hash = sha256_hex(bytes);
        let path = self.path_of(&hash)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| IntegrityError::io(&hash, e))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| IntegrityError::io(&hash, e))?;

        Ok(Upload::new(hash.clone(), hash))
    }

    async fn get(&self, file_url: &str) -> IntegrityResult<Vec<u8>> {
        let path = self.path_of(file_url)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| IntegrityError::io(file_url, e))
    }
}

/// In-process blob store (for testing)
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    failing_reads: AtomicU32,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite stored bytes without touching the recorded hash
    pub fn tamper(&self, file_url: &str, bytes: &[u8]) {
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(file_url.to_string(), bytes.to_vec());
    }

    pub fn remove(&self, file_url: &str) {
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(file_url);
    }

    /// Make the next `count` reads fail with an I/O error
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, bytes: &[u8]) -> IntegrityResult<Upload> {
        let hash = sha256_hex(bytes);
        let url = format!("mem-{}", hash);
        self.tamper(&url, bytes);
        Ok(Upload::new(hash, url))
    }

    async fn get(&self, file_url: &str) -> IntegrityResult<Vec<u8>> {
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(IntegrityError::io(
                file_url,
                io::Error::new(io::ErrorKind::TimedOut, "injected read failure"),
            ));
        }

        self.blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(file_url)
            .cloned()
            .ok_or_else(|| {
                IntegrityError::io(file_url, io::Error::new(io::ErrorKind::NotFound, "no such blob"))
            })
    }
}
