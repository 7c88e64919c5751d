use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::BackendResult;
use crate::traits::{check_path, Backend, BlobReader};

/// In-memory, HashMap-based backend.
///
/// Intended for tests and embedding. When constructed with
/// [`InMemoryBackend::with_redirects`] it also simulates direct transfer:
/// `redirect_for_write` hands out a `{base}/upload/{path}` URL and the blob
/// only appears once [`InMemoryBackend::complete_upload`] is called.
pub struct InMemoryBackend {
    blobs: RwLock<HashMap<String, Bytes>>,
    redirect_base: Option<String>,
    pending_uploads: RwLock<HashSet<String>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            redirect_base: None,
            pending_uploads: RwLock::new(HashSet::new()),
        }
    }

    /// Create a backend that issues redirect URLs below `base`.
    pub fn with_redirects(base: impl Into<String>) -> Self {
        Self {
            redirect_base: Some(base.into().trim_end_matches('/').to_string()),
            ..Self::new()
        }
    }

    /// Finish a direct upload previously started with `redirect_for_write`.
    ///
    /// Returns `false` if no upload was pending for `path`.
    pub fn complete_upload(&self, path: &str, data: impl Into<Bytes>) -> bool {
        if !self.pending_uploads.write().expect("lock poisoned").remove(path) {
            return false;
        }
        self.insert(path, data);
        true
    }

    /// Paths with an upload URL issued but not yet completed.
    pub fn pending_uploads(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .pending_uploads
            .read()
            .expect("lock poisoned")
            .iter()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Store bytes directly, bypassing the async interface.
    pub fn insert(&self, path: &str, data: impl Into<Bytes>) {
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(path.to_string(), data.into());
    }

    /// Fetch bytes directly, bypassing the async interface.
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.blobs.read().expect("lock poisoned").get(path).cloned()
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the backend is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }

    /// Return a sorted list of all stored paths.
    pub fn all_paths(&self) -> Vec<String> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut paths: Vec<String> = map.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn read(&self, path: &str) -> BackendResult<Option<BlobReader>> {
        check_path(path)?;
        Ok(self
            .get(path)
            .map(|data| Box::new(Cursor::new(data)) as BlobReader))
    }

    async fn read_range(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> BackendResult<Option<BlobReader>> {
        check_path(path)?;
        Ok(self.get(path).map(|data| {
            let len = data.len() as u64;
            let start = offset.min(len);
            let end = offset.saturating_add(length).min(len);
            Box::new(Cursor::new(data.slice(start as usize..end as usize))) as BlobReader
        }))
    }

    async fn write(&self, path: &str, data: &mut (dyn AsyncRead + Send + Unpin)) -> BackendResult<()> {
        check_path(path)?;
        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        self.insert(path, buf);
        Ok(())
    }

    async fn delete(&self, path: &str) -> BackendResult<bool> {
        check_path(path)?;
        Ok(self.blobs.write().expect("lock poisoned").remove(path).is_some())
    }

    async fn exists(&self, path: &str) -> BackendResult<bool> {
        check_path(path)?;
        Ok(self.blobs.read().expect("lock poisoned").contains_key(path))
    }

    async fn redirect_for_read(&self, path: &str) -> BackendResult<Option<String>> {
        check_path(path)?;
        match &self.redirect_base {
            Some(base) if self.get(path).is_some() => Ok(Some(format!("{base}/download/{path}"))),
            _ => Ok(None),
        }
    }

    async fn redirect_for_write(&self, path: &str) -> BackendResult<Option<String>> {
        check_path(path)?;
        let Some(base) = &self.redirect_base else {
            return Ok(None);
        };
        self.pending_uploads
            .write()
            .expect("lock poisoned")
            .insert(path.to_string());
        Ok(Some(format!("{base}/upload/{path}")))
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("blob_count", &self.len())
            .field("redirects", &self.redirect_base.is_some())
            .finish()
    }
}
