use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::BackendResult;

/// A stream of blob bytes.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Byte-range storage for blobs.
///
/// All implementations must satisfy these invariants:
/// - Paths are relative, `/`-separated and never contain `..`.
/// - A missing blob is reported as `Ok(None)` / `Ok(false)`, not as an error.
/// - A write is either fully visible to later reads or not visible at all.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open a blob for reading.
    async fn read(&self, path: &str) -> BackendResult<Option<BlobReader>>;

    /// Open `length` bytes of a blob starting at `offset`.
    ///
    /// A range extending past the end of the blob is truncated to the blob
    /// size; a range starting past the end yields an empty stream.
    async fn read_range(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> BackendResult<Option<BlobReader>>;

    /// Store a blob, replacing any previous content at `path`.
    async fn write(&self, path: &str, data: &mut (dyn AsyncRead + Send + Unpin)) -> BackendResult<()>;

    /// Delete a blob. Returns `true` if the blob existed.
    async fn delete(&self, path: &str) -> BackendResult<bool>;

    /// Check whether a blob exists.
    async fn exists(&self, path: &str) -> BackendResult<bool>;

    /// URL the caller can download the blob from directly, if supported.
    async fn redirect_for_read(&self, _path: &str) -> BackendResult<Option<String>> {
        Ok(None)
    }

    /// One-time URL the caller can upload the blob to directly, if supported.
    ///
    /// The blob does not exist until the caller completes the upload.
    async fn redirect_for_write(&self, _path: &str) -> BackendResult<Option<String>> {
        Ok(None)
    }
}

/// Drain a blob stream into memory.
pub async fn read_to_bytes(mut reader: BlobReader) -> std::io::Result<Bytes> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Reject absolute paths and parent traversal.
pub(crate) fn check_path(path: &str) -> BackendResult<()> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|c| c.is_empty() || c == "." || c == "..");
    if bad {
        return Err(crate::error::BackendError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_path_rules() {
        assert!(check_path("a/b/c.blob").is_ok());
        assert!(check_path("c.blob").is_ok());
        for bad in ["", "/abs", "a/../b", "a//b", "./a", "a\\b", "trailing/"] {
            assert!(check_path(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn read_to_bytes_drains_stream() {
        let reader: BlobReader = Box::new(std::io::Cursor::new(b"payload".to_vec()));
        assert_eq!(read_to_bytes(reader).await.unwrap(), Bytes::from_static(b"payload"));
    }
}
