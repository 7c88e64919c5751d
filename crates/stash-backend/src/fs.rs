use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::error::BackendResult;
use crate::traits::{check_path, Backend, BlobReader};

const TMP_DIR: &str = ".tmp";

/// One file per blob below a root directory.
///
/// Writes go to `{root}/.tmp/` first and are renamed into place, so a
/// partially written blob is never visible to readers.
#[derive(Debug, Clone)]
pub struct FileSystemBackend {
    root: PathBuf,
}

impl FileSystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> BackendResult<PathBuf> {
        check_path(path)?;
        Ok(self.root.join(path))
    }

    fn tmp_path(&self) -> PathBuf {
        let nonce: u64 = rand::random();
        self.root.join(TMP_DIR).join(format!("{nonce:016x}.partial"))
    }
}

fn not_found_as_none<T>(result: std::io::Result<T>) -> std::io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl Backend for FileSystemBackend {
    async fn read(&self, path: &str) -> BackendResult<Option<BlobReader>> {
        let full = self.full_path(path)?;
        let file = not_found_as_none(fs::File::open(&full).await)?;
        Ok(file.map(|f| Box::new(f) as BlobReader))
    }

    async fn read_range(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> BackendResult<Option<BlobReader>> {
        let full = self.full_path(path)?;
        let Some(mut file) = not_found_as_none(fs::File::open(&full).await)? else {
            return Ok(None);
        };
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(Some(Box::new(file.take(length))))
    }

    async fn write(&self, path: &str, data: &mut (dyn AsyncRead + Send + Unpin)) -> BackendResult<()> {
        let full = self.full_path(path)?;
        let tmp = self.tmp_path();
        if let Some(dir) = tmp.parent() {
            fs::create_dir_all(dir).await?;
        }
        if let Some(dir) = full.parent() {
            fs::create_dir_all(dir).await?;
        }

        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            let written = tokio::io::copy(data, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &full).await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        match result {
            Ok(written) => {
                debug!(path, bytes = written, "blob written");
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                Err(e.into())
            }
        }
    }

    async fn delete(&self, path: &str) -> BackendResult<bool> {
        let full = self.full_path(path)?;
        Ok(not_found_as_none(fs::remove_file(&full).await)?.is_some())
    }

    async fn exists(&self, path: &str) -> BackendResult<bool> {
        let full = self.full_path(path)?;
        Ok(fs::try_exists(&full).await?)
    }
}
