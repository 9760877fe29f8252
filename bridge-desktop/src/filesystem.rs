//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

/// Tokio-based file system implementation
pub struct TokioFileSystem {
    cache_dir: PathBuf,
}

impl TokioFileSystem {
    /// Use the platform cache directory (`~/.cache/media-cache` on Linux)
    pub fn new() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("media-cache");

        Self { cache_dir }
    }

    /// Use a caller-chosen cache root
    pub fn with_cache_directory(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    fn map_io_error(path: &Path, e: std::io::Error) -> BridgeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            BridgeError::NotFound(path.display().to_string())
        } else {
            BridgeError::Io(e)
        }
    }

    fn unix_seconds(time: std::io::Result<SystemTime>) -> Option<i64> {
        time.ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
    }

    /// Sibling path used while a write is in progress
    fn partial_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.partial", name))
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_cache_directory(&self) -> Result<PathBuf> {
        if !fs::try_exists(&self.cache_dir).await.unwrap_or(false) {
            fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(|e| Self::map_io_error(&self.cache_dir, e))?;
            debug!(path = ?self.cache_dir, "Created cache directory");
        }
        Ok(self.cache_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        Ok(FileMetadata {
            size: metadata.len(),
            created_at: Self::unix_seconds(metadata.created()),
            modified_at: Self::unix_seconds(metadata.modified()),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn read_range(&self, path: &Path, offset: u64, length: u64) -> Result<Bytes> {
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        let mut buf = Vec::with_capacity(length as usize);
        file.take(length)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        debug!(path = ?path, offset, size = buf.len(), "Read file range");
        Ok(Bytes::from(buf))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }

        let partial = Self::partial_path(path);
        let mut file = fs::File::create(&partial)
            .await
            .map_err(|e| Self::map_io_error(&partial, e))?;
        file.write_all(data.as_ref())
            .await
            .map_err(|e| Self::map_io_error(&partial, e))?;
        file.sync_all()
            .await
            .map_err(|e| Self::map_io_error(&partial, e))?;
        drop(file);

        if let Err(e) = fs::rename(&partial, path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(Self::map_io_error(path, e));
        }

        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, "Deleted directory");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Self::map_io_error(path, e))?
        {
            entries.push(entry.path());
        }

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }
}
