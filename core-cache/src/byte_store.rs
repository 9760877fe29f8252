//! Chunk file storage.
//!
//! Every chunk lives in its own immutable file inside one directory under
//! the host cache root. File names are a millisecond timestamp followed by a
//! random UUID, so two writes never collide even within the same
//! millisecond.

use bridge_traits::storage::{FileMetadata, FileSystemAccess};
use bridge_traits::time::Clock;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{CacheError, Result};

const CHUNK_EXTENSION: &str = "chunk";

/// A chunk file found on disk.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub file_name: String,
    pub metadata: FileMetadata,
}

pub struct ByteStore {
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    root: PathBuf,
}

impl ByteStore {
    /// Resolve `directory` under the host cache root and create it.
    #[instrument(skip(fs, clock))]
    pub async fn open(
        fs: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
        directory: &str,
    ) -> Result<Self> {
        let root = fs.get_cache_directory().await?.join(directory);
        let store = Self { fs, clock, root };
        store.ensure_directory().await?;
        debug!(root = ?store.root, "Byte store ready");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub async fn ensure_directory(&self) -> Result<()> {
        if !self.fs.exists(&self.root).await? {
            self.fs.create_dir_all(&self.root).await?;
        }
        Ok(())
    }

    fn new_file_name(&self) -> String {
        format!(
            "{}-{}.{}",
            self.clock.unix_timestamp_millis(),
            Uuid::new_v4().simple(),
            CHUNK_EXTENSION
        )
    }

    /// Write `data` to a fresh file and return its name.
    pub async fn write(&self, data: Bytes) -> Result<String> {
        let file_name = self.new_file_name();
        let size = data.len();
        self.fs.write_file(&self.path_of(&file_name), data).await?;
        debug!(file = %file_name, size, "Wrote chunk file");
        Ok(file_name)
    }

    /// Read `length` bytes at `offset` within one chunk file.
    ///
    /// A missing or truncated file is reported as
    /// [`CacheError::LocalFileMissing`].
    pub async fn read(&self, file_name: &str, offset: u64, length: u64) -> Result<Bytes> {
        let data = self
            .fs
            .read_range(&self.path_of(file_name), offset, length)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    CacheError::LocalFileMissing {
                        file_name: file_name.to_string(),
                    }
                } else {
                    CacheError::from(e)
                }
            })?;

        if (data.len() as u64) < length {
            warn!(
                file = %file_name,
                offset,
                expected = length,
                actual = data.len(),
                "Chunk file shorter than its record"
            );
            return Err(CacheError::LocalFileMissing {
                file_name: file_name.to_string(),
            });
        }

        Ok(data)
    }

    /// Delete one file. A file that is already gone is not an error.
    pub async fn delete(&self, file_name: &str) -> Result<()> {
        match self.fs.delete_file(&self.path_of(file_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(file = %file_name, "Chunk file already removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort deletion of several files; returns how many were removed.
    pub async fn delete_many<I, S>(&self, file_names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = 0;
        for name in file_names {
            match self.delete(name.as_ref()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = %name.as_ref(), error = %e, "Failed to delete chunk file"),
            }
        }
        removed
    }

    /// Files in the store, oldest modification first.
    pub async fn list(&self) -> Result<Vec<StoredFile>> {
        let files = self.fs.list_files(&self.root).await?;
        Ok(files
            .into_iter()
            .filter_map(|(path, metadata)| {
                let file_name = path.file_name()?.to_str()?.to_string();
                Some(StoredFile {
                    file_name,
                    metadata,
                })
            })
            .collect())
    }

    /// Bytes on disk under the store directory.
    pub async fn total_size(&self) -> Result<u64> {
        if !self.fs.exists(&self.root).await? {
            return Ok(0);
        }
        Ok(self.fs.directory_size(&self.root).await?)
    }

    /// Remove every file and recreate the empty directory.
    pub async fn delete_all(&self) -> Result<()> {
        if self.fs.exists(&self.root).await? {
            self.fs.delete_dir_all(&self.root).await?;
        }
        self.fs.create_dir_all(&self.root).await?;
        Ok(())
    }
}
