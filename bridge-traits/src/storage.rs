//! Storage and File System Abstractions
//!
//! Provides a platform-agnostic trait for the blob operations the chunk
//! store needs: atomic writes, sub-range reads and enumeration.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O so the cache can run against the native filesystem
/// or an in-memory fake in tests.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn store_blob(fs: &dyn FileSystemAccess, data: Bytes) -> Result<()> {
///     let dir = fs.get_cache_directory().await?.join("media_cache");
///     fs.create_dir_all(&dir).await?;
///     fs.write_file(&dir.join("1700000000000"), data).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's cache directory
    ///
    /// This directory is suitable for files that can be deleted by the
    /// system when storage is low.
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Read `length` bytes starting at `offset`.
    ///
    /// Returns fewer bytes only when the file ends first.
    async fn read_range(&self, path: &Path, offset: u64, length: u64) -> Result<Bytes>;

    /// Write data to a file atomically.
    ///
    /// Readers observe either the previous contents or all of `data`,
    /// never a partially written file.
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Delete a directory and all its contents
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// List regular files in a directory with their metadata, oldest
    /// modification first. Entries removed during the scan are skipped.
    async fn list_files(&self, path: &Path) -> Result<Vec<(PathBuf, FileMetadata)>> {
        let mut files = Vec::new();
        for entry in self.list_directory(path).await? {
            let metadata = match self.metadata(&entry).await {
                Ok(metadata) => metadata,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if !metadata.is_directory {
                files.push((entry, metadata));
            }
        }
        files.sort_by_key(|(_, metadata)| metadata.modified_at.unwrap_or(0));
        Ok(files)
    }

    /// Calculate total size of a directory recursively. Entries removed
    /// during the scan count as zero.
    async fn directory_size(&self, path: &Path) -> Result<u64> {
        let mut total = 0u64;
        let entries = self.list_directory(path).await?;

        for entry in entries {
            let metadata = match self.metadata(&entry).await {
                Ok(metadata) => metadata,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if metadata.is_directory {
                total += self.directory_size(&entry).await?;
            } else {
                total += metadata.size;
            }
        }

        Ok(total)
    }
}
