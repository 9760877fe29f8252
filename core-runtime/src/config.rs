//! # Core Configuration Module
//!
//! Builder for the settings and host bridges a media cache context starts
//! from.
//!
//! ## Overview
//!
//! [`CoreConfig`] is built once at startup through [`CoreConfigBuilder`],
//! which validates eagerly so that a misconfigured host fails before any
//! database or directory is touched.
//!
//! ## Bridges
//!
//! - `HttpClient` - ranged GETs against the origin (desktop default: reqwest)
//! - `FileSystemAccess` - chunk file I/O (desktop default: tokio fs rooted at
//!   `cache_dir`)
//!
//! Without the `desktop-shims` feature both bridges must be injected; a
//! missing one is reported as [`Error::CapabilityMissing`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/media_cache.db")
//!     .cache_dir("/path/to/cache")
//!     .cache_size_mb(200)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{FileSystemAccess, HttpClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default cap on stored chunk bytes
pub const DEFAULT_CACHE_SIZE_MB: u64 = 100;

/// Default content info time-to-live
pub const DEFAULT_CONTENT_INFO_TTL: Duration = Duration::from_secs(3600);

const MAX_CACHE_SIZE_MB: u64 = 100_000;

/// Settings and bridges for one media cache context.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Host cache root; chunk files live in a directory below it
    pub cache_dir: PathBuf,

    /// Maximum cache size in megabytes
    pub cache_size_mb: u64,

    /// How long probed content info is trusted
    pub content_info_ttl: Duration,

    /// Evict in the background after every save
    pub auto_trim: bool,

    /// Buffer of the cache event bus
    pub event_buffer_size: usize,

    pub http_client: Arc<dyn HttpClient>,

    pub file_system: Arc<dyn FileSystemAccess>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("cache_dir", &self.cache_dir)
            .field("cache_size_mb", &self.cache_size_mb)
            .field("content_info_ttl", &self.content_info_ttl)
            .field("auto_trim", &self.auto_trim)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Checks paths, size cap and TTL.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.cache_size_mb == 0 {
            return Err(Error::Config(
                "Cache size must be greater than 0 MB".to_string(),
            ));
        }

        if self.cache_size_mb > MAX_CACHE_SIZE_MB {
            return Err(Error::Config(format!(
                "Cache size exceeds maximum of {} MB",
                MAX_CACHE_SIZE_MB
            )));
        }

        if self.content_info_ttl.is_zero() {
            return Err(Error::Config(
                "Content info TTL must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature to use the default. \
             Other hosts: inject a platform implementation through the builder.",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing("HttpClient", "fetching media ranges"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(cache_dir: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    Ok(Arc::new(TokioFileSystem::with_cache_directory(
        cache_dir.to_path_buf(),
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_cache_dir: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing("FileSystemAccess", "storing chunk files"))
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    cache_size_mb: Option<u64>,
    content_info_ttl: Option<Duration>,
    auto_trim: Option<bool>,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/media_cache.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Default: 100 MB
    pub fn cache_size_mb(mut self, size_mb: u64) -> Self {
        self.cache_size_mb = Some(size_mb);
        self
    }

    /// Default: one hour
    pub fn content_info_ttl(mut self, ttl: Duration) -> Self {
        self.content_info_ttl = Some(ttl);
        self
    }

    pub fn auto_trim(mut self, enabled: bool) -> Self {
        self.auto_trim = Some(enabled);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Inject the HTTP client. Falls back to reqwest under `desktop-shims`.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Inject file system access. Falls back to tokio fs rooted at
    /// `cache_dir` under `desktop-shims`.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Resolve defaults and validate.
    ///
    /// Fails when a path is missing, a value is out of range, or a bridge
    /// is neither injected nor available as a desktop default.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(&cache_dir)?,
        };

        let config = CoreConfig {
            database_path,
            cache_dir,
            cache_size_mb: self.cache_size_mb.unwrap_or(DEFAULT_CACHE_SIZE_MB),
            content_info_ttl: self.content_info_ttl.unwrap_or(DEFAULT_CONTENT_INFO_TTL),
            auto_trim: self.auto_trim.unwrap_or(true),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            file_system,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::storage::FileMetadata;
    use bytes::Bytes;
    use std::path::Path;

    struct NullHttpClient;

    #[async_trait]
    impl HttpClient for NullHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(bridge_traits::BridgeError::NotAvailable("offline".to_string()))
        }
    }

    struct NullFileSystem;

    #[async_trait]
    impl FileSystemAccess for NullFileSystem {
        async fn get_cache_directory(&self) -> BridgeResult<PathBuf> {
            Ok(PathBuf::from("/tmp"))
        }
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
            Err(bridge_traits::BridgeError::NotFound(path.display().to_string()))
        }
        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
            Err(bridge_traits::BridgeError::NotFound(path.display().to_string()))
        }
        async fn read_range(&self, path: &Path, _offset: u64, _length: u64) -> BridgeResult<Bytes> {
            Err(bridge_traits::BridgeError::NotFound(path.display().to_string()))
        }
        async fn write_file(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn list_directory(&self, _path: &Path) -> BridgeResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    fn injected() -> CoreConfigBuilder {
        CoreConfig::builder()
            .http_client(Arc::new(NullHttpClient))
            .file_system(Arc::new(NullFileSystem))
    }

    #[test]
    fn test_builder_defaults() {
        let config = injected()
            .database_path("/tmp/media_cache.db")
            .cache_dir("/tmp/cache")
            .build()
            .unwrap();

        assert_eq!(config.cache_size_mb, DEFAULT_CACHE_SIZE_MB);
        assert_eq!(config.content_info_ttl, DEFAULT_CONTENT_INFO_TTL);
        assert!(config.auto_trim);
        assert_eq!(
            config.event_buffer_size,
            crate::events::DEFAULT_EVENT_BUFFER_SIZE
        );
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = injected().cache_dir("/tmp/cache").build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Database path")));
    }

    #[test]
    fn test_builder_requires_cache_dir() {
        let result = injected().database_path("/tmp/media_cache.db").build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Cache directory")));
    }

    #[test]
    fn test_validate_rejects_zero_cache_size() {
        let result = injected()
            .database_path("/tmp/media_cache.db")
            .cache_dir("/tmp/cache")
            .cache_size_mb(0)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_excessive_cache_size() {
        let result = injected()
            .database_path("/tmp/media_cache.db")
            .cache_dir("/tmp/cache")
            .cache_size_mb(MAX_CACHE_SIZE_MB + 1)
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("maximum")));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let result = injected()
            .database_path("/tmp/media_cache.db")
            .cache_dir("/tmp/cache")
            .content_info_ttl(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = injected()
            .database_path(PathBuf::from("/tmp/media_cache.db"))
            .cache_dir("/tmp/cache")
            .cache_size_mb(512)
            .content_info_ttl(Duration::from_secs(60))
            .auto_trim(false)
            .event_buffer_size(8)
            .build()
            .unwrap();

        assert_eq!(config.cache_size_mb, 512);
        assert_eq!(config.content_info_ttl, Duration::from_secs(60));
        assert!(!config.auto_trim);
        assert_eq!(config.event_buffer_size, 8);
        assert!(format!("{:?}", config).contains("HttpClient { ... }"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let config = CoreConfig::builder()
            .database_path("/tmp/media_cache.db")
            .cache_dir("/tmp/cache")
            .build();
        assert!(config.is_ok());
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_bridge_is_capability_error() {
        let result = CoreConfig::builder()
            .database_path("/tmp/media_cache.db")
            .cache_dir("/tmp/cache")
            .file_system(Arc::new(NullFileSystem))
            .build();
        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "HttpClient"
        ));
    }
}
