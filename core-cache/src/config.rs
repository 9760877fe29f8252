//! Cache configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Configuration for the media cache manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Soft cap on chunk bytes on disk, in MiB (default: 100)
    pub max_cache_size_mb: u64,

    /// How long a content info row stays fresh, in seconds (default: 3600)
    pub content_info_ttl_secs: u64,

    /// Resources evicted per trim pass (default: 5)
    pub trim_batch_size: usize,

    /// Directory for chunk files, relative to the host cache root
    pub cache_directory: String,

    /// Extra headers sent with content info probes
    pub content_info_headers: HashMap<String, String>,

    /// Extra headers sent with data fetches
    pub data_headers: HashMap<String, String>,

    /// Bytes requested by the content info probe (default: 2)
    pub content_info_probe_length: u64,

    /// Schedule a background trim after every save (default: true)
    pub auto_trim: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size_mb: 100,
            content_info_ttl_secs: 3600,
            trim_batch_size: 5,
            cache_directory: "media_cache".to_string(),
            content_info_headers: HashMap::new(),
            data_headers: HashMap::new(),
            content_info_probe_length: 2,
            auto_trim: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size_mb(mut self, mb: u64) -> Self {
        self.max_cache_size_mb = mb;
        self
    }

    pub fn with_content_info_ttl(mut self, ttl: Duration) -> Self {
        self.content_info_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_trim_batch_size(mut self, count: usize) -> Self {
        self.trim_batch_size = count;
        self
    }

    pub fn with_cache_directory(mut self, dir: impl Into<String>) -> Self {
        self.cache_directory = dir.into();
        self
    }

    pub fn with_content_info_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.content_info_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_data_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_auto_trim(mut self, enabled: bool) -> Self {
        self.auto_trim = enabled;
        self
    }

    pub fn content_info_ttl(&self) -> Duration {
        Duration::from_secs(self.content_info_ttl_secs)
    }

    /// Cap in bytes.
    pub fn max_cache_size_bytes(&self) -> u64 {
        self.max_cache_size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_cache_size_mb == 0 {
            return Err("max_cache_size_mb must be greater than 0".to_string());
        }

        if self.content_info_ttl_secs == 0 {
            return Err("content_info_ttl_secs must be greater than 0".to_string());
        }

        if self.trim_batch_size == 0 {
            return Err("trim_batch_size must be at least 1".to_string());
        }

        if self.cache_directory.is_empty() {
            return Err("cache_directory cannot be empty".to_string());
        }

        if self.content_info_probe_length == 0 {
            return Err("content_info_probe_length must be at least 1".to_string());
        }

        Ok(())
    }
}
