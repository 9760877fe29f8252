//! Cache statistics and trim reports

use serde::{Deserialize, Serialize};

/// Snapshot of what the cache holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Resources with a content info row
    pub resource_count: u64,

    /// Chunk records across all resources
    pub chunk_count: u64,

    /// Sum of chunk record lengths
    pub total_bytes: u64,

    /// Configured cap in bytes
    pub max_bytes: u64,
}

impl CacheStats {
    pub fn usage_percent(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.max_bytes as f64) * 100.0
    }

    /// True once usage reaches the cap, the point at which a trim evicts.
    pub fn is_over_limit(&self) -> bool {
        self.total_bytes >= self.max_bytes
    }

    pub fn average_chunk_size(&self) -> u64 {
        if self.chunk_count == 0 {
            0
        } else {
            self.total_bytes / self.chunk_count
        }
    }
}

/// Outcome of one trim pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimReport {
    /// Bytes found on disk before evicting
    pub scanned_bytes: u64,

    /// Resources removed
    pub evicted: usize,

    /// Chunk bytes released by the evicted resources
    pub freed_bytes: u64,
}

impl TrimReport {
    pub fn is_noop(&self) -> bool {
        self.evicted == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_percent() {
        let stats = CacheStats {
            resource_count: 2,
            chunk_count: 4,
            total_bytes: 50,
            max_bytes: 200,
        };
        assert_eq!(stats.usage_percent(), 25.0);
        assert_eq!(stats.average_chunk_size(), 12);
        assert!(!stats.is_over_limit());
    }

    #[test]
    fn test_empty_stats() {
        let stats = CacheStats::default();
        assert_eq!(stats.usage_percent(), 0.0);
        assert_eq!(stats.average_chunk_size(), 0);
        assert!(stats.is_over_limit());
    }
}
