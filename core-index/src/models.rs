//! Domain models for the metadata index.
//!
//! Offsets and lengths are `u64` in memory and SQLite `INTEGER` (i64) on
//! disk. Timestamps are Unix milliseconds.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque identifier of a logical remote resource.
///
/// Joins content info, chunk records and backing files. Callers may supply
/// their own; otherwise [`ResourceId::from_url`] derives one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Lowercase hex SHA-256 of the URL string
    pub fn from_url(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// =============================================================================
// Byte ranges
// =============================================================================

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// `end` below `start` collapses to an empty range at `start`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Limit the range to `[0, limit)`.
    pub fn clamp_to(&self, limit: u64) -> Self {
        Self::new(self.start.min(limit), self.end.min(limit))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// =============================================================================
// Records
// =============================================================================

/// Resource-level metadata learned from the first ranged response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub resource_id: ResourceId,
    pub mime_type: String,
    pub content_length: u64,
    pub is_byte_range_supported: bool,
    pub updated_at: i64,
}

impl ContentInfo {
    /// True while no older than `ttl` at `now_millis`.
    pub fn is_fresh(&self, now_millis: i64, ttl: Duration) -> bool {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_millis.saturating_sub(self.updated_at) <= ttl_millis
    }
}

/// One contiguous run of downloaded bytes, stored in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub resource_id: ResourceId,
    pub start_offset: u64,
    pub length: u64,
    pub file_name: String,
    pub updated_at: i64,
}

impl ChunkRecord {
    /// Exclusive end offset
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.length
    }

    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.start_offset, self.end_offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_from_url_is_stable_hex() {
        let a = ResourceId::from_url("https://cdn.example.com/song1.mp3");
        let b = ResourceId::from_url("https://cdn.example.com/song1.mp3");
        let c = ResourceId::from_url("https://cdn.example.com/song2.mp3");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_byte_range() {
        let range = ByteRange::new(10, 20);
        assert_eq!(range.len(), 10);
        assert!(range.contains(10));
        assert!(!range.contains(20));
        assert_eq!(range.to_string(), "[10, 20)");

        assert!(ByteRange::new(5, 2).is_empty());
        assert_eq!(ByteRange::new(90, 150).clamp_to(100), ByteRange::new(90, 100));
        assert!(ByteRange::new(120, 150).clamp_to(100).is_empty());
    }

    #[test]
    fn test_content_info_freshness() {
        let info = ContentInfo {
            resource_id: "song1".into(),
            mime_type: "audio/mpeg".to_string(),
            content_length: 1000,
            is_byte_range_supported: true,
            updated_at: 1_000_000,
        };
        let hour = Duration::from_secs(3600);

        assert!(info.is_fresh(1_000_000, hour));
        assert!(info.is_fresh(1_000_000 + 3_599_999, hour));
        assert!(info.is_fresh(1_000_000 + 3_600_000, hour));
        assert!(!info.is_fresh(1_000_000 + 3_600_001, hour));
    }

    #[test]
    fn test_chunk_record_range() {
        let chunk = ChunkRecord {
            resource_id: "song1".into(),
            start_offset: 100,
            length: 50,
            file_name: "f".to_string(),
            updated_at: 0,
        };
        assert_eq!(chunk.end_offset(), 150);
        assert_eq!(chunk.range(), ByteRange::new(100, 150));
    }
}
