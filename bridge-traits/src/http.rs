//! HTTP Client Abstraction
//!
//! Ranged GET requests with incrementally streamed response bodies.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Response body delivered chunk by chunk as it arrives from the network.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Methods the cache issues. Content probes and data fetches are both
/// ranged GETs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in headers {
            self.headers.insert(key.into(), value.into());
        }
        self
    }

    /// Request the half-open byte range `[start, end)`.
    ///
    /// HTTP ranges are inclusive, so the header carries `end - 1`.
    pub fn range(self, start: u64, end: u64) -> Self {
        let last = end.saturating_sub(1).max(start);
        self.header("Range", format!("bytes={}-{}", start, last))
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Parsed `Content-Range` header value (`bytes 0-99/12345`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: Option<u64>,
    pub last: Option<u64>,
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = rest.split_once('/')?;

        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse().ok()?),
        };

        let (first, last) = match span.trim() {
            "*" => (None, None),
            s => {
                let (a, b) = s.split_once('-')?;
                (Some(a.trim().parse().ok()?), Some(b.trim().parse().ok()?))
            }
        };

        Some(Self { first, last, total })
    }
}

/// Streaming HTTP response
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: ByteStream,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &"ByteStream { ... }")
            .finish()
    }
}

impl HttpResponse {
    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn content_range(&self) -> Option<ContentRange> {
        self.header("Content-Range").and_then(ContentRange::parse)
    }

    /// Full length of the remote resource.
    ///
    /// Ranged responses report it after the slash in `Content-Range`;
    /// otherwise `Content-Length` is the whole body.
    pub fn total_length(&self) -> Option<u64> {
        self.content_range()
            .and_then(|range| range.total)
            .or_else(|| self.content_length())
    }

    pub fn accepts_byte_ranges(&self) -> bool {
        self.header("Accept-Ranges")
            .map(|v| {
                v.split(',')
                    .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"))
            })
            .unwrap_or(false)
    }

    /// `Content-Type` without parameters such as `charset`.
    pub fn mime_type(&self) -> Option<&str> {
        self.header("Content-Type")
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Async HTTP client trait
///
/// Implementations must stream the body as it arrives and abort the
/// underlying transfer when the returned [`ByteStream`] is dropped.
/// Transport failures are reported as [`BridgeError::Network`] with a
/// [`NetworkErrorKind`] classification.
///
/// [`BridgeError::Network`]: crate::error::BridgeError::Network
/// [`NetworkErrorKind`]: crate::error::NetworkErrorKind
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
/// use futures::StreamExt;
///
/// async fn first_kilobyte(client: &dyn HttpClient, url: &str) -> Result<Vec<u8>> {
///     let mut response = client.execute(HttpRequest::get(url).range(0, 1024)).await?;
///     let mut out = Vec::new();
///     while let Some(chunk) = response.body.next().await {
///         out.extend_from_slice(&chunk?);
///     }
///     Ok(out)
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send the request and return as soon as the response headers arrive.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}
