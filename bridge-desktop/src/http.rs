//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, NetworkErrorKind, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Reqwest-based HTTP client implementation
///
/// Bodies are exposed as a byte stream; dropping the stream aborts the
/// transfer. No retries are attempted because a retried ranged fetch would
/// replay bytes the consumer has already received.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with a custom connect/read timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .read_timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("media-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
        };
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    /// Map a reqwest failure onto the transport classification.
    ///
    /// Failures after the headers arrived mean the connection dropped
    /// mid-transfer.
    fn classify(e: &reqwest::Error, mid_stream: bool) -> NetworkErrorKind {
        if e.is_timeout() {
            NetworkErrorKind::TimedOut
        } else if e.is_connect() {
            NetworkErrorKind::NotConnected
        } else if mid_stream || e.is_body() || e.is_decode() {
            NetworkErrorKind::ConnectionLost
        } else {
            NetworkErrorKind::Other
        }
    }

    fn network_error(e: reqwest::Error, mid_stream: bool) -> BridgeError {
        let kind = Self::classify(&e, mid_stream);
        BridgeError::network(kind, e.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(
            method = ?request.method,
            range = request.headers.get("Range").map(String::as_str),
            "Executing HTTP request"
        );

        let response = self.build_request(request).send().await.map_err(|e| {
            warn!(error = %e, "HTTP request failed");
            Self::network_error(e, false)
        })?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        debug!(status, "HTTP response headers received");

        let body = response
            .bytes_stream()
            .map_err(|e| Self::network_error(e, true));

        Ok(HttpResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response and hand back the raw request text.
    async fn serve_once(response: &'static [u8]) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        (format!("http://{}/media.mp4", addr), handle)
    }

    #[tokio::test]
    async fn test_ranged_request_streams_body() {
        let (url, server) = serve_once(
            b"HTTP/1.1 206 Partial Content\r\n\
              Content-Type: video/mp4\r\n\
              Accept-Ranges: bytes\r\n\
              Content-Range: bytes 0-4/12345\r\n\
              Content-Length: 5\r\n\
              Connection: close\r\n\r\nhello",
        )
        .await;

        let client = ReqwestHttpClient::new().unwrap();
        let mut response = client
            .execute(HttpRequest::get(url).range(0, 5))
            .await
            .unwrap();

        assert_eq!(response.status, 206);
        assert_eq!(response.total_length(), Some(12345));
        assert!(response.accepts_byte_ranges());
        assert_eq!(response.mime_type(), Some("video/mp4"));

        let mut body = Vec::new();
        while let Some(chunk) = response.body.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"hello");

        let raw_request = server.await.unwrap().to_ascii_lowercase();
        assert!(raw_request.contains("range: bytes=0-4"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_not_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ReqwestHttpClient::new().unwrap();
        let err = client
            .execute(HttpRequest::get(format!("http://{}/", addr)))
            .await
            .unwrap_err();

        assert_eq!(err.network_kind(), Some(NetworkErrorKind::NotConnected));
    }
}
