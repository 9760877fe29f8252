use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_service::{
    CacheConfig, CacheError, CacheEvent, CoreConfig, CoreError, CoreEvent, LifecycleEvent,
    MediaCacheContext, ResourceId,
};
use futures::{stream, StreamExt};
use tempfile::TempDir;

const URL: &str = "https://cdn.test/track.mp3?sig=abc";

/// Serves one fixed body, honouring `Range: bytes=a-b`.
struct StaticOrigin {
    body: Bytes,
    requests: AtomicUsize,
}

impl StaticOrigin {
    fn new(len: usize) -> Self {
        Self {
            body: (0..len).map(|i| (i % 199) as u8).collect::<Vec<u8>>().into(),
            requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HttpClient for StaticOrigin {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let total = self.body.len() as u64;
        let (start, end) = request
            .headers
            .get("Range")
            .and_then(|h| h.trim_start_matches("bytes=").split_once('-'))
            .map(|(a, b)| {
                let a: u64 = a.parse().unwrap();
                let b: u64 = b.parse().unwrap();
                (a.min(total), (b + 1).min(total))
            })
            .unwrap_or((0, total));
        let slice = self.body.slice(start as usize..end as usize);

        let headers = HashMap::from([
            ("Content-Type".to_string(), "audio/mpeg".to_string()),
            ("Accept-Ranges".to_string(), "bytes".to_string()),
            ("Content-Length".to_string(), slice.len().to_string()),
            (
                "Content-Range".to_string(),
                format!("bytes {}-{}/{}", start, end.saturating_sub(1), total),
            ),
        ]);

        Ok(HttpResponse {
            status: 206,
            headers,
            body: stream::iter(vec![Ok(slice)]).boxed(),
        })
    }
}

fn config(dir: &TempDir, origin: Arc<StaticOrigin>) -> CoreConfig {
    CoreConfig::builder()
        .database_path(dir.path().join("db").join("media_cache.db"))
        .cache_dir(dir.path().join("cache"))
        .cache_size_mb(10)
        .auto_trim(false)
        .http_client(origin)
        .file_system(Arc::new(TokioFileSystem::with_cache_directory(
            dir.path().join("cache"),
        )))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_open_read_close() {
    let dir = TempDir::new().unwrap();
    let origin = Arc::new(StaticOrigin::new(4096));
    let context = MediaCacheContext::open(config(&dir, origin.clone()))
        .await
        .unwrap();
    let mut events = context.subscribe();

    let loader = context.loader(URL);
    let info = loader.content_info().await.unwrap();
    assert_eq!(info.content_length, 4096);
    assert_eq!(info.mime_type, "audio/mpeg");

    let bytes = loader.read_range(0, 1024).await.unwrap();
    assert_eq!(bytes, origin.body.slice(0..1024));

    let stats = context.stats().await.unwrap();
    assert_eq!(stats.resource_count, 1);
    assert_eq!(stats.chunk_count, 1);
    assert_eq!(stats.total_bytes, 1024);
    assert_eq!(stats.max_bytes, 10 * 1024 * 1024);

    context.close().await.unwrap();
    assert!(context.is_closed());
    context.close().await.unwrap();

    let mut saw_closed = false;
    let mut saw_saved = false;
    while let Ok(event) = events.try_recv() {
        match event {
            CoreEvent::Lifecycle(LifecycleEvent::Closed) => saw_closed = true,
            CoreEvent::Cache(CacheEvent::ChunkSaved { length: 1024, .. }) => saw_saved = true,
            _ => {}
        }
    }
    assert!(saw_closed);
    assert!(saw_saved);
}

#[tokio::test]
async fn test_operations_after_close_fail() {
    let dir = TempDir::new().unwrap();
    let origin = Arc::new(StaticOrigin::new(16));
    let context = MediaCacheContext::open(config(&dir, origin)).await.unwrap();

    context.close().await.unwrap();

    let err = context.stats().await.unwrap_err();
    assert!(matches!(err, CoreError::Cache(CacheError::Index(_))));
}

#[tokio::test]
async fn test_cached_ranges_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let origin = Arc::new(StaticOrigin::new(2048));
    let id = ResourceId::new("track");

    let first = MediaCacheContext::open(config(&dir, origin.clone()))
        .await
        .unwrap();
    let bytes = first
        .loader_for(id.clone(), URL)
        .read_range(100, 900)
        .await
        .unwrap();
    first.close().await.unwrap();
    let requests = origin.requests.load(Ordering::SeqCst);

    let second = MediaCacheContext::open(config(&dir, origin.clone()))
        .await
        .unwrap();
    let again = second
        .loader_for(id, URL)
        .read_range(100, 900)
        .await
        .unwrap();

    assert_eq!(again, bytes);
    assert_eq!(origin.requests.load(Ordering::SeqCst), requests);
    second.close().await.unwrap();
}

#[tokio::test]
async fn test_cache_settings_applied() {
    let dir = TempDir::new().unwrap();
    let origin = Arc::new(StaticOrigin::new(16));
    let cache = CacheConfig::default()
        .with_cache_directory("chunks")
        .with_max_size_mb(1);

    let context = MediaCacheContext::open_with(config(&dir, origin), cache)
        .await
        .unwrap();

    let settings = context.manager().config();
    assert_eq!(settings.cache_directory, "chunks");
    assert_eq!(settings.max_cache_size_mb, 10);
    assert_eq!(settings.content_info_ttl(), Duration::from_secs(3600));
    assert!(!settings.auto_trim);
    assert!(dir.path().join("cache").join("chunks").is_dir());

    context.close().await.unwrap();
}
