#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::database::DatabaseConfig;
use bridge_traits::error::{BridgeError, NetworkErrorKind, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_cache::{CacheConfig, CacheDependencies, CacheManager, ResourceId};
use core_index::{MetadataIndex, SqliteAdapter};
use core_runtime::events::EventBus;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use tempfile::TempDir;

pub const URL: &str = "https://cdn.test/song1.mp3";

/// Deterministic resource body.
pub fn content(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

// ============================================================================
// Clock
// ============================================================================

pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis.load(Ordering::SeqCst))
            .unwrap()
    }

    fn unix_timestamp_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Origin
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Connect(NetworkErrorKind),
    Status(u16),
    /// Deliver the first piece, then drop the connection.
    MidStream,
}

#[derive(Clone)]
pub struct Resource {
    pub data: Bytes,
    pub mime_type: Option<String>,
    pub accept_ranges: bool,
    pub send_lengths: bool,
}

impl Resource {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            mime_type: Some("audio/mpeg; charset=binary".to_string()),
            accept_ranges: true,
            send_lengths: true,
        }
    }
}

/// In-memory origin honouring `Range` exactly and recording every request.
pub struct FakeOrigin {
    resources: Mutex<HashMap<String, Resource>>,
    requests: Mutex<Vec<HttpRequest>>,
    failure: Mutex<Option<Failure>>,
    piece_size: usize,
    piece_delay: Mutex<Duration>,
}

impl FakeOrigin {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            piece_size: 64,
            piece_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn serve(&self, url: &str, resource: Resource) {
        self.resources.lock().insert(url.to_string(), resource);
    }

    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock() = failure;
    }

    pub fn slow_down(&self, delay: Duration) {
        *self.piece_delay.lock() = delay;
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// `Range` headers of every request so far.
    pub fn ranges(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| r.headers.get("Range").cloned())
            .collect()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }
}

fn parse_range(header: &str, total: u64) -> (u64, u64) {
    let bounds = header.trim_start_matches("bytes=");
    let (first, last) = bounds.split_once('-').unwrap();
    let first: u64 = first.parse().unwrap();
    let last: u64 = last.parse().unwrap();
    (first.min(total), (last + 1).min(total))
}

#[async_trait]
impl HttpClient for FakeOrigin {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().push(request.clone());

        let failure = *self.failure.lock();
        match failure {
            Some(Failure::Connect(kind)) => {
                return Err(BridgeError::network(kind, "origin unreachable"));
            }
            Some(Failure::Status(status)) => {
                return Ok(HttpResponse {
                    status,
                    headers: HashMap::new(),
                    body: stream::empty().boxed(),
                });
            }
            _ => {}
        }

        let resource = self
            .resources
            .lock()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(request.url.clone()))?;

        let total = resource.data.len() as u64;
        let (start, end) = request
            .headers
            .get("Range")
            .map(|h| parse_range(h, total))
            .unwrap_or((0, total));
        let body = resource.data.slice(start as usize..end as usize);

        let mut headers = HashMap::new();
        if let Some(mime) = &resource.mime_type {
            headers.insert("Content-Type".to_string(), mime.clone());
        }
        if resource.accept_ranges {
            headers.insert("Accept-Ranges".to_string(), "bytes".to_string());
        }
        if resource.send_lengths {
            headers.insert("Content-Length".to_string(), body.len().to_string());
            headers.insert(
                "Content-Range".to_string(),
                format!("bytes {}-{}/{}", start, end.saturating_sub(1), total),
            );
        }

        let mut pieces: Vec<BridgeResult<Bytes>> = body
            .chunks(self.piece_size)
            .map(|piece| Ok(Bytes::copy_from_slice(piece)))
            .collect();
        if failure == Some(Failure::MidStream) {
            pieces.truncate(1);
            pieces.push(Err(BridgeError::network(
                NetworkErrorKind::ConnectionLost,
                "connection reset",
            )));
        }

        let delay = *self.piece_delay.lock();
        let body = stream::iter(pieces)
            .then(move |piece| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                piece
            })
            .boxed();

        Ok(HttpResponse {
            status: 206,
            headers,
            body,
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub origin: Arc<FakeOrigin>,
    pub clock: Arc<ManualClock>,
    pub index: Arc<MetadataIndex>,
    pub fs: Arc<TokioFileSystem>,
    pub bus: EventBus,
    pub manager: CacheManager,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(CacheConfig::default().with_auto_trim(false)).await
    }

    pub async fn with_config(config: CacheConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let origin = Arc::new(FakeOrigin::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let db = SqliteAdapter::new(DatabaseConfig::in_memory()).await.unwrap();
        let index = Arc::new(MetadataIndex::open(Arc::new(db)).await.unwrap());
        let fs = Arc::new(TokioFileSystem::with_cache_directory(dir.path().to_path_buf()));
        let bus = EventBus::new(256);

        let manager = CacheManager::open(config, Self::deps(&index, &origin, &fs, &clock, &bus))
            .await
            .unwrap();

        Self {
            dir,
            origin,
            clock,
            index,
            fs,
            bus,
            manager,
        }
    }

    fn deps(
        index: &Arc<MetadataIndex>,
        origin: &Arc<FakeOrigin>,
        fs: &Arc<TokioFileSystem>,
        clock: &Arc<ManualClock>,
        bus: &EventBus,
    ) -> CacheDependencies {
        CacheDependencies::new(index.clone(), origin.clone(), fs.clone())
            .with_clock(clock.clone())
            .with_event_bus(bus.clone())
    }

    /// A second manager over the same index and directory.
    pub async fn reopen(&self, config: CacheConfig) -> CacheManager {
        CacheManager::open(
            config,
            Self::deps(&self.index, &self.origin, &self.fs, &self.clock, &self.bus),
        )
        .await
        .unwrap()
    }

    pub fn chunk_dir(&self) -> std::path::PathBuf {
        self.dir
            .path()
            .join(self.manager.config().cache_directory)
    }

    /// Names of the files currently in the chunk directory.
    pub fn files_on_disk(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.chunk_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn song(&self) -> ResourceId {
        ResourceId::new("song1")
    }
}
