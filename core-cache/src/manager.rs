//! # Cache Manager
//!
//! Public entry point of the media cache. Combines the metadata index, the
//! byte store, the range planner and the fetch pipeline:
//!
//! - `query` plans a range against the cached chunks and starts a request
//! - `save` persists fetched bytes as a chunk and schedules a trim
//! - `trim` evicts the least recently updated resources once the store
//!   reaches its cap
//! - `invalidate` and `clean` remove one resource or everything
//!
//! Chunk files of an invalidated resource are deleted in the background;
//! a later `save` for that resource waits for the deletion to finish.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::{Clock, SystemClock};
use bytes::Bytes;
use core_index::{ByteRange, ChunkRecord, ContentInfo, IndexError, MetadataIndex, ResourceId};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::byte_store::ByteStore;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::pipeline::{ChunkPersister, FetchPipeline, FetchTarget};
use crate::planner::{self, Plan};
use crate::request::RequestHandle;
use crate::stats::{CacheStats, TrimReport};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Bridges and shared services the manager runs on.
pub struct CacheDependencies {
    pub index: Arc<MetadataIndex>,
    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: Option<EventBus>,
}

impl CacheDependencies {
    pub fn new(
        index: Arc<MetadataIndex>,
        http_client: Arc<dyn HttpClient>,
        file_system: Arc<dyn FileSystemAccess>,
    ) -> Self {
        Self {
            index,
            http_client,
            file_system,
            clock: Arc::new(SystemClock),
            event_bus: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }
}

struct PendingDeletion {
    generation: u64,
    done: Shared<BoxFuture<'static, ()>>,
}

struct CacheInner {
    config: RwLock<CacheConfig>,
    index: Arc<MetadataIndex>,
    store: Arc<ByteStore>,
    pipeline: Arc<FetchPipeline>,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    pending_deletions: Mutex<HashMap<ResourceId, PendingDeletion>>,
    deletion_generation: AtomicU64,
    trim_scheduled: AtomicBool,
    trim_lock: tokio::sync::Mutex<()>,
}

/// Media cache facade. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<CacheInner>,
}

impl CacheManager {
    /// Validate `config`, prepare the chunk directory and sweep orphaned
    /// files.
    #[instrument(skip(config, deps), fields(directory = %config.cache_directory))]
    pub async fn open(config: CacheConfig, deps: CacheDependencies) -> Result<Self> {
        config.validate().map_err(CacheError::Config)?;

        let store = Arc::new(
            ByteStore::open(
                Arc::clone(&deps.file_system),
                Arc::clone(&deps.clock),
                &config.cache_directory,
            )
            .await?,
        );

        let mut pipeline = FetchPipeline::new(
            Arc::clone(&deps.http_client),
            Arc::clone(&store),
            config.data_headers.clone(),
        );
        if let Some(bus) = &deps.event_bus {
            pipeline = pipeline.with_event_bus(bus.clone());
        }

        let manager = Self {
            inner: Arc::new(CacheInner {
                config: RwLock::new(config),
                index: deps.index,
                store,
                pipeline: Arc::new(pipeline),
                http_client: deps.http_client,
                clock: deps.clock,
                event_bus: deps.event_bus,
                pending_deletions: Mutex::new(HashMap::new()),
                deletion_generation: AtomicU64::new(0),
                trim_scheduled: AtomicBool::new(false),
                trim_lock: tokio::sync::Mutex::new(()),
            }),
        };

        manager.initialize().await?;
        Ok(manager)
    }

    /// Delete chunk files that no record references, left behind by a
    /// crash between writing a file and recording it.
    ///
    /// Runs once from [`open`](Self::open), before any save can race it.
    #[instrument(skip(self))]
    pub(crate) async fn initialize(&self) -> Result<usize> {
        self.inner.store.ensure_directory().await?;

        let referenced: HashSet<String> = self
            .inner
            .index
            .chunk_file_names()
            .await?
            .into_iter()
            .collect();

        let orphans: Vec<String> = self
            .inner
            .store
            .list()
            .await?
            .into_iter()
            .map(|file| file.file_name)
            .filter(|name| !referenced.contains(name))
            .collect();

        let removed = self.inner.store.delete_many(&orphans).await;
        if removed > 0 {
            info!(removed, "Removed orphaned chunk files");
        }
        Ok(removed)
    }

    /// Change the size cap and make sure the chunk directory exists.
    pub async fn configure(&self, max_cache_size_mb: u64) -> Result<()> {
        if max_cache_size_mb == 0 {
            return Err(CacheError::Config(
                "max_cache_size_mb must be greater than 0".to_string(),
            ));
        }
        self.inner.config.write().max_cache_size_mb = max_cache_size_mb;
        self.inner.store.ensure_directory().await?;
        info!(max_cache_size_mb, "Cache size cap updated");
        Ok(())
    }

    pub fn config(&self) -> CacheConfig {
        self.inner.config.read().clone()
    }

    pub fn index(&self) -> &Arc<MetadataIndex> {
        &self.inner.index
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.inner.event_bus {
            bus.emit(CoreEvent::Cache(event)).ok();
        }
    }

    fn now_millis(&self) -> i64 {
        self.inner.clock.unix_timestamp_millis()
    }

    // ========================================================================
    // Content info
    // ========================================================================

    /// Cached content info, fresh or not.
    pub async fn cached_content_info(&self, resource_id: &ResourceId) -> Result<Option<ContentInfo>> {
        Ok(self.inner.index.content_info(resource_id).await?)
    }

    /// Content info for `resource_id`, probing `url` when the cached row
    /// is missing or stale.
    ///
    /// A stale row is returned only when the probe fails with a transient
    /// network error.
    #[instrument(skip(self, url), fields(resource_id = %resource_id))]
    pub async fn content_info(&self, resource_id: &ResourceId, url: &str) -> Result<ContentInfo> {
        let cached = self.inner.index.content_info(resource_id).await?;
        let ttl = self.inner.config.read().content_info_ttl();

        if let Some(info) = &cached {
            if info.is_fresh(self.now_millis(), ttl) {
                debug!("Content info cache hit");
                return Ok(info.clone());
            }
        }

        match self.probe_content_info(resource_id, url).await {
            Ok(info) => {
                if let Err(e) = self.inner.index.upsert_content_info(info.clone()).await {
                    warn!(error = %e, "Failed to record content info");
                } else {
                    self.emit(CacheEvent::ContentInfoUpdated {
                        resource_id: resource_id.to_string(),
                        mime_type: info.mime_type.clone(),
                        content_length: info.content_length,
                        is_byte_range_supported: info.is_byte_range_supported,
                    });
                }
                Ok(info)
            }
            Err(error) if error.is_transient_network() => match cached {
                Some(stale) => {
                    warn!(error = %error, "Content info probe failed, using stale entry");
                    Ok(stale)
                }
                None => Err(error),
            },
            Err(error) => Err(error),
        }
    }

    async fn probe_content_info(&self, resource_id: &ResourceId, url: &str) -> Result<ContentInfo> {
        let (headers, probe_length) = {
            let config = self.inner.config.read();
            (
                config.content_info_headers.clone(),
                config.content_info_probe_length,
            )
        };

        let request = HttpRequest::get(url)
            .headers(headers)
            .range(0, probe_length);
        let response = self.inner.http_client.execute(request).await?;

        if !response.is_success() {
            return Err(CacheError::http_status(response.status));
        }

        let content_length = response.total_length().ok_or_else(|| {
            CacheError::MalformedResponse(
                "response carries neither Content-Range nor Content-Length".to_string(),
            )
        })?;

        let info = ContentInfo {
            resource_id: resource_id.clone(),
            mime_type: response
                .mime_type()
                .unwrap_or(DEFAULT_MIME_TYPE)
                .to_string(),
            content_length,
            is_byte_range_supported: response.accepts_byte_ranges(),
            updated_at: self.now_millis(),
        };

        debug!(
            mime_type = %info.mime_type,
            content_length,
            ranges = info.is_byte_range_supported,
            "Probed content info"
        );
        // The body stream is dropped unread.
        Ok(info)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Plan `range` against the chunks currently on record.
    ///
    /// The range is clamped to the content length when the resource is
    /// known to support byte ranges.
    pub async fn plan(&self, resource_id: &ResourceId, range: ByteRange) -> Result<Plan> {
        let mut range = range;
        if let Some(info) = self.inner.index.content_info(resource_id).await? {
            if info.is_byte_range_supported {
                range = range.clamp_to(info.content_length);
            }
        }

        let chunks = self.inner.index.chunks(resource_id).await?;
        Ok(planner::plan(range, &chunks))
    }

    /// Start serving `range` of `resource_id`, fetching gaps from `url`.
    #[instrument(skip(self, url), fields(resource_id = %resource_id, range = %range))]
    pub async fn query(
        &self,
        resource_id: &ResourceId,
        url: &str,
        range: ByteRange,
    ) -> Result<RequestHandle> {
        let plan = self.plan(resource_id, range).await?;
        debug!(
            steps = plan.steps.len(),
            remote = plan.remote_fetches(),
            "Planned request"
        );

        let target = FetchTarget {
            resource_id: resource_id.clone(),
            url: url.to_string(),
        };
        let persister: Arc<dyn ChunkPersister> = Arc::new(self.clone());
        Ok(self.inner.pipeline.start(target, plan, persister))
    }

    /// True when the chunks on record cover the whole resource.
    pub async fn is_fully_cached(&self, resource_id: &ResourceId) -> Result<bool> {
        let Some(info) = self.inner.index.content_info(resource_id).await? else {
            return Ok(false);
        };
        let chunks = self.inner.index.chunks(resource_id).await?;
        Ok(planner::is_fully_covered(info.content_length, &chunks))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store `data` as the chunk of `resource_id` starting at `start`.
    ///
    /// A chunk already recorded at the same offset is replaced and its file
    /// deleted.
    #[instrument(skip(self, data), fields(resource_id = %resource_id, bytes = data.len()))]
    pub async fn save(&self, resource_id: &ResourceId, start: u64, data: Bytes) -> Result<ChunkRecord> {
        if data.is_empty() {
            return Err(CacheError::Index(IndexError::InvalidInput {
                field: "data".to_string(),
                message: "a chunk holds at least one byte".to_string(),
            }));
        }

        self.wait_for_pending_deletion(resource_id).await;

        let length = data.len() as u64;
        let file_name = self.inner.store.write(data).await?;
        let record = ChunkRecord {
            resource_id: resource_id.clone(),
            start_offset: start,
            length,
            file_name,
            updated_at: self.now_millis(),
        };

        let replaced = match self.inner.index.save_chunk(record.clone()).await {
            Ok(replaced) => replaced,
            Err(e) => {
                warn!(error = %e, file = %record.file_name, "Chunk record not saved, removing file");
                if let Err(cleanup) = self.inner.store.delete(&record.file_name).await {
                    warn!(error = %cleanup, "Failed to remove unrecorded chunk file");
                }
                return Err(e.into());
            }
        };

        if let Some(old) = replaced {
            if old.file_name != record.file_name {
                debug!(file = %old.file_name, "Removing replaced chunk file");
                if let Err(e) = self.inner.store.delete(&old.file_name).await {
                    warn!(error = %e, file = %old.file_name, "Failed to remove replaced chunk file");
                }
            }
        }

        debug!(start, length, file = %record.file_name, "Saved chunk");
        self.emit(CacheEvent::ChunkSaved {
            resource_id: resource_id.to_string(),
            start_offset: start,
            length,
        });

        self.schedule_trim();
        Ok(record)
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove every record of `resource_id` now and its files in the
    /// background.
    #[instrument(skip(self), fields(resource_id = %resource_id))]
    pub async fn invalidate(&self, resource_id: &ResourceId) -> Result<()> {
        let chunks = self.inner.index.remove_resource(resource_id).await?;
        let bytes: u64 = chunks.iter().map(|c| c.length).sum();

        if !chunks.is_empty() {
            let store = Arc::clone(&self.inner.store);
            let names: Vec<String> = chunks.iter().map(|c| c.file_name.clone()).collect();
            let task = tokio::spawn(async move {
                store.delete_many(&names).await;
            });
            let done = async move {
                if let Err(e) = task.await {
                    warn!(error = %e, "Chunk deletion task failed");
                }
            }
            .boxed()
            .shared();

            let generation = self.inner.deletion_generation.fetch_add(1, Ordering::Relaxed);
            self.inner
                .pending_deletions
                .lock()
                .insert(resource_id.clone(), PendingDeletion { generation, done });
        }

        info!(chunks = chunks.len(), bytes, "Invalidated resource");
        self.emit(CacheEvent::ResourceEvicted {
            resource_id: resource_id.to_string(),
            chunks: chunks.len() as u64,
            bytes,
        });
        Ok(())
    }

    async fn wait_for_pending_deletion(&self, resource_id: &ResourceId) {
        let pending = self
            .inner
            .pending_deletions
            .lock()
            .get(resource_id)
            .map(|p| (p.generation, p.done.clone()));

        if let Some((generation, done)) = pending {
            debug!(resource_id = %resource_id, "Waiting for chunk deletion");
            done.await;

            let mut deletions = self.inner.pending_deletions.lock();
            if deletions.get(resource_id).map(|p| p.generation) == Some(generation) {
                deletions.remove(resource_id);
            }
        }
    }

    /// Wait for every background file deletion started so far.
    pub async fn wait_for_pending_deletions(&self) {
        let pending: Vec<_> = self
            .inner
            .pending_deletions
            .lock()
            .drain()
            .map(|(_, p)| p.done)
            .collect();
        futures::future::join_all(pending).await;
    }

    /// Evict the least recently updated resources if the store has reached
    /// its cap.
    pub async fn trim(&self) -> Result<TrimReport> {
        let _guard = self.inner.trim_lock.lock().await;

        let (cap, batch) = {
            let config = self.inner.config.read();
            (config.max_cache_size_bytes(), config.trim_batch_size)
        };

        let scanned_bytes = self.inner.store.total_size().await?;
        let mut report = TrimReport {
            scanned_bytes,
            ..TrimReport::default()
        };

        if scanned_bytes < cap {
            debug!(scanned_bytes, cap, "Cache under cap");
            return Ok(report);
        }

        for resource_id in self.inner.index.least_recently_updated(batch).await? {
            match self.evict(&resource_id).await {
                Ok(freed) => {
                    report.evicted += 1;
                    report.freed_bytes += freed;
                }
                Err(e) => warn!(resource_id = %resource_id, error = %e, "Failed to evict resource"),
            }
        }

        info!(
            scanned_bytes,
            cap,
            evicted = report.evicted,
            freed_bytes = report.freed_bytes,
            "Trimmed cache"
        );
        self.emit(CacheEvent::CacheTrimmed {
            scanned_bytes,
            evicted: report.evicted as u64,
            freed_bytes: report.freed_bytes,
        });
        Ok(report)
    }

    async fn evict(&self, resource_id: &ResourceId) -> Result<u64> {
        let chunks = self.inner.index.remove_resource(resource_id).await?;
        let bytes: u64 = chunks.iter().map(|c| c.length).sum();
        let names: Vec<String> = chunks.iter().map(|c| c.file_name.clone()).collect();
        self.inner.store.delete_many(&names).await;

        debug!(resource_id = %resource_id, chunks = chunks.len(), bytes, "Evicted resource");
        self.emit(CacheEvent::ResourceEvicted {
            resource_id: resource_id.to_string(),
            chunks: chunks.len() as u64,
            bytes,
        });
        Ok(bytes)
    }

    fn schedule_trim(&self) {
        if !self.inner.config.read().auto_trim {
            return;
        }
        if self
            .inner
            .trim_scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let manager = self.clone();
        tokio::spawn(async move {
            // Saves landing while this trim runs schedule the next one.
            manager.inner.trim_scheduled.store(false, Ordering::Release);
            if let Err(e) = manager.trim().await {
                warn!(error = %e, "Background trim failed");
            }
        });
    }

    /// Wipe every record and chunk file.
    #[instrument(skip(self))]
    pub async fn clean(&self) -> Result<()> {
        self.wait_for_pending_deletions().await;
        self.inner.index.clear().await?;
        self.inner.store.delete_all().await?;
        info!("Cache cleaned");
        self.emit(CacheEvent::CacheCleared);
        Ok(())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let totals = self.inner.index.totals().await?;
        Ok(CacheStats {
            resource_count: totals.resources,
            chunk_count: totals.chunks,
            total_bytes: totals.chunk_bytes,
            max_bytes: self.inner.config.read().max_cache_size_bytes(),
        })
    }

    /// Let background deletions and any running trim finish.
    pub async fn shutdown(&self) {
        self.wait_for_pending_deletions().await;
        let _guard = self.inner.trim_lock.lock().await;
        debug!("Cache manager idle");
    }
}

#[async_trait]
impl ChunkPersister for CacheManager {
    async fn persist(&self, resource_id: &ResourceId, start: u64, data: Bytes) -> Result<()> {
        self.save(resource_id, start, data).await.map(|_| ())
    }
}
