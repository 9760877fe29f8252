//! Context object owning one media cache instance.

use bridge_traits::database::DatabaseConfig;
use core_cache::{
    CacheConfig, CacheDependencies, CacheManager, CacheStats, ResourceId, ResourceLoader,
};
use core_index::{MetadataIndex, SqliteAdapter};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, LifecycleEvent, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{CoreError, Result};

pub struct MediaCacheContext {
    config: CoreConfig,
    index: Arc<MetadataIndex>,
    manager: CacheManager,
    event_bus: EventBus,
    closed: AtomicBool,
}

impl MediaCacheContext {
    /// Open with the default cache settings, sized and timed by `config`.
    pub async fn open(config: CoreConfig) -> Result<Self> {
        Self::open_with(config, CacheConfig::default()).await
    }

    /// Open with explicit cache settings.
    ///
    /// Size cap, content info TTL and auto trim always come from `config`;
    /// everything else (directory name, extra headers, probe length, trim
    /// batch) from `cache`.
    #[instrument(skip(config, cache), fields(database = ?config.database_path))]
    pub async fn open_with(config: CoreConfig, cache: CacheConfig) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                config.file_system.create_dir_all(parent).await.map_err(|e| {
                    CoreError::InitializationFailed(format!(
                        "cannot create database directory: {}",
                        e
                    ))
                })?;
            }
        }

        let db = SqliteAdapter::new(DatabaseConfig::new(&config.database_path))
            .await
            .map_err(|e| CoreError::InitializationFailed(format!("cannot open database: {}", e)))?;
        let index = Arc::new(MetadataIndex::open(Arc::new(db)).await?);

        let event_bus = EventBus::new(config.event_buffer_size);
        let cache = cache
            .with_max_size_mb(config.cache_size_mb)
            .with_content_info_ttl(config.content_info_ttl)
            .with_auto_trim(config.auto_trim);
        let deps = CacheDependencies::new(
            Arc::clone(&index),
            Arc::clone(&config.http_client),
            Arc::clone(&config.file_system),
        )
        .with_event_bus(event_bus.clone());

        let manager = match CacheManager::open(cache, deps).await {
            Ok(manager) => manager,
            Err(e) => {
                if let Err(close) = index.close().await {
                    warn!(error = %close, "Failed to close index after open failure");
                }
                return Err(e.into());
            }
        };

        let cache_directory = manager.config().cache_directory;
        info!(cache_directory = %cache_directory, "Media cache opened");
        event_bus
            .emit(CoreEvent::Lifecycle(LifecycleEvent::Opened { cache_directory }))
            .ok();

        Ok(Self {
            config,
            index,
            manager,
            event_bus,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn manager(&self) -> &CacheManager {
        &self.manager
    }

    pub fn index(&self) -> &Arc<MetadataIndex> {
        &self.index
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Loader for `url`, identified by the URL hash.
    pub fn loader(&self, url: impl Into<String>) -> ResourceLoader {
        ResourceLoader::new(self.manager.clone(), url)
    }

    /// Loader for `url` under a caller-chosen identifier.
    pub fn loader_for(&self, resource_id: ResourceId, url: impl Into<String>) -> ResourceLoader {
        ResourceLoader::with_resource_id(self.manager.clone(), resource_id, url)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        Ok(self.manager.stats().await?)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Let background work finish, stop the index worker and close the
    /// database. Later calls are no-ops.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.manager.shutdown().await;
        self.index.close().await?;

        info!("Media cache closed");
        self.event_bus
            .emit(CoreEvent::Lifecycle(LifecycleEvent::Closed))
            .ok();
        Ok(())
    }
}

impl std::fmt::Debug for MediaCacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCacheContext")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}
