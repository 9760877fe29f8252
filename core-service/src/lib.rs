//! Media cache service bootstrap.
//!
//! [`MediaCacheContext`] is the one object a host builds at startup. It
//! resolves the bridges carried by [`CoreConfig`], opens the SQLite-backed
//! metadata index and the cache manager, and tears both down again on
//! [`close`](MediaCacheContext::close). There is no global state: two
//! contexts over different directories are fully independent.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::MediaCacheContext;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/media_cache.db")
//!     .cache_dir("/data/cache")
//!     .build()?;
//!
//! let context = MediaCacheContext::open(config).await?;
//! let loader = context.loader("https://cdn.example.com/song1.mp3");
//! let head = loader.read_range(0, 64 * 1024).await?;
//! context.close().await?;
//! ```

pub mod context;
pub mod error;

pub use context::MediaCacheContext;
pub use error::{CoreError, Result};

pub use core_cache::{
    ByteRange, CacheConfig, CacheError, CacheManager, CacheStats, ContentInfo, LoaderEvent,
    RangeConsumer, RequestHandle, ResourceId, ResourceLoader, TrimReport,
};
pub use core_runtime::config::CoreConfig;
pub use core_runtime::events::{CacheEvent, CoreEvent, EventBus, LifecycleEvent};
