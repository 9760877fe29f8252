//! # Media Cache
//!
//! Progressive-download byte-range cache for media players.
//!
//! A player asks for `[start, end)` of a remote resource. The
//! [`CacheManager`] plans the request against the chunks already on disk
//! ([`planner`]), serves cached runs from the [`ByteStore`], fetches the gaps
//! over HTTP and streams everything back in order through a
//! [`RequestHandle`]. Fetched runs are stored as new chunks and the cache is
//! trimmed back under its size cap by evicting whole resources, least
//! recently updated first.
//!
//! ## Usage
//!
//! ```ignore
//! use core_cache::{CacheConfig, CacheDependencies, CacheManager, ResourceLoader};
//!
//! let manager = CacheManager::open(CacheConfig::default(), deps).await?;
//! let loader = ResourceLoader::new(manager.clone(), "https://example.com/song.mp3");
//!
//! let info = loader.content_info().await?;
//! let mut handle = loader.request_range(0, 64 * 1024).await?;
//! while let Some(event) = handle.next_event().await {
//!     // LoaderEvent::Data(..) then exactly one terminal event
//! }
//! ```

pub mod byte_store;
pub mod config;
pub mod error;
pub mod loader;
pub mod manager;
pub mod pipeline;
pub mod planner;
pub mod request;
pub mod stats;

pub use byte_store::ByteStore;
pub use config::CacheConfig;
pub use error::{CacheError, ErrorKind, Result};
pub use loader::ResourceLoader;
pub use manager::{CacheDependencies, CacheManager};
pub use pipeline::{ChunkPersister, FetchPipeline, FetchTarget};
pub use planner::{Plan, PlanStep};
pub use request::{LoaderEvent, RangeConsumer, RequestHandle, RequestId};
pub use stats::{CacheStats, TrimReport};

pub use core_index::{ByteRange, ChunkRecord, ContentInfo, ResourceId};
