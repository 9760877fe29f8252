//! # Metadata Index
//!
//! Persistent record of what the media cache holds:
//!
//! - [`ContentInfo`] - mime type, total length and range support per resource
//! - [`ChunkRecord`] - one row per contiguous byte run stored on disk
//!
//! Backed by SQLite through the [`DatabaseAdapter`] bridge
//! ([`SqliteAdapter`] on native targets). All access goes through
//! [`MetadataIndex`], which serializes every operation on one worker task.
//!
//! [`DatabaseAdapter`]: bridge_traits::database::DatabaseAdapter

pub mod adapters;
pub mod error;
pub mod index;
pub mod models;
pub mod repositories;
pub mod schema;

pub use adapters::SqliteAdapter;
pub use error::{IndexError, Result};
pub use index::{IndexTotals, MetadataIndex};
pub use models::{ByteRange, ChunkRecord, ContentInfo, ResourceId};
