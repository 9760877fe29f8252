//! # Host Bridge Traits
//!
//! Capabilities the media cache core needs from its host platform.
//!
//! - [`HttpClient`](http::HttpClient) - ranged GET with a streamed body
//! - [`FileSystemAccess`](storage::FileSystemAccess) - chunk blob storage
//! - [`DatabaseAdapter`](database::DatabaseAdapter) - the metadata table engine
//! - [`Clock`](time::Clock) - time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - forward structured logs to host logging
//!
//! Native implementations live in `bridge-desktop` (HTTP, filesystem) and
//! `core-index` (SQLite). All traits require `Send + Sync`.
//!
//! Every bridge reports failures as [`BridgeError`]. Network failures carry a
//! [`NetworkErrorKind`] so callers can tell transient conditions
//! (not connected, connection lost, timed out) from everything else.

pub mod database;
pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::{BridgeError, NetworkErrorKind};

pub use database::{DatabaseAdapter, DatabaseConfig, QueryRow, QueryValue, TransactionId};
pub use http::{ByteStream, ContentRange, HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
