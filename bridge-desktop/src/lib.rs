//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest` with streamed bodies
//! - `FileSystemAccess` using `tokio::fs`
//!
//! The SQLite `DatabaseAdapter` lives next to the schema it serves in
//! `core-index`.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let fs = TokioFileSystem::new();
//! ```

mod filesystem;
mod http;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
