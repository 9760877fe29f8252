//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the media cache crates:
//! - Logging and tracing bootstrap
//! - Configuration and host bridge resolution
//! - Cache event bus
//!
//! Nothing here is global except the `tracing` subscriber installed by
//! [`logging::init_logging`]; every other piece is owned by the context that
//! builds it.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
