use thiserror::Error;

/// Failures while bootstrapping logging or building a [`CoreConfig`].
///
/// [`CoreConfig`]: crate::config::CoreConfig
#[derive(Error, Debug)]
pub enum Error {
    /// A setting is missing, out of range, or logging is already installed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A host bridge was neither injected nor available as a default
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
