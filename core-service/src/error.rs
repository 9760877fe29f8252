use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),

    #[error("Index error: {0}")]
    Index(#[from] core_index::IndexError),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<core_runtime::Error> for CoreError {
    fn from(error: core_runtime::Error) -> Self {
        match error {
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            other => CoreError::Runtime(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
