use bridge_traits::error::{BridgeError, NetworkErrorKind};
use core_index::IndexError;
use thiserror::Error;

/// Coarse classification reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LocalFileMissing,
    NetworkFailure,
    Cancelled,
    MalformedResponse,
    Internal,
}

#[derive(Error, Debug)]
pub enum CacheError {
    // ========================================================================
    // Request failures
    // ========================================================================
    #[error("Chunk file missing: {file_name}")]
    LocalFileMissing { file_name: String },

    #[error("Network failure ({kind}): {message}")]
    NetworkFailure {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    // ========================================================================
    // Infrastructure
    // ========================================================================
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(BridgeError),

    #[error("Invalid cache configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    pub fn http_status(status: u16) -> Self {
        CacheError::NetworkFailure {
            kind: NetworkErrorKind::Other,
            message: format!("unexpected HTTP status {}", status),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::LocalFileMissing { .. } => ErrorKind::LocalFileMissing,
            CacheError::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            CacheError::Cancelled => ErrorKind::Cancelled,
            CacheError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            CacheError::Index(_)
            | CacheError::Storage(_)
            | CacheError::Config(_)
            | CacheError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Not connected, connection lost or timed out.
    pub fn is_transient_network(&self) -> bool {
        matches!(self, CacheError::NetworkFailure { kind, .. } if kind.is_transient())
    }
}

impl From<BridgeError> for CacheError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Network { kind, message } => CacheError::NetworkFailure { kind, message },
            other => CacheError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
