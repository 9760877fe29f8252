use std::fmt;

use thiserror::Error;

/// Transport-level classification of a failed network operation.
///
/// `NotConnected`, `ConnectionLost` and `TimedOut` form the transient subset:
/// callers may fall back to stale cached values when they see one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    NotConnected,
    ConnectionLost,
    TimedOut,
    Other,
}

impl NetworkErrorKind {
    pub fn is_transient(self) -> bool {
        !matches!(self, NetworkErrorKind::Other)
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkErrorKind::NotConnected => "not connected",
            NetworkErrorKind::ConnectionLost => "connection lost",
            NetworkErrorKind::TimedOut => "timed out",
            NetworkErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        BridgeError::Network {
            kind,
            message: message.into(),
        }
    }

    /// Network classification, if this is a network error.
    pub fn network_kind(&self) -> Option<NetworkErrorKind> {
        match self {
            BridgeError::Network { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            BridgeError::NotFound(_) => true,
            BridgeError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(NetworkErrorKind::NotConnected.is_transient());
        assert!(NetworkErrorKind::ConnectionLost.is_transient());
        assert!(NetworkErrorKind::TimedOut.is_transient());
        assert!(!NetworkErrorKind::Other.is_transient());
    }

    #[test]
    fn test_not_found_detection() {
        let io = BridgeError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io.is_not_found());
        assert!(BridgeError::NotFound("a.bin".into()).is_not_found());
        assert!(!BridgeError::OperationFailed("x".into()).is_not_found());
    }
}
