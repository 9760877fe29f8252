use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Invalid {table} row: {message}")]
    InvalidRecord {
        table: &'static str,
        message: String,
    },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Metadata index is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, IndexError>;
