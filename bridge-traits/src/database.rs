//! Database Abstraction Layer
//!
//! A small parameterised-SQL surface over the persistent table engine that
//! backs the metadata index. The cache only needs create-table-if-absent,
//! insert-or-replace, ordered selects with limits, deletes, transactions and
//! schema introspection for additive migrations.
//!
//! ```ignore
//! use bridge_traits::database::{DatabaseAdapter, DatabaseConfig, QueryValue};
//!
//! let adapter = SqliteAdapter::new(DatabaseConfig::in_memory()).await?;
//! adapter.initialize().await?;
//! let rows = adapter
//!     .query("SELECT * FROM chunk_records WHERE resource_id = ?", &["abc".into()])
//!     .await?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path or connection string
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,

    /// Statement cache capacity, `0` disables caching
    pub cache_capacity: usize,
}

impl DatabaseConfig {
    /// Create a new database configuration with the given file path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();

        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 4,
            acquire_timeout_secs: 30,
            cache_capacity: 64,
        }
    }

    /// Create a configuration for an in-memory database.
    ///
    /// Every SQLite connection to `:memory:` opens a distinct database, so
    /// the pool is pinned to a single connection.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout_secs: 30,
            cache_capacity: 64,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

// =============================================================================
// Query Result Types
// =============================================================================

/// A single row from a database query as a map of column names to values
pub type QueryRow = std::collections::HashMap<String, QueryValue>;

/// A database value that can be null, integer, real, text, or blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl QueryValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            QueryValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        self.as_str().map(str::to_string)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, QueryValue::Null)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Integer(i64::from(value))
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(QueryValue::Null)
    }
}

// =============================================================================
// Database Adapter Trait
// =============================================================================

/// Unique identifier for a database transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u64);

/// Database adapter trait
///
/// Implementations must be `Send + Sync`; the metadata index drives one
/// adapter from a single worker task, but the adapter itself may be shared.
///
/// Statements issued through `*_in_transaction` run on the connection that
/// opened the transaction, so a rollback undoes exactly those statements.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Verify the connection is usable
    async fn initialize(&self) -> Result<()>;

    async fn health_check(&self) -> Result<()>;

    /// Close all database connections
    async fn close(&self) -> Result<()>;

    // =========================================================================
    // Raw Query Execution
    // =========================================================================

    /// Execute a parameterised query and return rows
    async fn query(&self, query: &str, params: &[QueryValue]) -> Result<Vec<QueryRow>>;

    /// Execute a statement that doesn't return rows, returning rows affected
    async fn execute(&self, statement: &str, params: &[QueryValue]) -> Result<u64>;

    /// Execute a query and return a single optional row
    async fn query_one_optional(
        &self,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Option<QueryRow>>;

    // =========================================================================
    // Transaction Support
    // =========================================================================

    async fn begin_transaction(&self) -> Result<TransactionId>;

    async fn commit_transaction(&self, transaction_id: TransactionId) -> Result<()>;

    async fn rollback_transaction(&self, transaction_id: TransactionId) -> Result<()>;

    async fn query_in_transaction(
        &self,
        transaction_id: TransactionId,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Vec<QueryRow>>;

    async fn execute_in_transaction(
        &self,
        transaction_id: TransactionId,
        statement: &str,
        params: &[QueryValue],
    ) -> Result<u64>;

    /// Execute statements atomically; any failure rolls back the whole batch
    async fn execute_batch(&self, statements: &[(&str, &[QueryValue])]) -> Result<Vec<u64>> {
        let tx = self.begin_transaction().await?;
        let mut results = Vec::with_capacity(statements.len());

        for (statement, params) in statements {
            match self.execute_in_transaction(tx, statement, params).await {
                Ok(rows) => results.push(rows),
                Err(e) => {
                    self.rollback_transaction(tx).await?;
                    return Err(e);
                }
            }
        }

        self.commit_transaction(tx).await?;
        Ok(results)
    }

    // =========================================================================
    // Schema Introspection
    // =========================================================================

    /// Column names of `table`, empty when the table does not exist
    async fn table_columns(&self, table: &str) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_value_conversions() {
        let int_val = QueryValue::from(42i64);
        assert_eq!(int_val.as_i64(), Some(42));
        assert!(int_val.as_str().is_none());

        let text_val = QueryValue::from("hello");
        assert_eq!(text_val.as_str(), Some("hello"));
        assert_eq!(text_val.as_string(), Some("hello".to_string()));

        assert_eq!(QueryValue::from(true), QueryValue::Integer(1));
        assert!(QueryValue::from(None::<String>).is_null());
    }

    #[test]
    fn test_in_memory_is_single_connection() {
        let config = DatabaseConfig::in_memory();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_connections, 1);
    }

    #[test]
    fn test_database_config_from_path() {
        let config = DatabaseConfig::new("cache.db");
        assert_eq!(config.database_url, "sqlite:cache.db");
    }
}
