//! Native SQLite Database Adapter
//!
//! Implements the `DatabaseAdapter` trait using `sqlx` with the native SQLite
//! driver.
//!
//! ## Features
//!
//! - Connection pooling with configurable limits
//! - WAL mode for file-backed databases
//! - Prepared statement caching
//! - Transactions pinned to their own pooled connection

use async_trait::async_trait;
use bridge_traits::database::{DatabaseAdapter, DatabaseConfig, QueryRow, QueryValue, TransactionId};
use bridge_traits::error::{BridgeError, Result};
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Pool, Row, Sqlite, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Native SQLite implementation of DatabaseAdapter
///
/// Each open transaction owns a pooled connection until it is committed or
/// rolled back, so statements issued with its [`TransactionId`] all run on
/// that connection.
pub struct SqliteAdapter {
    pool: Pool<Sqlite>,
    transactions: Mutex<HashMap<TransactionId, Transaction<'static, Sqlite>>>,
    transaction_counter: AtomicU64,
}

impl SqliteAdapter {
    /// Create the connection pool described by `config`
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        info!(
            database_url = %config.database_url,
            max_connections = config.max_connections,
            "Creating SQLite database adapter"
        );

        let in_memory = config.database_url.contains(":memory:");

        let mut connect_options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| BridgeError::DatabaseError(format!("Invalid database URL: {}", e)))?
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        if config.cache_capacity > 0 {
            connect_options = connect_options.statement_cache_capacity(config.cache_capacity);
        }

        let pool = SqlitePoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            // an in-memory database vanishes with its last connection
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to create connection pool");
                BridgeError::DatabaseError(format!("Connection pool creation failed: {}", e))
            })?;

        info!(connections = pool.size(), "SQLite connection pool created");

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            transactions: Mutex::new(HashMap::new()),
            transaction_counter: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn row_to_query_row(row: &SqliteRow) -> QueryRow {
        let mut result = HashMap::new();

        for column in row.columns() {
            let ordinal = column.ordinal();

            let value = if let Ok(v) = row.try_get::<Option<i64>, _>(ordinal) {
                v.map(QueryValue::Integer).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<f64>, _>(ordinal) {
                v.map(QueryValue::Real).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<String>, _>(ordinal) {
                v.map(QueryValue::Text).unwrap_or(QueryValue::Null)
            } else if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(ordinal) {
                v.map(QueryValue::Blob).unwrap_or(QueryValue::Null)
            } else {
                QueryValue::Null
            };

            result.insert(column.name().to_string(), value);
        }

        result
    }

    fn bind_params<'q>(statement: &'q str, params: &'q [QueryValue]) -> SqliteQuery<'q> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = match param {
                QueryValue::Null => query.bind(None::<i64>),
                QueryValue::Integer(i) => query.bind(*i),
                QueryValue::Real(r) => query.bind(*r),
                QueryValue::Text(s) => query.bind(s.as_str()),
                QueryValue::Blob(b) => query.bind(b.as_slice()),
            };
        }
        query
    }

    fn db_error(context: &str, e: sqlx::Error) -> BridgeError {
        BridgeError::DatabaseError(format!("{}: {}", context, e))
    }

    fn unknown_transaction(id: TransactionId) -> BridgeError {
        BridgeError::DatabaseError(format!("Unknown transaction {}", id.0))
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn initialize(&self) -> Result<()> {
        self.health_check().await?;
        info!("Database adapter initialized");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Database health check failed");
                Self::db_error("Health check failed", e)
            })?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let pending = {
            let mut transactions = self.transactions.lock().await;
            transactions.drain().count()
        };
        if pending > 0 {
            warn!(pending, "Closing database with open transactions; rolled back");
        }

        info!("Closing database connection pool");
        self.pool.close().await;
        Ok(())
    }

    async fn query(&self, query: &str, params: &[QueryValue]) -> Result<Vec<QueryRow>> {
        debug!(query = %query, param_count = params.len(), "Executing query");

        let rows = Self::bind_params(query, params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_error("Query failed", e))?;

        Ok(rows.iter().map(Self::row_to_query_row).collect())
    }

    async fn execute(&self, statement: &str, params: &[QueryValue]) -> Result<u64> {
        debug!(statement = %statement, param_count = params.len(), "Executing statement");

        let result = Self::bind_params(statement, params)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::db_error("Execute failed", e))?;

        Ok(result.rows_affected())
    }

    async fn query_one_optional(
        &self,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Option<QueryRow>> {
        debug!(query = %query, param_count = params.len(), "Executing query_one_optional");

        let row = Self::bind_params(query, params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_error("Query one optional failed", e))?;

        Ok(row.as_ref().map(Self::row_to_query_row))
    }

    async fn begin_transaction(&self) -> Result<TransactionId> {
        let id = TransactionId(self.transaction_counter.fetch_add(1, Ordering::SeqCst));
        debug!(transaction_id = id.0, "Beginning transaction");

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::db_error("Begin transaction failed", e))?;
        self.transactions.lock().await.insert(id, tx);

        Ok(id)
    }

    async fn commit_transaction(&self, transaction_id: TransactionId) -> Result<()> {
        debug!(transaction_id = transaction_id.0, "Committing transaction");

        let tx = self
            .transactions
            .lock()
            .await
            .remove(&transaction_id)
            .ok_or_else(|| Self::unknown_transaction(transaction_id))?;

        tx.commit()
            .await
            .map_err(|e| Self::db_error("Commit transaction failed", e))
    }

    async fn rollback_transaction(&self, transaction_id: TransactionId) -> Result<()> {
        debug!(transaction_id = transaction_id.0, "Rolling back transaction");

        let tx = self
            .transactions
            .lock()
            .await
            .remove(&transaction_id)
            .ok_or_else(|| Self::unknown_transaction(transaction_id))?;

        tx.rollback()
            .await
            .map_err(|e| Self::db_error("Rollback transaction failed", e))
    }

    async fn query_in_transaction(
        &self,
        transaction_id: TransactionId,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Vec<QueryRow>> {
        let mut transactions = self.transactions.lock().await;
        let tx = transactions
            .get_mut(&transaction_id)
            .ok_or_else(|| Self::unknown_transaction(transaction_id))?;

        let rows = Self::bind_params(query, params)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| Self::db_error("Query failed", e))?;

        Ok(rows.iter().map(Self::row_to_query_row).collect())
    }

    async fn execute_in_transaction(
        &self,
        transaction_id: TransactionId,
        statement: &str,
        params: &[QueryValue],
    ) -> Result<u64> {
        let mut transactions = self.transactions.lock().await;
        let tx = transactions
            .get_mut(&transaction_id)
            .ok_or_else(|| Self::unknown_transaction(transaction_id))?;

        let result = Self::bind_params(statement, params)
            .execute(&mut **tx)
            .await
            .map_err(|e| Self::db_error("Execute failed", e))?;

        Ok(result.rows_affected())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .query(
                "SELECT name FROM pragma_table_info(?) ORDER BY cid",
                &[QueryValue::from(table)],
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(QueryValue::as_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::new(DatabaseConfig::in_memory()).await.unwrap();
        adapter.initialize().await.unwrap();
        adapter
            .execute("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_query_roundtrip_types() {
        let adapter = create_test_adapter().await;
        adapter
            .execute(
                "INSERT INTO test (id, name) VALUES (?, ?)",
                &[QueryValue::Integer(1), QueryValue::Null],
            )
            .await
            .unwrap();

        let row = adapter
            .query_one_optional("SELECT id, name FROM test WHERE id = ?", &[1i64.into()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("id"), Some(&QueryValue::Integer(1)));
        assert_eq!(row.get("name"), Some(&QueryValue::Null));
    }

    #[tokio::test]
    async fn test_rollback_discards_statements() {
        let adapter = create_test_adapter().await;

        let tx = adapter.begin_transaction().await.unwrap();
        adapter
            .execute_in_transaction(
                tx,
                "INSERT INTO test (id, name) VALUES (?, ?)",
                &[1i64.into(), "a".into()],
            )
            .await
            .unwrap();
        let inside = adapter
            .query_in_transaction(tx, "SELECT * FROM test", &[])
            .await
            .unwrap();
        assert_eq!(inside.len(), 1);
        adapter.rollback_transaction(tx).await.unwrap();

        let rows = adapter.query("SELECT * FROM test", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let adapter = create_test_adapter().await;
        let first = [QueryValue::Integer(1), QueryValue::from("a")];
        let duplicate = [QueryValue::Integer(1), QueryValue::from("b")];

        let result = adapter
            .execute_batch(&[
                ("INSERT INTO test (id, name) VALUES (?, ?)", first.as_slice()),
                ("INSERT INTO test (id, name) VALUES (?, ?)", duplicate.as_slice()),
            ])
            .await;
        assert!(result.is_err());

        let rows = adapter.query("SELECT * FROM test", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_table_columns() {
        let adapter = create_test_adapter().await;

        let columns = adapter.table_columns("test").await.unwrap();
        assert_eq!(columns, vec!["id".to_string(), "name".to_string()]);

        assert!(adapter.table_columns("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let adapter = create_test_adapter().await;
        assert!(adapter
            .commit_transaction(TransactionId(999))
            .await
            .is_err());
    }
}
