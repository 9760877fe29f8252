//! # Repositories
//!
//! - `ContentInfoRepository` - one row of resource metadata per resource
//! - `ChunkRepository` - chunk records keyed by `(resource_id, start_offset)`
//!
//! Write methods take an optional [`TransactionId`] so the index can group
//! statements across both tables into one atomic unit.

use bridge_traits::database::{DatabaseAdapter, QueryRow, QueryValue, TransactionId};

use crate::error::{IndexError, Result};

pub mod chunk;
pub mod content_info;

pub use chunk::{ChunkRepository, SqliteChunkRepository};
pub use content_info::{ContentInfoRepository, SqliteContentInfoRepository};

pub(crate) async fn query_scoped(
    db: &dyn DatabaseAdapter,
    tx: Option<TransactionId>,
    sql: &str,
    params: &[QueryValue],
) -> Result<Vec<QueryRow>> {
    let rows = match tx {
        Some(tx) => db.query_in_transaction(tx, sql, params).await?,
        None => db.query(sql, params).await?,
    };
    Ok(rows)
}

pub(crate) async fn execute_scoped(
    db: &dyn DatabaseAdapter,
    tx: Option<TransactionId>,
    sql: &str,
    params: &[QueryValue],
) -> Result<u64> {
    let affected = match tx {
        Some(tx) => db.execute_in_transaction(tx, sql, params).await?,
        None => db.execute(sql, params).await?,
    };
    Ok(affected)
}

// ============================================================================
// Helper functions for extracting values from QueryRow
// ============================================================================

pub(crate) fn get_string(table: &'static str, row: &QueryRow, key: &str) -> Result<String> {
    row.get(key)
        .and_then(QueryValue::as_string)
        .ok_or_else(|| IndexError::InvalidRecord {
            table,
            message: format!("missing column {}", key),
        })
}

pub(crate) fn get_i64(table: &'static str, row: &QueryRow, key: &str) -> Result<i64> {
    row.get(key)
        .and_then(QueryValue::as_i64)
        .ok_or_else(|| IndexError::InvalidRecord {
            table,
            message: format!("missing column {}", key),
        })
}

pub(crate) fn get_u64(table: &'static str, row: &QueryRow, key: &str) -> Result<u64> {
    let value = get_i64(table, row, key)?;
    u64::try_from(value).map_err(|_| IndexError::InvalidRecord {
        table,
        message: format!("negative {}: {}", key, value),
    })
}

pub(crate) fn to_sql_offset(field: &str, value: u64) -> Result<QueryValue> {
    i64::try_from(value)
        .map(QueryValue::Integer)
        .map_err(|_| IndexError::InvalidInput {
            field: field.to_string(),
            message: format!("{} exceeds i64", value),
        })
}
