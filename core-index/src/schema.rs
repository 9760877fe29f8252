//! Table creation and additive migrations.
//!
//! Tables are created if absent inside one transaction. Columns added after
//! the first release are listed in [`ADDITIVE_COLUMNS`]; each is appended
//! with `ALTER TABLE ... ADD COLUMN` when schema introspection shows it
//! missing, so rows written by older versions stay readable.

use bridge_traits::database::{DatabaseAdapter, QueryValue};
use tracing::{debug, info, instrument};

use crate::error::{IndexError, Result};

pub const CONTENT_INFO_TABLE: &str = "content_info";
pub const CHUNK_TABLE: &str = "chunk_records";

const NO_PARAMS: &[QueryValue] = &[];

const CREATE_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS content_info (
        resource_id TEXT PRIMARY KEY NOT NULL,
        mime_type TEXT NOT NULL,
        content_length INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chunk_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        resource_id TEXT NOT NULL,
        start_offset INTEGER NOT NULL,
        length INTEGER NOT NULL,
        file_name TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_chunk_resource_start
        ON chunk_records(resource_id, start_offset)",
    "CREATE INDEX IF NOT EXISTS idx_content_info_updated ON content_info(updated_at)",
];

/// A column introduced after the table's first version.
#[derive(Debug, Clone, Copy)]
pub struct AdditiveColumn {
    pub table: &'static str,
    pub column: &'static str,
    pub definition: &'static str,
}

pub const ADDITIVE_COLUMNS: &[AdditiveColumn] = &[AdditiveColumn {
    table: CONTENT_INFO_TABLE,
    column: "is_byte_range_supported",
    definition: "INTEGER NOT NULL DEFAULT 1",
}];

/// Create missing tables and apply additive column migrations.
#[instrument(skip(db))]
pub async fn ensure_schema(db: &dyn DatabaseAdapter) -> Result<()> {
    let statements: Vec<(&str, &[QueryValue])> = CREATE_STATEMENTS
        .iter()
        .map(|sql| (*sql, NO_PARAMS))
        .collect();

    db.execute_batch(&statements)
        .await
        .map_err(|e| IndexError::Migration(format!("Failed to create tables: {}", e)))?;

    for migration in ADDITIVE_COLUMNS {
        apply_additive_column(db, migration).await?;
    }

    debug!("Metadata schema ready");
    Ok(())
}

async fn apply_additive_column(db: &dyn DatabaseAdapter, migration: &AdditiveColumn) -> Result<()> {
    let columns = db.table_columns(migration.table).await?;
    if columns.iter().any(|c| c == migration.column) {
        return Ok(());
    }

    info!(
        table = migration.table,
        column = migration.column,
        "Adding column to existing table"
    );

    let sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        migration.table, migration.column, migration.definition
    );
    db.execute_batch(&[(sql.as_str(), NO_PARAMS)])
        .await
        .map_err(|e| {
            IndexError::Migration(format!(
                "Failed to add {}.{}: {}",
                migration.table, migration.column, e
            ))
        })?;

    Ok(())
}
