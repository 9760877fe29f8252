//! Chunk records: which byte runs of a resource are on disk, and where.

use bridge_traits::database::{DatabaseAdapter, QueryRow, QueryValue, TransactionId};
use std::sync::Arc;
use tracing::{error, instrument, warn};

use super::{execute_scoped, get_i64, get_string, get_u64, query_scoped, to_sql_offset};
use crate::error::{IndexError, Result};
use crate::models::{ChunkRecord, ResourceId};
use crate::schema::CHUNK_TABLE;

#[async_trait::async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Chunks of one resource in ascending `start_offset` order.
    ///
    /// Rows that fail to decode or have a zero length are logged and
    /// skipped.
    async fn find_by_resource(
        &self,
        resource_id: &ResourceId,
        tx: Option<TransactionId>,
    ) -> Result<Vec<ChunkRecord>>;

    async fn find_at(
        &self,
        resource_id: &ResourceId,
        start_offset: u64,
        tx: Option<TransactionId>,
    ) -> Result<Option<ChunkRecord>>;

    /// Insert or replace the record at `(resource_id, start_offset)`.
    async fn upsert(&self, record: &ChunkRecord, tx: Option<TransactionId>) -> Result<()>;

    async fn delete_by_resource(
        &self,
        resource_id: &ResourceId,
        tx: Option<TransactionId>,
    ) -> Result<u64>;

    async fn delete_all(&self, tx: Option<TransactionId>) -> Result<u64>;

    /// Backing file names of every record
    async fn file_names(&self) -> Result<Vec<String>>;

    /// `(record count, sum of lengths)`
    async fn totals(&self) -> Result<(u64, u64)>;
}

pub struct SqliteChunkRepository {
    db: Arc<dyn DatabaseAdapter>,
}

impl SqliteChunkRepository {
    pub fn new(db: Arc<dyn DatabaseAdapter>) -> Self {
        Self { db }
    }

    fn row_to_chunk(row: &QueryRow) -> Result<ChunkRecord> {
        let record = ChunkRecord {
            resource_id: ResourceId::new(get_string(CHUNK_TABLE, row, "resource_id")?),
            start_offset: get_u64(CHUNK_TABLE, row, "start_offset")?,
            length: get_u64(CHUNK_TABLE, row, "length")?,
            file_name: get_string(CHUNK_TABLE, row, "file_name")?,
            updated_at: get_i64(CHUNK_TABLE, row, "updated_at")?,
        };

        if record.length == 0 {
            return Err(IndexError::InvalidRecord {
                table: CHUNK_TABLE,
                message: format!("zero-length chunk at offset {}", record.start_offset),
            });
        }

        Ok(record)
    }
}

#[async_trait::async_trait]
impl ChunkRepository for SqliteChunkRepository {
    #[instrument(skip(self, tx), fields(resource_id = %resource_id))]
    async fn find_by_resource(
        &self,
        resource_id: &ResourceId,
        tx: Option<TransactionId>,
    ) -> Result<Vec<ChunkRecord>> {
        let sql = "SELECT * FROM chunk_records WHERE resource_id = ? ORDER BY start_offset ASC";
        let rows = query_scoped(self.db.as_ref(), tx, sql, &[resource_id.as_str().into()]).await?;

        let mut chunks = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_chunk(row) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => warn!(error = %e, "Skipping malformed chunk record"),
            }
        }
        Ok(chunks)
    }

    async fn find_at(
        &self,
        resource_id: &ResourceId,
        start_offset: u64,
        tx: Option<TransactionId>,
    ) -> Result<Option<ChunkRecord>> {
        let sql = "SELECT * FROM chunk_records WHERE resource_id = ? AND start_offset = ?";
        let params = [
            QueryValue::from(resource_id.as_str()),
            to_sql_offset("start_offset", start_offset)?,
        ];
        let rows = query_scoped(self.db.as_ref(), tx, sql, &params).await?;

        rows.first().map(Self::row_to_chunk).transpose()
    }

    #[instrument(skip(self, record, tx), fields(resource_id = %record.resource_id, start = record.start_offset))]
    async fn upsert(&self, record: &ChunkRecord, tx: Option<TransactionId>) -> Result<()> {
        if record.length == 0 {
            return Err(IndexError::InvalidInput {
                field: "length".to_string(),
                message: "chunk length must be positive".to_string(),
            });
        }

        let sql = r#"
            INSERT OR REPLACE INTO chunk_records (
                resource_id, start_offset, length, file_name, updated_at
            ) VALUES (?, ?, ?, ?, ?)
        "#;

        let params = [
            QueryValue::from(record.resource_id.as_str()),
            to_sql_offset("start_offset", record.start_offset)?,
            to_sql_offset("length", record.length)?,
            QueryValue::from(record.file_name.as_str()),
            QueryValue::Integer(record.updated_at),
        ];

        execute_scoped(self.db.as_ref(), tx, sql, &params)
            .await
            .map_err(|e| {
                error!("Failed to upsert chunk record: {}", e);
                e
            })?;

        Ok(())
    }

    async fn delete_by_resource(
        &self,
        resource_id: &ResourceId,
        tx: Option<TransactionId>,
    ) -> Result<u64> {
        let sql = "DELETE FROM chunk_records WHERE resource_id = ?";
        execute_scoped(self.db.as_ref(), tx, sql, &[resource_id.as_str().into()]).await
    }

    async fn delete_all(&self, tx: Option<TransactionId>) -> Result<u64> {
        execute_scoped(self.db.as_ref(), tx, "DELETE FROM chunk_records", &[]).await
    }

    async fn file_names(&self) -> Result<Vec<String>> {
        let rows = self
            .db
            .query("SELECT file_name FROM chunk_records", &[])
            .await?;
        rows.iter()
            .map(|row| get_string(CHUNK_TABLE, row, "file_name"))
            .collect()
    }

    async fn totals(&self) -> Result<(u64, u64)> {
        let sql = "SELECT COUNT(*) AS count, COALESCE(SUM(length), 0) AS bytes FROM chunk_records";
        let rows = self.db.query(sql, &[]).await?;
        match rows.first() {
            Some(row) => Ok((
                get_u64(CHUNK_TABLE, row, "count")?,
                get_u64(CHUNK_TABLE, row, "bytes")?,
            )),
            None => Ok((0, 0)),
        }
    }
}
