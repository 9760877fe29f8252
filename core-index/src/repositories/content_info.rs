//! Content info rows: mime type, total length and range support per resource.

use bridge_traits::database::{DatabaseAdapter, QueryRow, QueryValue, TransactionId};
use std::sync::Arc;
use tracing::{error, instrument};

use super::{execute_scoped, get_i64, get_string, get_u64, query_scoped, to_sql_offset};
use crate::error::Result;
use crate::models::{ContentInfo, ResourceId};
use crate::schema::CONTENT_INFO_TABLE;

#[async_trait::async_trait]
pub trait ContentInfoRepository: Send + Sync {
    async fn find(&self, resource_id: &ResourceId) -> Result<Option<ContentInfo>>;

    /// Insert or replace the single row for `info.resource_id`.
    async fn upsert(&self, info: &ContentInfo) -> Result<()>;

    async fn delete(&self, resource_id: &ResourceId, tx: Option<TransactionId>) -> Result<u64>;

    async fn delete_all(&self, tx: Option<TransactionId>) -> Result<u64>;

    /// Resources ordered by least recent update, oldest first.
    ///
    /// A resource with chunks but no content info row is dated by its
    /// newest chunk.
    async fn find_least_recently_updated(&self, limit: usize) -> Result<Vec<ResourceId>>;

    /// Distinct resources with a content info row or any chunk.
    async fn count(&self) -> Result<u64>;
}

pub struct SqliteContentInfoRepository {
    db: Arc<dyn DatabaseAdapter>,
}

impl SqliteContentInfoRepository {
    pub fn new(db: Arc<dyn DatabaseAdapter>) -> Self {
        Self { db }
    }

    fn row_to_content_info(row: &QueryRow) -> Result<ContentInfo> {
        Ok(ContentInfo {
            resource_id: ResourceId::new(get_string(CONTENT_INFO_TABLE, row, "resource_id")?),
            mime_type: get_string(CONTENT_INFO_TABLE, row, "mime_type")?,
            content_length: get_u64(CONTENT_INFO_TABLE, row, "content_length")?,
            is_byte_range_supported: get_i64(CONTENT_INFO_TABLE, row, "is_byte_range_supported")?
                != 0,
            updated_at: get_i64(CONTENT_INFO_TABLE, row, "updated_at")?,
        })
    }
}

#[async_trait::async_trait]
impl ContentInfoRepository for SqliteContentInfoRepository {
    #[instrument(skip(self), fields(resource_id = %resource_id))]
    async fn find(&self, resource_id: &ResourceId) -> Result<Option<ContentInfo>> {
        let sql = "SELECT * FROM content_info WHERE resource_id = ?";
        let row = self
            .db
            .query_one_optional(sql, &[resource_id.as_str().into()])
            .await?;

        row.as_ref().map(Self::row_to_content_info).transpose()
    }

    #[instrument(skip(self, info), fields(resource_id = %info.resource_id))]
    async fn upsert(&self, info: &ContentInfo) -> Result<()> {
        let sql = r#"
            INSERT OR REPLACE INTO content_info (
                resource_id, mime_type, content_length, is_byte_range_supported, updated_at
            ) VALUES (?, ?, ?, ?, ?)
        "#;

        let params = vec![
            QueryValue::from(info.resource_id.as_str()),
            QueryValue::from(info.mime_type.as_str()),
            to_sql_offset("content_length", info.content_length)?,
            QueryValue::from(info.is_byte_range_supported),
            QueryValue::Integer(info.updated_at),
        ];

        self.db.execute(sql, &params).await.map_err(|e| {
            error!("Failed to upsert content info: {}", e);
            e
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(resource_id = %resource_id))]
    async fn delete(&self, resource_id: &ResourceId, tx: Option<TransactionId>) -> Result<u64> {
        let sql = "DELETE FROM content_info WHERE resource_id = ?";
        execute_scoped(self.db.as_ref(), tx, sql, &[resource_id.as_str().into()]).await
    }

    async fn delete_all(&self, tx: Option<TransactionId>) -> Result<u64> {
        execute_scoped(self.db.as_ref(), tx, "DELETE FROM content_info", &[]).await
    }

    #[instrument(skip(self))]
    async fn find_least_recently_updated(&self, limit: usize) -> Result<Vec<ResourceId>> {
        let sql = r#"
            SELECT resource_id, MIN(updated_at) AS updated_at FROM (
                SELECT resource_id, updated_at FROM content_info
                UNION ALL
                SELECT resource_id, MAX(updated_at) AS updated_at FROM chunk_records
                WHERE resource_id NOT IN (SELECT resource_id FROM content_info)
                GROUP BY resource_id
            )
            GROUP BY resource_id
            ORDER BY updated_at ASC, resource_id ASC
            LIMIT ?
        "#;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = query_scoped(self.db.as_ref(), None, sql, &[limit.into()])
            .await
            .map_err(|e| {
                error!("Failed to query eviction candidates: {}", e);
                e
            })?;

        rows.iter()
            .map(|row| get_string(CONTENT_INFO_TABLE, row, "resource_id").map(ResourceId::new))
            .collect()
    }

    async fn count(&self) -> Result<u64> {
        let rows = self
            .db
            .query(
                "SELECT COUNT(*) AS count FROM (\
                 SELECT resource_id FROM content_info \
                 UNION SELECT resource_id FROM chunk_records)",
                &[],
            )
            .await?;
        match rows.first() {
            Some(row) => get_u64(CONTENT_INFO_TABLE, row, "count"),
            None => Ok(0),
        }
    }
}
