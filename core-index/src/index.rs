//! The metadata index: a single FIFO worker in front of the repositories.
//!
//! Every read and write is submitted as a job to one task, which runs jobs
//! strictly in submission order. Multi-statement writes additionally run in
//! a transaction that is rolled back on failure.

use bridge_traits::database::{DatabaseAdapter, TransactionId};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{IndexError, Result};
use crate::models::{ChunkRecord, ContentInfo, ResourceId};
use crate::repositories::{
    ChunkRepository, ContentInfoRepository, SqliteChunkRepository, SqliteContentInfoRepository,
};
use crate::schema;

type Job = Box<dyn FnOnce(Arc<IndexStore>) -> BoxFuture<'static, ()> + Send>;

/// Aggregate row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexTotals {
    pub resources: u64,
    pub chunks: u64,
    pub chunk_bytes: u64,
}

/// State owned by the worker task.
struct IndexStore {
    db: Arc<dyn DatabaseAdapter>,
    content_info: Box<dyn ContentInfoRepository>,
    chunks: Box<dyn ChunkRepository>,
}

impl IndexStore {
    /// Run `body` inside a transaction, rolling back if it fails.
    async fn transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a IndexStore, TransactionId) -> BoxFuture<'a, Result<T>>,
    {
        let tx = self.db.begin_transaction().await?;
        match body(self, tx).await {
            Ok(value) => {
                self.db.commit_transaction(tx).await?;
                Ok(value)
            }
            Err(e) => {
                warn!(error = %e, "Rolling back index transaction");
                if let Err(rollback) = self.db.rollback_transaction(tx).await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// Persistent index of content info and chunk records.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct MetadataIndex {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    db: Arc<dyn DatabaseAdapter>,
}

impl MetadataIndex {
    /// Ensure the schema exists and start the worker.
    #[instrument(skip(db))]
    pub async fn open(db: Arc<dyn DatabaseAdapter>) -> Result<Self> {
        db.initialize().await?;
        schema::ensure_schema(db.as_ref()).await?;

        let store = Arc::new(IndexStore {
            db: Arc::clone(&db),
            content_info: Box::new(SqliteContentInfoRepository::new(Arc::clone(&db))),
            chunks: Box::new(SqliteChunkRepository::new(Arc::clone(&db))),
        });

        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job(Arc::clone(&store)).await;
            }
            debug!("Metadata index worker stopped");
        });

        info!("Metadata index opened");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            db,
        })
    }

    /// Drain queued jobs, stop the worker and close the database.
    pub async fn close(&self) -> Result<()> {
        let sender = self.sender.lock().take();
        drop(sender);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Metadata index worker ended abnormally");
            }
        }

        self.db.close().await?;
        info!("Metadata index closed");
        Ok(())
    }

    async fn submit<T, F, Fut>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<IndexStore>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let sender = self.sender.lock().clone().ok_or(IndexError::Closed)?;
        let (reply, response) = oneshot::channel();

        let job: Job = Box::new(move |store| {
            Box::pin(async move {
                let _ = reply.send(work(store).await);
            })
        });

        sender.send(job).map_err(|_| IndexError::Closed)?;
        response.await.map_err(|_| IndexError::Closed)?
    }

    // =========================================================================
    // Content info
    // =========================================================================

    pub async fn content_info(&self, resource_id: &ResourceId) -> Result<Option<ContentInfo>> {
        let resource_id = resource_id.clone();
        self.submit(move |store| async move { store.content_info.find(&resource_id).await })
            .await
    }

    pub async fn upsert_content_info(&self, info: ContentInfo) -> Result<()> {
        self.submit(move |store| async move { store.content_info.upsert(&info).await })
            .await
    }

    // =========================================================================
    // Chunks
    // =========================================================================

    /// Chunks of `resource_id`, ascending by start offset.
    pub async fn chunks(&self, resource_id: &ResourceId) -> Result<Vec<ChunkRecord>> {
        let resource_id = resource_id.clone();
        self.submit(move |store| async move {
            store.chunks.find_by_resource(&resource_id, None).await
        })
        .await
    }

    /// Insert or replace a chunk record, returning the record it replaced.
    pub async fn save_chunk(&self, record: ChunkRecord) -> Result<Option<ChunkRecord>> {
        self.submit(move |store| async move {
            store
                .transaction(move |store, tx| {
                    Box::pin(async move {
                        let previous = store
                            .chunks
                            .find_at(&record.resource_id, record.start_offset, Some(tx))
                            .await?;
                        store.chunks.upsert(&record, Some(tx)).await?;
                        Ok(previous)
                    })
                })
                .await
        })
        .await
    }

    /// Backing file names referenced by any chunk record.
    pub async fn chunk_file_names(&self) -> Result<Vec<String>> {
        self.submit(|store| async move { store.chunks.file_names().await })
            .await
    }

    // =========================================================================
    // Resource lifecycle
    // =========================================================================

    /// Delete the content info row and all chunk records of one resource in
    /// one transaction. Returns the deleted chunk records so the caller can
    /// remove their files.
    pub async fn remove_resource(&self, resource_id: &ResourceId) -> Result<Vec<ChunkRecord>> {
        let resource_id = resource_id.clone();
        self.submit(move |store| async move {
            store
                .transaction(move |store, tx| {
                    Box::pin(async move {
                        let chunks = store.chunks.find_by_resource(&resource_id, Some(tx)).await?;
                        store.chunks.delete_by_resource(&resource_id, Some(tx)).await?;
                        store.content_info.delete(&resource_id, Some(tx)).await?;
                        Ok(chunks)
                    })
                })
                .await
        })
        .await
    }

    /// Up to `limit` resources, least recently updated first.
    pub async fn least_recently_updated(&self, limit: usize) -> Result<Vec<ResourceId>> {
        self.submit(move |store| async move {
            store.content_info.find_least_recently_updated(limit).await
        })
        .await
    }

    /// Delete every row of both tables.
    pub async fn clear(&self) -> Result<()> {
        self.submit(|store| async move {
            store
                .transaction(|store, tx| {
                    Box::pin(async move {
                        store.chunks.delete_all(Some(tx)).await?;
                        store.content_info.delete_all(Some(tx)).await?;
                        Ok(())
                    })
                })
                .await
        })
        .await
    }

    pub async fn totals(&self) -> Result<IndexTotals> {
        self.submit(|store| async move {
            let resources = store.content_info.count().await?;
            let (chunks, chunk_bytes) = store.chunks.totals().await?;
            Ok(IndexTotals {
                resources,
                chunks,
                chunk_bytes,
            })
        })
        .await
    }
}
