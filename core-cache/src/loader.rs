//! Per-player resource loader.
//!
//! A [`ResourceLoader`] is bound to one resource and URL and keeps at most
//! one request live: starting a new range cancels the previous one before
//! it is planned. The "current request" slot is a plain mutex held only
//! for synchronous bookkeeping; cancelling is a token flip and never calls
//! back into the loader, so no lock is ever re-entered.

use bytes::Bytes;
use core_index::{ByteRange, ContentInfo, ResourceId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::manager::CacheManager;
use crate::request::{RequestHandle, RequestId};

struct ActiveRequest {
    sequence: u64,
    id: RequestId,
    range: ByteRange,
    token: CancellationToken,
}

pub struct ResourceLoader {
    manager: CacheManager,
    resource_id: ResourceId,
    url: String,
    current: Mutex<Option<ActiveRequest>>,
    sequence: AtomicU64,
}

impl ResourceLoader {
    /// Loader identified by the hash of `url`.
    pub fn new(manager: CacheManager, url: impl Into<String>) -> Self {
        let url = url.into();
        let resource_id = ResourceId::from_url(&url);
        Self::with_resource_id(manager, resource_id, url)
    }

    pub fn with_resource_id(
        manager: CacheManager,
        resource_id: ResourceId,
        url: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            resource_id,
            url: url.into(),
            current: Mutex::new(None),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Mime type, length and range support of the bound resource.
    pub async fn content_info(&self) -> Result<ContentInfo> {
        self.manager.content_info(&self.resource_id, &self.url).await
    }

    /// Cancel whatever is in flight and start `[start, end)`.
    pub async fn request_range(&self, start: u64, end: u64) -> Result<RequestHandle> {
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.cancel_older_than(sequence);

        let range = ByteRange::new(start, end);
        let handle = self
            .manager
            .query(&self.resource_id, &self.url, range)
            .await?;

        let (superseded, stale) = {
            let mut current = self.current.lock();
            // A cancel() or a later request_range arrived while this one planned.
            if self.sequence.load(Ordering::Acquire) != sequence {
                (None, true)
            } else {
                let previous = current.replace(ActiveRequest {
                    sequence,
                    id: handle.id(),
                    range,
                    token: handle.cancellation_token(),
                });
                (previous.map(|active| active.token), false)
            }
        };

        if let Some(previous) = superseded {
            previous.cancel();
        }
        if stale {
            handle.cancel();
        }

        debug!(
            resource_id = %self.resource_id,
            request = %handle.id(),
            range = %range,
            "Started range request"
        );
        Ok(handle)
    }

    /// Fetch `[start, end)` and gather the bytes.
    pub async fn read_range(&self, start: u64, end: u64) -> Result<Bytes> {
        self.request_range(start, end).await?.collect().await
    }

    /// Cancel the current request, if any, including one still being
    /// planned. Idempotent.
    pub fn cancel(&self) {
        self.sequence.fetch_add(1, Ordering::AcqRel);
        self.cancel_older_than(u64::MAX);
    }

    fn cancel_older_than(&self, sequence: u64) {
        let active = {
            let mut current = self.current.lock();
            if current.as_ref().map_or(false, |active| active.sequence < sequence) {
                current.take()
            } else {
                None
            }
        };
        if let Some(active) = active {
            debug!(
                resource_id = %self.resource_id,
                request = %active.id,
                range = %active.range,
                "Cancelling range request"
            );
            active.token.cancel();
        }
    }

    pub fn current_request(&self) -> Option<RequestId> {
        self.current.lock().as_ref().map(|active| active.id)
    }
}

impl Drop for ResourceLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}
