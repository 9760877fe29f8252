//! Plan execution.
//!
//! One tokio task per request runs the plan steps strictly in order. Local
//! reads come from the [`ByteStore`]; remote fetches stream from the
//! [`HttpClient`] straight to the consumer while the same bytes accumulate
//! for persistence. A fetch is persisted only after its body finished
//! cleanly, through the [`ChunkPersister`] the caller supplied.

use async_trait::async_trait;
use bridge_traits::error::NetworkErrorKind;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bytes::{Bytes, BytesMut};
use core_index::{ByteRange, ResourceId};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::byte_store::ByteStore;
use crate::error::{CacheError, Result};
use crate::planner::{Plan, PlanStep};
use crate::request::{self, LoaderEvent, RequestHandle};

const MAX_PREALLOCATION: u64 = 1 << 20;

/// Stores bytes fetched by a completed remote step.
#[async_trait]
pub trait ChunkPersister: Send + Sync {
    async fn persist(&self, resource_id: &ResourceId, start: u64, data: Bytes) -> Result<()>;
}

/// Everything one request needs besides the plan.
#[derive(Debug, Clone)]
pub struct FetchTarget {
    pub resource_id: ResourceId,
    pub url: String,
}

pub struct FetchPipeline {
    http: Arc<dyn HttpClient>,
    store: Arc<ByteStore>,
    data_headers: HashMap<String, String>,
    event_bus: Option<EventBus>,
}

impl FetchPipeline {
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: Arc<ByteStore>,
        data_headers: HashMap<String, String>,
    ) -> Self {
        Self {
            http,
            store,
            data_headers,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Spawn execution of `plan` and return the consumer handle.
    pub fn start(
        self: &Arc<Self>,
        target: FetchTarget,
        plan: Plan,
        persister: Arc<dyn ChunkPersister>,
    ) -> RequestHandle {
        let (events, handle) = request::channel(target.resource_id.clone(), plan.requested);
        let token = handle.cancellation_token();
        let pipeline = Arc::clone(self);

        tokio::spawn(async move {
            pipeline.run(target, plan, persister, events, token).await;
        });

        handle
    }

    #[instrument(
        skip(self, target, plan, persister, events, token),
        fields(resource_id = %target.resource_id, range = %plan.requested)
    )]
    async fn run(
        &self,
        target: FetchTarget,
        plan: Plan,
        persister: Arc<dyn ChunkPersister>,
        events: UnboundedSender<LoaderEvent>,
        token: CancellationToken,
    ) {
        let outcome = self
            .execute(&target, &plan, persister.as_ref(), &events, &token)
            .await;

        let terminal = match outcome {
            Ok(()) => {
                debug!(steps = plan.steps.len(), "Request completed");
                LoaderEvent::Completed
            }
            Err(CacheError::Cancelled) => {
                debug!("Request cancelled");
                LoaderEvent::Cancelled
            }
            Err(error) => {
                warn!(error = %error, "Request failed");
                if let Some(bus) = &self.event_bus {
                    bus.emit(CoreEvent::Cache(CacheEvent::RequestFailed {
                        resource_id: target.resource_id.to_string(),
                        start: plan.requested.start,
                        end: plan.requested.end,
                        message: error.to_string(),
                    }))
                    .ok();
                }
                LoaderEvent::Failed(error)
            }
        };

        // The consumer may already be gone.
        let _ = events.send(terminal);
    }

    async fn execute(
        &self,
        target: &FetchTarget,
        plan: &Plan,
        persister: &dyn ChunkPersister,
        events: &UnboundedSender<LoaderEvent>,
        token: &CancellationToken,
    ) -> Result<()> {
        for step in &plan.steps {
            if token.is_cancelled() {
                return Err(CacheError::Cancelled);
            }

            match step {
                PlanStep::LocalRead { chunk, range } => {
                    let offset = range.start - chunk.start_offset;
                    let data = self.store.read(&chunk.file_name, offset, range.len()).await?;
                    // Reads run to completion; a cancelled result is discarded.
                    if token.is_cancelled() {
                        return Err(CacheError::Cancelled);
                    }
                    debug!(file = %chunk.file_name, range = %range, "Served from cache");
                    deliver(events, data)?;
                }
                PlanStep::RemoteFetch { range, overlap } => {
                    self.fetch(target, *range, *overlap, persister, events, token)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn fetch(
        &self,
        target: &FetchTarget,
        range: ByteRange,
        overlap: u64,
        persister: &dyn ChunkPersister,
        events: &UnboundedSender<LoaderEvent>,
        token: &CancellationToken,
    ) -> Result<()> {
        let requested = ByteRange::new(range.start, range.end + overlap);
        let request = HttpRequest::get(target.url.as_str())
            .headers(self.data_headers.clone())
            .range(requested.start, requested.end);

        debug!(range = %requested, "Fetching from origin");

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(CacheError::Cancelled),
            response = self.http.execute(request) => response?,
        };
        let promised = check_response(&response, requested)?;

        let mut body = response.body;
        let mut buffer = BytesMut::with_capacity(promised.min(MAX_PREALLOCATION) as usize);
        let mut delivered = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(CacheError::Cancelled),
                next = body.next() => next,
            };
            let Some(piece) = next else { break };
            let piece = piece?;

            let remaining = promised - buffer.len() as u64;
            if remaining == 0 {
                break;
            }
            let piece = if piece.len() as u64 > remaining {
                piece.slice(..remaining as usize)
            } else {
                piece
            };

            let deliverable = (range.len() - delivered).min(piece.len() as u64);
            if deliverable > 0 {
                deliver(events, piece.slice(..deliverable as usize))?;
                delivered += deliverable;
            }
            buffer.extend_from_slice(&piece);
        }

        let received = buffer.len() as u64;
        if received < promised {
            return Err(CacheError::NetworkFailure {
                kind: NetworkErrorKind::ConnectionLost,
                message: format!(
                    "body ended after {} of {} bytes",
                    received, promised
                ),
            });
        }

        if received > 0 {
            // Caching is best-effort; the consumer already has the bytes.
            if let Err(error) = persister
                .persist(&target.resource_id, range.start, buffer.freeze())
                .await
            {
                warn!(error = %error, start = range.start, bytes = received, "Failed to persist chunk");
            }
        }

        Ok(())
    }
}

fn deliver(events: &UnboundedSender<LoaderEvent>, data: Bytes) -> Result<()> {
    events
        .send(LoaderEvent::Data(data))
        .map_err(|_| CacheError::Cancelled)
}

/// Validate a data response and return how many bytes it will carry.
///
/// Origins may shorten a range that runs past the end of the resource, so
/// the promise comes from `Content-Range` or `Content-Length` when present.
fn check_response(response: &HttpResponse, requested: ByteRange) -> Result<u64> {
    if !response.is_success() {
        return Err(CacheError::http_status(response.status));
    }

    if let Some(content_range) = response.content_range() {
        if let (Some(first), Some(last)) = (content_range.first, content_range.last) {
            if first != requested.start {
                return Err(CacheError::MalformedResponse(format!(
                    "expected range starting at {}, got {}",
                    requested.start, first
                )));
            }
            let served = last.saturating_add(1).saturating_sub(first);
            return Ok(served.min(requested.len()));
        }
    } else if response.status == 200 && requested.start > 0 {
        return Err(CacheError::MalformedResponse(
            "origin ignored the Range header".to_string(),
        ));
    }

    Ok(response
        .content_length()
        .map_or(requested.len(), |length| length.min(requested.len())))
}
