//! # Event Bus
//!
//! Broadcast channel for cache and lifecycle notifications, built on
//! `tokio::sync::broadcast`.
//!
//! ```text
//! ┌──────────────┐  emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ CacheManager ├────────>│          ├────────────>│ Subscriber │
//! └──────────────┘         │ EventBus │             └────────────┘
//! ┌──────────────┐  emit   │          │  subscribe  ┌────────────┐
//! │ FetchPipeline├────────>│          ├────────────>│ Subscriber │
//! └──────────────┘         └──────────┘             └────────────┘
//! ```
//!
//! Publishing never blocks. A subscriber that falls more than the buffer
//! size behind receives `RecvError::Lagged(n)` and carries on from the
//! oldest retained event; `RecvError::Closed` means every sender is gone.
//!
//! ```rust
//! use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut events = bus.subscribe();
//!
//! bus.emit(CoreEvent::Cache(CacheEvent::CacheCleared)).ok();
//! assert_eq!(events.recv().await.unwrap(), CoreEvent::Cache(CacheEvent::CacheCleared));
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Chunk store, index and request outcomes
    Cache(CacheEvent),
    /// Context open and close
    Lifecycle(LifecycleEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Lifecycle(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Cache(CacheEvent::RequestFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::CacheTrimmed { .. })
            | CoreEvent::Cache(CacheEvent::CacheCleared)
            | CoreEvent::Lifecycle(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Changes to cached data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// A fetched byte run was stored as a chunk.
    ChunkSaved {
        resource_id: String,
        start_offset: u64,
        length: u64,
    },
    /// Fresh content info was recorded.
    ContentInfoUpdated {
        resource_id: String,
        mime_type: String,
        content_length: u64,
        is_byte_range_supported: bool,
    },
    /// All data of one resource was removed.
    ResourceEvicted {
        resource_id: String,
        chunks: u64,
        bytes: u64,
    },
    /// A trim pass finished.
    CacheTrimmed {
        scanned_bytes: u64,
        evicted: u64,
        freed_bytes: u64,
    },
    /// Every cached file and record was wiped.
    CacheCleared,
    /// A range request ended with an error.
    RequestFailed {
        resource_id: String,
        start: u64,
        end: u64,
        message: String,
    },
}

impl CacheEvent {
    pub fn description(&self) -> &str {
        match self {
            CacheEvent::ChunkSaved { .. } => "Chunk saved",
            CacheEvent::ContentInfoUpdated { .. } => "Content info updated",
            CacheEvent::ResourceEvicted { .. } => "Resource evicted",
            CacheEvent::CacheTrimmed { .. } => "Cache trimmed",
            CacheEvent::CacheCleared => "Cache cleared",
            CacheEvent::RequestFailed { .. } => "Range request failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    Opened { cache_directory: String },
    Closed,
}

impl LifecycleEvent {
    pub fn description(&self) -> &str {
        match self {
            LifecycleEvent::Opened { .. } => "Media cache opened",
            LifecycleEvent::Closed => "Media cache closed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Cloneable broadcast handle. Every clone publishes to the same channel;
/// every [`subscribe`](EventBus::subscribe) call creates an independent
/// receiver that sees events published after it was created.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// `capacity` is the number of events retained per subscriber before
    /// it starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers.
    ///
    /// Returns the number of receivers, or an error when there are none.
    /// Callers that do not care use `.ok()`.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let cache_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Cache(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Next event passing the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if `n` events were missed, `RecvError::Closed`
    /// once every sender is dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing
    /// matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_saved(start: u64) -> CoreEvent {
        CoreEvent::Cache(CacheEvent::ChunkSaved {
            resource_id: "song1".to_string(),
            start_offset: start,
            length: 100,
        })
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(CoreEvent::Cache(CacheEvent::CacheCleared)).is_err());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = EventBus::new(10);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.emit(chunk_saved(0)).unwrap(), 2);
        assert_eq!(a.recv().await.unwrap(), chunk_saved(0));
        assert_eq!(b.recv().await.unwrap(), chunk_saved(0));
    }

    #[tokio::test]
    async fn test_filtered_stream() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Lifecycle(_)));

        bus.emit(chunk_saved(0)).ok();
        bus.emit(CoreEvent::Lifecycle(LifecycleEvent::Closed)).ok();

        assert_eq!(
            stream.recv().await.unwrap(),
            CoreEvent::Lifecycle(LifecycleEvent::Closed)
        );
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(chunk_saved(i)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_severity_and_description() {
        let failed = CoreEvent::Cache(CacheEvent::RequestFailed {
            resource_id: "song1".to_string(),
            start: 0,
            end: 10,
            message: "timed out".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Warning);
        assert_eq!(failed.description(), "Range request failed");
        assert_eq!(chunk_saved(0).severity(), EventSeverity::Debug);
        assert_eq!(
            CoreEvent::Cache(CacheEvent::CacheCleared).severity(),
            EventSeverity::Info
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Cache(CacheEvent::CacheTrimmed {
            scanned_bytes: 200,
            evicted: 2,
            freed_bytes: 150,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("CacheTrimmed"));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
