//! Request handles and event delivery.
//!
//! A [`RequestHandle`] is the single consumer side of one range request.
//! The pipeline task pushes [`LoaderEvent`]s into an unbounded channel; the
//! handle yields them in order and guarantees exactly one terminal event.
//! Cancellation is checked immediately before every event is handed out,
//! so once a request is cancelled the consumer sees `Cancelled` and
//! nothing else, even if data was already buffered.

use bytes::{Bytes, BytesMut};
use core_index::{ByteRange, ResourceId};
use std::fmt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{CacheError, Result};

/// Unique identifier of one range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a consumer observes for one request.
#[derive(Debug)]
pub enum LoaderEvent {
    /// Next bytes in ascending offset order.
    Data(Bytes),
    Completed,
    Failed(CacheError),
    Cancelled,
}

impl LoaderEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoaderEvent::Data(_))
    }
}

/// Callback-style consumer driven by [`RequestHandle::deliver_to`].
///
/// All callbacks for one request run on the same task, in order, and
/// exactly one of `on_complete`, `on_error` or `on_cancelled` is called.
pub trait RangeConsumer: Send {
    fn on_data(&mut self, data: Bytes);
    fn on_complete(&mut self);
    fn on_error(&mut self, error: CacheError);
    fn on_cancelled(&mut self) {}
}

/// Consumer handle for one range request.
pub struct RequestHandle {
    id: RequestId,
    resource_id: ResourceId,
    range: ByteRange,
    events: mpsc::UnboundedReceiver<LoaderEvent>,
    token: CancellationToken,
    finished: bool,
}

impl RequestHandle {
    pub(crate) fn new(
        resource_id: ResourceId,
        range: ByteRange,
        events: mpsc::UnboundedReceiver<LoaderEvent>,
        token: CancellationToken,
    ) -> Self {
        Self {
            id: RequestId::new(),
            resource_id,
            range,
            events,
            token,
            finished: false,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    /// Cancel the request. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that cancels this request when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Next event, or `None` after the terminal event has been yielded.
    pub async fn next_event(&mut self) -> Option<LoaderEvent> {
        if self.finished {
            return None;
        }

        let event = tokio::select! {
            biased;
            _ = self.token.cancelled() => LoaderEvent::Cancelled,
            event = self.events.recv() => event.unwrap_or_else(|| {
                LoaderEvent::Failed(CacheError::Internal(
                    "pipeline stopped without a terminal event".to_string(),
                ))
            }),
        };

        // Data that raced a cancellation is dropped here.
        let event = if self.token.is_cancelled() {
            LoaderEvent::Cancelled
        } else {
            event
        };

        if event.is_terminal() {
            self.finished = true;
        }
        Some(event)
    }

    /// Drive `consumer` until the terminal event and return it.
    pub async fn deliver_to<C: RangeConsumer>(mut self, mut consumer: C) -> C {
        while let Some(event) = self.next_event().await {
            match event {
                LoaderEvent::Data(data) => consumer.on_data(data),
                LoaderEvent::Completed => consumer.on_complete(),
                LoaderEvent::Failed(error) => consumer.on_error(error),
                LoaderEvent::Cancelled => consumer.on_cancelled(),
            }
        }
        consumer
    }

    /// Run delivery on a designated runtime.
    pub fn deliver_on<C>(self, runtime: &Handle, consumer: C) -> JoinHandle<C>
    where
        C: RangeConsumer + 'static,
    {
        runtime.spawn(self.deliver_to(consumer))
    }

    /// Gather every delivered byte. Cancellation becomes
    /// [`CacheError::Cancelled`].
    pub async fn collect(mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::with_capacity(self.range.len().min(1 << 20) as usize);
        while let Some(event) = self.next_event().await {
            match event {
                LoaderEvent::Data(data) => buffer.extend_from_slice(&data),
                LoaderEvent::Completed => return Ok(buffer.freeze()),
                LoaderEvent::Failed(error) => return Err(error),
                LoaderEvent::Cancelled => return Err(CacheError::Cancelled),
            }
        }
        Err(CacheError::Internal(
            "request already finished".to_string(),
        ))
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.token.cancel();
        }
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("resource_id", &self.resource_id)
            .field("range", &self.range)
            .field("cancelled", &self.token.is_cancelled())
            .field("finished", &self.finished)
            .finish()
    }
}

/// Create a connected sender and handle.
pub(crate) fn channel(
    resource_id: ResourceId,
    range: ByteRange,
) -> (mpsc::UnboundedSender<LoaderEvent>, RequestHandle) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let handle = RequestHandle::new(resource_id, range, receiver, CancellationToken::new());
    (sender, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (mpsc::UnboundedSender<LoaderEvent>, RequestHandle) {
        channel(ResourceId::new("song1"), ByteRange::new(0, 10))
    }

    #[derive(Default)]
    struct Recorder {
        data: Vec<u8>,
        completed: usize,
        errors: usize,
        cancelled: usize,
    }

    impl RangeConsumer for Recorder {
        fn on_data(&mut self, data: Bytes) {
            self.data.extend_from_slice(&data);
        }
        fn on_complete(&mut self) {
            self.completed += 1;
        }
        fn on_error(&mut self, _error: CacheError) {
            self.errors += 1;
        }
        fn on_cancelled(&mut self) {
            self.cancelled += 1;
        }
    }

    #[tokio::test]
    async fn test_events_in_order_then_none() {
        let (tx, mut handle) = handle();
        tx.send(LoaderEvent::Data(Bytes::from_static(b"ab"))).unwrap();
        tx.send(LoaderEvent::Completed).unwrap();

        assert!(matches!(handle.next_event().await, Some(LoaderEvent::Data(d)) if &d[..] == b"ab"));
        assert!(matches!(handle.next_event().await, Some(LoaderEvent::Completed)));
        assert!(handle.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_drops_buffered_data() {
        let (tx, mut handle) = handle();
        tx.send(LoaderEvent::Data(Bytes::from_static(b"ab"))).unwrap();
        tx.send(LoaderEvent::Completed).unwrap();

        handle.cancel();
        assert!(matches!(handle.next_event().await, Some(LoaderEvent::Cancelled)));
        assert!(handle.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_sender_dropped_without_terminal_fails() {
        let (tx, mut handle) = handle();
        drop(tx);
        assert!(matches!(
            handle.next_event().await,
            Some(LoaderEvent::Failed(CacheError::Internal(_)))
        ));
    }

    #[tokio::test]
    async fn test_deliver_to_calls_exactly_one_terminal() {
        let (tx, handle) = handle();
        tx.send(LoaderEvent::Data(Bytes::from_static(b"abc"))).unwrap();
        tx.send(LoaderEvent::Failed(CacheError::Cancelled)).unwrap();
        tx.send(LoaderEvent::Completed).unwrap();

        let recorder = handle.deliver_to(Recorder::default()).await;
        assert_eq!(recorder.data, b"abc");
        assert_eq!(recorder.errors, 1);
        assert_eq!(recorder.completed, 0);
        assert_eq!(recorder.cancelled, 0);
    }

    #[tokio::test]
    async fn test_deliver_on_runtime_handle() {
        let (tx, handle) = handle();
        tx.send(LoaderEvent::Completed).unwrap();

        let recorder = handle
            .deliver_on(&Handle::current(), Recorder::default())
            .await
            .unwrap();
        assert_eq!(recorder.completed, 1);
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels_token() {
        let (_tx, handle) = handle();
        let token = handle.cancellation_token();
        drop(handle);
        assert!(token.is_cancelled());
    }
}
