//! Pending request queue abstraction.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use super::cancel::CancelSignal;
use crate::error::FloodgateError;

type AdmissionSender = oneshot::Sender<Result<(), FloodgateError>>;
pub(crate) type AdmissionReceiver = oneshot::Receiver<Result<(), FloodgateError>>;

/// A not-yet-admitted request continuation.
///
/// Created once per incoming request and removed from the queue exactly once,
/// by the scheduler, in FIFO order.
pub struct QueuedRequest {
    cancel: Option<Arc<dyn CancelSignal>>,
    notify: AdmissionSender,
}

impl QueuedRequest {
    pub(crate) fn new(cancel: Option<Arc<dyn CancelSignal>>) -> (Self, AdmissionReceiver) {
        let (notify, admitted) = oneshot::channel();
        (Self { cancel, notify }, admitted)
    }

    /// Attempt to hand the green light to the waiting caller.
    ///
    /// Returns `false` when the request was cancelled before admission (the
    /// cancellation reason is delivered to the caller instead) or when the
    /// caller has stopped waiting. A `false` resolution must not consume
    /// window capacity.
    pub(crate) fn resolve(self) -> bool {
        if let Some(signal) = &self.cancel {
            if let Some(reason) = signal.cancel_reason() {
                trace!(%reason, "rejecting cancelled request at admission");
                let _ = self.notify.send(Err(FloodgateError::Cancelled(reason)));
                return false;
            }
        }
        self.notify.send(Ok(())).is_ok()
    }
}

/// Ordered backing store for queued requests.
///
/// The scheduler is written against this asynchronous contract; synchronous
/// queues satisfy it with immediately-ready operations. Implementations do
/// not need to serialize their callers: the scheduler runs at most one
/// admission attempt at a time against the store.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    /// Append a request continuation to the tail.
    async fn enqueue(&self, request: QueuedRequest);

    /// Remove and return the head continuation, if any.
    async fn dequeue(&self) -> Option<QueuedRequest>;

    /// Number of requests currently waiting.
    async fn len(&self) -> usize;
}

/// Default in-process FIFO queue.
#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<QueuedRequest>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestQueue for MemoryQueue {
    async fn enqueue(&self, request: QueuedRequest) {
        self.items.lock().push_back(request);
    }

    async fn dequeue(&self) -> Option<QueuedRequest> {
        self.items.lock().pop_front()
    }

    async fn len(&self) -> usize {
        self.items.lock().len()
    }
}
