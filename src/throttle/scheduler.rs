//! Core admission scheduler.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace};

use super::cancel::CancelSignal;
use super::keepalive::{NoopKeepAlive, TimerKeepAlive};
use super::queue::{MemoryQueue, QueuedRequest, RequestQueue};
use super::window::{Window, WindowSpec};
use crate::config::RateLimitOptions;
use crate::error::{FloodgateError, Result};

/// Window-based admission scheduler.
///
/// Requests wait in FIFO order until every configured window has spare
/// capacity; cancelled requests are skipped without consuming capacity.
/// The handle is cheaply cloneable; clones share the same windows and queue,
/// which is how one limiter is intentionally shared across several host
/// clients.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

struct Shared {
    /// Window state, held only for short synchronous sections
    windows: Mutex<WindowSet>,
    /// Serializes admission attempts against the (possibly asynchronous) queue
    admission_gate: AsyncMutex<()>,
    queue: Arc<dyn RequestQueue>,
    keep_alive: Arc<dyn TimerKeepAlive>,
}

struct WindowSet {
    windows: Vec<Window>,
    /// Bumped on every reconfiguration; reset tasks from older epochs are stale
    epoch: u64,
}

/// Builder for a [`RateLimiter`] with a custom queue or keep-alive hint.
#[derive(Default)]
pub struct RateLimiterBuilder {
    options: Option<RateLimitOptions>,
    queue: Option<Arc<dyn RequestQueue>>,
    keep_alive: Option<Arc<dyn TimerKeepAlive>>,
}

impl RateLimiterBuilder {
    pub fn options(mut self, options: RateLimitOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Supply a caller-owned backing queue. The queue is fixed for the
    /// lifetime of the limiter so reconfiguration can never lose queued
    /// requests.
    pub fn queue(mut self, queue: Arc<dyn RequestQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn keep_alive(mut self, keep_alive: Arc<dyn TimerKeepAlive>) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn build(self) -> Result<RateLimiter> {
        let specs = match &self.options {
            Some(options) => options.build_windows()?,
            None => Vec::new(),
        };
        Ok(RateLimiter::assemble(
            specs,
            self.queue.unwrap_or_else(|| Arc::new(MemoryQueue::new())),
            self.keep_alive.unwrap_or_else(|| Arc::new(NoopKeepAlive)),
        ))
    }
}

impl RateLimiter {
    /// Create an unconfigured limiter: every request is admitted immediately
    /// and [`max_rps`](Self::max_rps) reports 0.
    pub fn new() -> Self {
        Self::assemble(
            Vec::new(),
            Arc::new(MemoryQueue::new()),
            Arc::new(NoopKeepAlive),
        )
    }

    /// Create a limiter from validated options.
    pub fn with_options(options: &RateLimitOptions) -> Result<Self> {
        let specs = options.build_windows()?;
        Ok(Self::assemble(
            specs,
            Arc::new(MemoryQueue::new()),
            Arc::new(NoopKeepAlive),
        ))
    }

    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    fn assemble(
        specs: Vec<WindowSpec>,
        queue: Arc<dyn RequestQueue>,
        keep_alive: Arc<dyn TimerKeepAlive>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                windows: Mutex::new(WindowSet {
                    windows: specs.into_iter().map(Window::new).collect(),
                    epoch: 0,
                }),
                admission_gate: AsyncMutex::new(()),
                queue,
                keep_alive,
            }),
        }
    }

    /// Wait until every configured window has capacity for this request.
    ///
    /// The request joins the pending queue and the admission attempt runs on
    /// the next scheduler tick, so near-simultaneous callers are released in
    /// FIFO order. If `cancel` fires before admission the returned error
    /// carries the cancellation reason and no window capacity is consumed.
    pub async fn acquire(&self, cancel: Option<Arc<dyn CancelSignal>>) -> Result<()> {
        let (request, admitted) = QueuedRequest::new(cancel);
        self.shared.queue.enqueue(request).await;
        Arc::clone(&self.shared).spawn_drain();
        match admitted.await {
            Ok(outcome) => outcome,
            Err(_) => Err(FloodgateError::Cancelled("rate limiter dropped".to_string())),
        }
    }

    /// Notify the scheduler that a previously admitted request has completed,
    /// successfully or not, and attempt the next admission.
    pub async fn release(&self) {
        Arc::clone(&self.shared).drain().await;
    }

    /// Effective rate of the primary window in requests per second, or 0 when
    /// unconfigured.
    pub fn max_rps(&self) -> f64 {
        let set = self.shared.windows.lock();
        set.windows.first().map(|w| w.spec.max_rps()).unwrap_or(0.0)
    }

    /// Replace the configuration with a single window of `rps` per second.
    pub fn set_max_rps(&self, rps: f64) -> Result<()> {
        self.set_rate_limit_options(Some(&RateLimitOptions::per_milliseconds(rps, 1000.0)))
    }

    /// Replace the active windows.
    ///
    /// `None` is a no-op. Invalid options fail before any state is touched,
    /// leaving the prior windows and their timers intact. On success every
    /// prior reset timer is cleared, fresh zero-count windows are installed,
    /// and a drain runs so queued requests that are now unblocked flow out.
    pub fn set_rate_limit_options(&self, options: Option<&RateLimitOptions>) -> Result<()> {
        let Some(options) = options else {
            trace!("ignoring absent rate limit options");
            return Ok(());
        };
        let specs = options.build_windows()?;
        self.install(specs);
        Ok(())
    }

    /// The backing queue handle.
    pub fn queue(&self) -> Arc<dyn RequestQueue> {
        Arc::clone(&self.shared.queue)
    }

    fn install(&self, specs: Vec<WindowSpec>) {
        {
            let mut set = self.shared.windows.lock();
            for window in set.windows.iter_mut() {
                window.clear_timer();
            }
            set.epoch += 1;
            set.windows = specs.into_iter().map(Window::new).collect();
        }
        debug!("installed new rate limit windows");
        Arc::clone(&self.shared).spawn_drain();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Shared {
    /// Schedule a drain on the next scheduler tick. Outside a runtime this is
    /// a no-op, which is fine: nothing can be queued without one.
    fn spawn_drain(self: Arc<Self>) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                self.drain().await;
            });
        }
    }

    /// Run admission attempts until the queue is empty or a window is full.
    ///
    /// Attempts serialize on the admission gate: at most one may be in flight
    /// against the backing queue, and concurrent triggers line up behind it.
    /// Invoking this when nothing is admissible is a no-op, so it is safe to
    /// trigger from every enqueue, release, reset, and reconfiguration.
    async fn drain(self: Arc<Self>) {
        let _gate = self.admission_gate.lock().await;
        loop {
            if self.queue.len().await == 0 {
                return;
            }

            {
                let set = self.windows.lock();
                if let Some(full) = set.windows.iter().find(|w| w.is_full()) {
                    trace!(
                        capacity = full.spec.capacity,
                        period_ms = full.spec.period_ms,
                        "window full, queued work waits for its reset timer"
                    );
                    if full.reset_task.is_some() {
                        self.keep_alive.keep_alive();
                    }
                    return;
                }
            }

            let Some(request) = self.queue.dequeue().await else {
                return;
            };
            if !request.resolve() {
                debug!("skipped cancelled request without consuming capacity");
                continue;
            }

            let queue_idle = self.queue.len().await == 0;
            let mut set = self.windows.lock();
            let epoch = set.epoch;
            for (index, window) in set.windows.iter_mut().enumerate() {
                window.count += 1;
                if window.count == 1 {
                    let period = window.spec.period();
                    let shared = Arc::downgrade(&self);
                    window.reset_task = Some(tokio::spawn(async move {
                        tokio::time::sleep(period).await;
                        if let Some(shared) = Weak::upgrade(&shared) {
                            shared.reset_window(epoch, index).await;
                        }
                    }));
                    if queue_idle {
                        self.keep_alive.allow_exit();
                    }
                }
            }
        }
    }

    /// Reset timer fired: zero the window and drain newly available capacity.
    ///
    /// Returns a boxed future rather than an `async fn` so its `Send` bound is
    /// declared rather than inferred; the drain it spawns re-enters this method,
    /// and the explicit boxing breaks the auto-trait inference cycle that
    /// otherwise makes the spawned task appear non-`Send`.
    fn reset_window(
        self: Arc<Self>,
        epoch: u64,
        index: usize,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            {
                let mut set = self.windows.lock();
                if set.epoch != epoch {
                    return;
                }
                let Some(window) = set.windows.get_mut(index) else {
                    return;
                };
                window.count = 0;
                window.reset_task = None;
                trace!(index, "window reset");
            }
            self.drain().await;
        })
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for window in self.windows.get_mut().windows.iter_mut() {
            window.clear_timer();
        }
    }
}
