//! Interceptor adapter for host HTTP clients.
//!
//! The host client is a black box with a single dispatch capability; the
//! adapter composes the scheduler's admit/release decisions around it as the
//! request/response hook pair.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::RateLimitOptions;
use crate::error::{FloodgateError, Result};
use crate::throttle::{CancelSignal, RateLimiter, RequestQueue};

/// The host HTTP client capability: perform one request against the real
/// transport.
#[async_trait]
pub trait Dispatch: Send + Sync {
    type Request: Send + 'static;
    type Response: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn dispatch(&self, request: Self::Request)
        -> std::result::Result<Self::Response, Self::Error>;
}

/// Error surface of a throttled request.
#[derive(Error, Debug)]
pub enum RequestError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The request never reached the transport: it was cancelled while
    /// queued (or the limiter went away).
    #[error(transparent)]
    Throttle(#[from] FloodgateError),

    /// The underlying client failed; the error passes through unchanged.
    #[error(transparent)]
    Transport(E),
}

/// A host client with the throttling hook pair attached.
///
/// The request hook queues each outgoing request until every configured
/// window has capacity; the response hook notifies the scheduler after each
/// completed call, successful or not, so a failing transport never slows
/// subsequent throughput.
pub struct RateLimitedClient<C: Dispatch> {
    client: C,
    limiter: RateLimiter,
}

impl<C: Dispatch> RateLimitedClient<C> {
    /// Wrap a client without any configured limit.
    pub fn new(client: C) -> Self {
        Self {
            client,
            limiter: RateLimiter::new(),
        }
    }

    /// Wrap a client with validated rate limit options.
    pub fn with_options(client: C, options: &RateLimitOptions) -> Result<Self> {
        Ok(Self {
            client,
            limiter: RateLimiter::with_options(options)?,
        })
    }

    /// Wrap a client with an existing limiter, sharing its windows and queue
    /// with every other client holding a clone of the same handle.
    pub fn with_limiter(client: C, limiter: RateLimiter) -> Self {
        Self { client, limiter }
    }

    /// Perform a throttled request.
    pub async fn request(
        &self,
        request: C::Request,
    ) -> std::result::Result<C::Response, RequestError<C::Error>> {
        self.throttled(request, None).await
    }

    /// Perform a throttled request that may be cancelled while it waits for
    /// admission. A cancellation that fires before admission rejects the
    /// request with its reason and consumes no window capacity.
    pub async fn request_with_cancel(
        &self,
        request: C::Request,
        cancel: Arc<dyn CancelSignal>,
    ) -> std::result::Result<C::Response, RequestError<C::Error>> {
        self.throttled(request, Some(cancel)).await
    }

    async fn throttled(
        &self,
        request: C::Request,
        cancel: Option<Arc<dyn CancelSignal>>,
    ) -> std::result::Result<C::Response, RequestError<C::Error>> {
        self.limiter.acquire(cancel).await?;
        let outcome = self.client.dispatch(request).await;
        if outcome.is_err() {
            debug!("dispatch failed; freeing the window slot anyway");
        }
        // The response hook runs for failures too.
        self.limiter.release().await;
        outcome.map_err(RequestError::Transport)
    }

    /// Effective rate of the primary window, 0 when unconfigured.
    pub fn max_rps(&self) -> f64 {
        self.limiter.max_rps()
    }

    /// Replace the configuration with `rps` requests per second.
    pub fn set_max_rps(&self, rps: f64) -> Result<()> {
        self.limiter.set_max_rps(rps)
    }

    /// Replace the active rate limit options; `None` is a no-op.
    pub fn set_rate_limit_options(&self, options: Option<&RateLimitOptions>) -> Result<()> {
        self.limiter.set_rate_limit_options(options)
    }

    /// The backing queue handle.
    pub fn queue(&self) -> Arc<dyn RequestQueue> {
        self.limiter.queue()
    }

    /// The underlying scheduler handle.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The wrapped host client.
    pub fn inner(&self) -> &C {
        &self.client
    }
}

/// Attach rate limiting to a host client.
///
/// # Example
///
/// ```no_run
/// use async_trait::async_trait;
/// use floodgate::client::Dispatch;
/// use floodgate::config::RateLimitOptions;
///
/// struct Client;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("transport failed")]
/// struct TransportError;
///
/// #[async_trait]
/// impl Dispatch for Client {
///     type Request = String;
///     type Response = String;
///     type Error = TransportError;
///
///     async fn dispatch(&self, request: String) -> Result<String, TransportError> {
///         Ok(request)
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // max 2 requests per second, the rest are delayed
/// let http = floodgate::client::rate_limit(
///     Client,
///     &RateLimitOptions::per_milliseconds(2.0, 1000.0),
/// )?;
/// http.request("https://example.com/api/v1/users.json?page=1".into()).await?;
/// assert_eq!(http.max_rps(), 2.0);
/// http.set_max_rps(3.0)?;
/// # Ok(())
/// # }
/// ```
pub fn rate_limit<C: Dispatch>(
    client: C,
    options: &RateLimitOptions,
) -> Result<RateLimitedClient<C>> {
    RateLimitedClient::with_options(client, options)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::join_all;
    use tokio::time::Instant;

    use super::*;
    use crate::throttle::CancelToken;

    #[derive(Debug, Error)]
    #[error("dispatch failed")]
    struct FakeTransportError;

    /// Test double for the host client.
    struct FakeClient {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeClient {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Dispatch for FakeClient {
        type Request = String;
        type Response = String;
        type Error = FakeTransportError;

        async fn dispatch(
            &self,
            request: String,
        ) -> std::result::Result<String, FakeTransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(FakeTransportError)
            } else {
                Ok(request)
            }
        }
    }

    async fn run_requests(
        http: &Arc<RateLimitedClient<FakeClient>>,
        count: usize,
    ) -> Vec<(bool, Duration)> {
        let start = Instant::now();
        let tasks: Vec<_> = (0..count)
            .map(|_| {
                let http = Arc::clone(http);
                tokio::spawn(async move {
                    let outcome = http.request("/users".to_string()).await;
                    (outcome.is_ok(), start.elapsed())
                })
            })
            .collect();
        join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_flow_through_to_the_transport() {
        let http = rate_limit(
            FakeClient::new(),
            &RateLimitOptions::per_milliseconds(2.0, 1000.0),
        )
        .unwrap();
        let body = http.request("/users".to_string()).await.unwrap();
        assert_eq!(body, "/users");
        assert_eq!(http.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_request_waits_for_window_reset() {
        let http = Arc::new(
            rate_limit(
                FakeClient::new(),
                &RateLimitOptions::per_milliseconds(2.0, 1000.0),
            )
            .unwrap(),
        );
        let results = run_requests(&http, 3).await;
        assert!(results.iter().all(|(ok, _)| *ok));
        assert!(results[2].1 >= Duration::from_millis(1000));
        assert_eq!(http.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dispatches_free_capacity_like_successes() {
        let succeeding = Arc::new(
            rate_limit(
                FakeClient::new(),
                &RateLimitOptions::per_milliseconds(1.0, 100.0),
            )
            .unwrap(),
        );
        let failing = Arc::new(
            rate_limit(
                FakeClient::failing(),
                &RateLimitOptions::per_milliseconds(1.0, 100.0),
            )
            .unwrap(),
        );

        let ok_results = run_requests(&succeeding, 3).await;
        let err_results = run_requests(&failing, 3).await;

        assert!(ok_results.iter().all(|(ok, _)| *ok));
        assert!(err_results.iter().all(|(ok, _)| !*ok));
        assert_eq!(failing.inner().calls.load(Ordering::SeqCst), 3);

        // Identical throughput: the last request of each batch leaves after
        // two window resets.
        assert_eq!(ok_results[2].1, err_results[2].1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_pass_through_unchanged() {
        let http = rate_limit(
            FakeClient::failing(),
            &RateLimitOptions::max_rps(1.0),
        )
        .unwrap();
        match http.request("/users".to_string()).await {
            Err(RequestError::Transport(FakeTransportError)) => {}
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_rejects_with_its_reason() {
        let http = rate_limit(FakeClient::new(), &RateLimitOptions::max_rps(1.0)).unwrap();

        let token = Arc::new(CancelToken::new());
        token.cancel("cancelled for testing");
        let outcome = http
            .request_with_cancel("/users".to_string(), token)
            .await;
        match outcome {
            Err(RequestError::Throttle(FloodgateError::Cancelled(reason))) => {
                assert_eq!(reason, "cancelled for testing");
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        // The transport never saw the request.
        assert_eq!(http.inner().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_request_never_reaches_the_transport() {
        let http = rate_limit(FakeClient::new(), &RateLimitOptions::max_rps(1.0)).unwrap();

        let flag = Arc::new(crate::throttle::AbortFlag::new());
        flag.abort();
        let outcome = http.request_with_cancel("/users".to_string(), flag).await;
        match outcome {
            Err(RequestError::Throttle(FloodgateError::Cancelled(reason))) => {
                assert_eq!(reason, "request aborted");
            }
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(http.inner().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_sharing_a_limiter_share_its_windows() {
        let limiter = RateLimiter::with_options(&RateLimitOptions::per_milliseconds(1.0, 1000.0))
            .unwrap();
        let first = RateLimitedClient::with_limiter(FakeClient::new(), limiter.clone());
        let second = RateLimitedClient::with_limiter(FakeClient::new(), limiter);

        let start = Instant::now();
        first.request("/users".to_string()).await.unwrap();
        second.request("/users".to_string()).await.unwrap();

        // The second client waited on the window the first one filled.
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
