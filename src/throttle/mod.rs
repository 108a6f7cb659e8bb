//! Admission scheduling and window state management.

mod cancel;
mod keepalive;
mod queue;
mod scheduler;
mod window;

pub use cancel::{AbortFlag, CancelSignal, CancelToken};
pub use keepalive::{NoopKeepAlive, TimerKeepAlive};
pub use queue::{MemoryQueue, QueuedRequest, RequestQueue};
pub use scheduler::{RateLimiter, RateLimiterBuilder};
pub use window::WindowSpec;
