//! Timer keep-alive hinting.

/// Platform hint controlling whether a pending reset timer alone should keep
/// the process alive.
///
/// An armed timer is assumed to keep the process alive by default. The
/// scheduler invokes `keep_alive` when queued work is blocked on a full
/// window's reset timer, and `allow_exit` when a timer is armed with nothing
/// queued behind it, so an idle limiter never pins the process.
pub trait TimerKeepAlive: Send + Sync {
    /// Pending work is blocked on an armed timer; keep the process alive.
    fn keep_alive(&self);

    /// No work is pending; the armed timer should not prevent process exit.
    fn allow_exit(&self);
}

/// Default hint for runtimes without the concept: tokio timers never pin the
/// process, so both operations are no-ops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopKeepAlive;

impl TimerKeepAlive for NoopKeepAlive {
    fn keep_alive(&self) {}

    fn allow_exit(&self) {}
}
