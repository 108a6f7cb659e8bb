//! Counting window state.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Validated configuration of a single counting window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSpec {
    /// Maximum admissions per period
    pub capacity: u64,
    /// Period length in milliseconds
    pub period_ms: f64,
}

impl WindowSpec {
    /// Create a new window spec.
    pub fn new(capacity: u64, period_ms: f64) -> Self {
        Self {
            capacity,
            period_ms,
        }
    }

    /// Period length as a `Duration`.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.period_ms / 1000.0)
    }

    /// Effective requests-per-second rate of this window.
    pub fn max_rps(&self) -> f64 {
        self.capacity as f64 / (self.period_ms / 1000.0)
    }
}

/// Live counting state for one window.
///
/// `count` tracks admissions in the current period and returns to zero
/// exactly one period after the first admission of a fresh window.
/// Invariant: `count <= spec.capacity`.
pub(crate) struct Window {
    pub(crate) spec: WindowSpec,
    pub(crate) count: u64,
    /// Armed reset task, present while the current period has admissions
    pub(crate) reset_task: Option<JoinHandle<()>>,
}

impl Window {
    pub(crate) fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            count: 0,
            reset_task: None,
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.count >= self.spec.capacity
    }

    /// Abort the armed reset task, if any.
    pub(crate) fn clear_timer(&mut self) {
        if let Some(task) = self.reset_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_conversion() {
        assert_eq!(WindowSpec::new(1, 1000.0).period(), Duration::from_secs(1));
        assert_eq!(
            WindowSpec::new(1, 500.0).period(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_max_rps_derivation() {
        assert_eq!(WindowSpec::new(2, 1000.0).max_rps(), 2.0);
        assert_eq!(WindowSpec::new(10, 500.0).max_rps(), 20.0);
        assert_eq!(WindowSpec::new(60, 60_000.0).max_rps(), 1.0);
        assert_eq!(WindowSpec::new(3600, 3_600_000.0).max_rps(), 1.0);
    }

    #[test]
    fn test_window_fills_at_capacity() {
        let mut window = Window::new(WindowSpec::new(2, 1000.0));
        assert!(!window.is_full());
        window.count = 1;
        assert!(!window.is_full());
        window.count = 2;
        assert!(window.is_full());
    }
}
