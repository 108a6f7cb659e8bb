//! Cancellation signals checked at admission time.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Predicate answering "is this request still wanted?".
///
/// The scheduler consults the signal immediately before admitting a queued
/// request; a cancelled request is rejected toward its caller and skipped
/// without consuming window capacity.
pub trait CancelSignal: Send + Sync {
    /// The cancellation reason, if the caller is no longer interested.
    fn cancel_reason(&self) -> Option<String>;
}

/// Token-style cancellation carrying a caller-supplied reason.
#[derive(Debug, Default)]
pub struct CancelToken {
    reason: Mutex<Option<String>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the request as cancelled with the given reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        *self.reason.lock() = Some(reason.into());
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason.lock().is_some()
    }
}

impl CancelSignal for CancelToken {
    fn cancel_reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

/// Abort-signal style flag with a fixed reason.
#[derive(Debug, Default)]
pub struct AbortFlag {
    aborted: AtomicBool,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

impl CancelSignal for AbortFlag {
    fn cancel_reason(&self) -> Option<String> {
        self.is_aborted().then(|| "request aborted".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_carries_reason() {
        let token = CancelToken::new();
        assert_eq!(token.cancel_reason(), None);

        token.cancel("cancelled for testing");
        assert!(token.is_cancelled());
        assert_eq!(
            token.cancel_reason(),
            Some("cancelled for testing".to_string())
        );
    }

    #[test]
    fn test_abort_flag_has_fixed_reason() {
        let flag = AbortFlag::new();
        assert_eq!(flag.cancel_reason(), None);

        flag.abort();
        assert!(flag.is_aborted());
        assert_eq!(flag.cancel_reason(), Some("request aborted".to_string()));
    }
}
