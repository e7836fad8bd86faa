//! Cancellation, deadlines, and correlation ids.
//!
//! Every public entry point accepts a [`Deadline`]; workers poll it
//! cooperatively at their suspension points. CPU-bound transforms run to
//! completion and the orchestrator discards the result if the deadline
//! passed while they ran. There are no implicit globals: the token is an
//! explicit value threaded through every worker call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Cancellation token
// ---------------------------------------------------------------------------

/// Shared cooperative cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// A wall-clock bound plus a cancellation token.
///
/// `Deadline::none()` never expires but can still be cancelled.
#[derive(Debug, Clone)]
pub struct Deadline {
    expires_at: Option<Instant>,
    token: CancelToken,
}

impl Deadline {
    /// No time bound; cancellable only.
    #[must_use]
    pub fn none() -> Self {
        Self {
            expires_at: None,
            token: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + duration),
            token: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn after_millis(ms: u64) -> Self {
        Self::after(Duration::from_millis(ms))
    }

    #[must_use]
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
            || self
                .expires_at
                .is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, saturating at zero. `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Remaining time clamped to `cap`; `cap` itself when unbounded.
    #[must_use]
    pub fn remaining_or(&self, cap: Duration) -> Duration {
        self.remaining().map_or(cap, |r| r.min(cap))
    }

    /// Error out of the current stage if the deadline has passed.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_expired() {
            return Err(Error::Timeout {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

// ---------------------------------------------------------------------------
// Correlation ids
// ---------------------------------------------------------------------------

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-unique correlation id: millisecond timestamp plus a sequence
/// number, both hex. Threaded through spans and envelopes.
#[must_use]
pub fn correlation_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0);
    let seq = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{millis:011x}-{:04x}", seq & 0xffff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_deadline_never_expires() {
        let d = Deadline::none();
        assert!(!d.is_expired());
        assert!(d.remaining().is_none());
        assert!(d.check("transform").is_ok());
    }

    #[test]
    fn elapsed_deadline_reports_timeout() {
        let d = Deadline::after(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        assert!(d.is_expired());
        match d.check("capture") {
            Err(Error::Timeout { stage }) => assert_eq!(stage, "capture"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_is_shared_across_clones() {
        let d = Deadline::none();
        let token = d.token();
        let clone = d.clone();
        token.cancel();
        assert!(clone.is_expired());
        assert!(matches!(clone.check("vision"), Err(Error::Cancelled)));
    }

    #[test]
    fn remaining_or_clamps_to_cap() {
        let d = Deadline::after(Duration::from_secs(60));
        assert!(d.remaining_or(Duration::from_secs(5)) <= Duration::from_secs(5));
        let unbounded = Deadline::none();
        assert_eq!(
            unbounded.remaining_or(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn correlation_ids_are_unique() {
        let a = correlation_id();
        let b = correlation_id();
        assert_ne!(a, b);
        assert!(a.contains('-'));
    }
}
