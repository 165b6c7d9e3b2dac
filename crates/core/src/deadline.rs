//! Per-operation deadlines.
//!
//! Every operation in the spec accepts a deadline (§5 "Cancellation &
//! timeouts"). `Deadline` is threaded through the registry, storage, and
//! query orchestrator so that a multi-transaction operation (delete,
//! retention rewrite, a restarted `read_range` scan) knows when to stop
//! checkpointing and surface `BACKEND_TRANSIENT` instead of starting
//! another round-trip.

use std::time::{Duration, Instant};

/// A point in time by which an operation must complete.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline {
            at: Instant::now() + timeout,
        }
    }

    /// A deadline that never expires. Used by tests and by callers that
    /// manage their own cancellation out of band.
    pub fn far_future() -> Self {
        Deadline::after(Duration::from_secs(365 * 24 * 3600))
    }

    /// Whether the deadline has already passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time remaining, or `Duration::ZERO` if already expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn far_future_is_not_expired() {
        assert!(!Deadline::far_future().is_expired());
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let d = Deadline::after(Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(1));
        assert!(d.is_expired());
    }
}
