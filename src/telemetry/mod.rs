//! Telemetry and logging infrastructure
//!
//! Structured logging with tracing, plus throttles for failures that can
//! repeat on every frame.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};

use std::time::{Duration, Instant};

/// Time based log throttle
///
/// Admits at most one message per interval and counts what it suppressed.
#[derive(Debug, Clone)]
pub struct RateLimitedLog {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl RateLimitedLog {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// `Some(suppressed_since_last)` when a message may be logged now
    pub fn admit(&mut self, now: Instant) -> Option<u64> {
        let due = self
            .last
            .map(|last| now.saturating_duration_since(last) >= self.interval)
            .unwrap_or(true);

        if due {
            self.last = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

/// Count based throttle: the first failure and every `every`-th after it
#[derive(Debug, Clone)]
pub struct FailureCounter {
    every: u64,
    count: u64,
}

impl FailureCounter {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            count: 0,
        }
    }

    /// Record a failure; `Some(total)` when it should be logged
    pub fn record(&mut self) -> Option<u64> {
        self.count += 1;
        if self.count == 1 || self.count % self.every == 0 {
            Some(self.count)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
