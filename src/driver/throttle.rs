//! Rate limit for status reports.

use std::time::Duration;

use tokio::time::Instant;

/// Admits at most one report per interval; the first report passes at once.
#[derive(Debug, Clone)]
pub struct StatusThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl StatusThrottle {
    /// Create a throttle with the given minimum gap.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a report may go out at `now`. Records the emission if so.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
