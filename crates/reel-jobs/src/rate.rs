//! Rolling-window start limiter for the scheduler.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Admits at most `limit` starts within any rolling `window`.
#[derive(Debug)]
pub(crate) struct RateWindow {
    limit: usize,
    window: Duration,
    starts: VecDeque<Instant>,
}

impl RateWindow {
    pub(crate) fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            starts: VecDeque::with_capacity(limit.max(1)),
        }
    }

    /// Record a start at `now`, or return how long until one is admitted.
    pub(crate) fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        while let Some(&oldest) = self.starts.front() {
            if now.duration_since(oldest) >= self.window {
                self.starts.pop_front();
            } else {
                break;
            }
        }

        if self.starts.len() < self.limit {
            self.starts.push_back(now);
            return Ok(());
        }

        // Full: the oldest start is still inside the window.
        let oldest = self.starts.front().copied().unwrap_or(now);
        Err((oldest + self.window).saturating_duration_since(now))
    }
}
