//! Rate-limit bucket state

use std::time::{Duration, Instant};

/// Default window applied when replenishing a bucket the server has not yet
/// described
pub(crate) const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Token-counter state for one rate-limit window
///
/// Local decrements are optimistic; [`Bucket::update`] overwrites them with
/// server-reported values, which are authoritative.
#[derive(Debug, Clone)]
pub struct Bucket {
    remaining: u64,
    limit: u64,
    reset_at: Instant,
    window: Duration,
    last_used: Instant,
}

impl Bucket {
    /// Create a full bucket with the given limit and the default window
    #[must_use]
    pub fn new(limit: u64) -> Self {
        let now = Instant::now();
        Self {
            remaining: limit,
            limit,
            reset_at: now + DEFAULT_WINDOW,
            window: DEFAULT_WINDOW,
            last_used: now,
        }
    }

    /// Replenish if the current window has elapsed
    pub fn refresh(&mut self, now: Instant) {
        if now >= self.reset_at {
            self.remaining = self.limit;
            self.reset_at = now + self.window;
        }
    }

    /// Whether a permit is available right now (call [`Bucket::refresh`] first)
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        self.remaining > 0
    }

    /// Consume one permit; callers must have checked [`Bucket::has_remaining`]
    pub fn take(&mut self) {
        debug_assert!(self.remaining > 0);
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Time until the current window resets
    #[must_use]
    pub fn time_to_reset(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }

    /// Overwrite with server-reported state
    ///
    /// The reported reset also becomes the replenish window for later
    /// refreshes, so a server-described bucket keeps its observed cadence.
    pub fn update(&mut self, remaining: u64, limit: u64, reset_after: Duration, now: Instant) {
        self.remaining = remaining;
        self.limit = limit;
        self.reset_at = now + reset_after;
        if reset_after > Duration::ZERO {
            self.window = reset_after;
        }
    }

    /// Force exhaustion until `retry_after` elapses (explicit back-off signal)
    pub fn exhaust(&mut self, retry_after: Duration, now: Instant) {
        self.remaining = 0;
        self.reset_at = now + retry_after;
    }

    /// Record use for idle-eviction accounting
    pub fn touch(&mut self, now: Instant) {
        self.last_used = now;
    }

    /// How long since the bucket was last used
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> u64 {
        self.remaining
    }
}
