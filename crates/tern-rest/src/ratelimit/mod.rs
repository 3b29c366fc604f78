//! Two-tier rate limiter
//!
//! One lazily-created bucket per route signature plus a single global bucket
//! shared by every route. A permit is granted only when both have capacity;
//! both are decremented atomically under their locks. Server responses
//! overwrite bucket state unconditionally, correcting drift from the
//! optimistic local decrements.

mod bucket;

pub use bucket::Bucket;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Default per-route limit assumed until the server describes the bucket
const DEFAULT_ROUTE_LIMIT: u64 = 5;

/// Outcome of an acquire attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// Both buckets had capacity; one permit was consumed from each
    Permit,
    /// Wait this long, then retry
    Wait(Duration),
}

/// Tracks per-route buckets and the global bucket
pub struct RateLimiter {
    buckets: DashMap<String, Mutex<Bucket>>,
    global: Mutex<Bucket>,
    idle_period: Duration,
    last_eviction: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a limiter with the given global per-window budget and idle
    /// bucket eviction period
    #[must_use]
    pub fn new(global_limit: u64, idle_period: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            global: Mutex::new(Bucket::new(global_limit)),
            idle_period,
            last_eviction: Mutex::new(Instant::now()),
        }
    }

    /// Try to take a permit for the route
    ///
    /// Returns [`Acquire::Wait`] with the time until the earliest exhausted
    /// bucket resets; the caller sleeps and retries. `remaining` is never
    /// driven negative: the permit is only consumed when both tiers have
    /// capacity.
    pub fn acquire(&self, key: &str) -> Acquire {
        let now = Instant::now();
        self.maybe_evict(now);

        let entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(Bucket::new(DEFAULT_ROUTE_LIMIT)));
        let mut route = entry.lock();
        route.refresh(now);
        route.touch(now);

        // Lock order is always route then global
        let mut global = self.global.lock();
        global.refresh(now);

        let mut wait: Option<Duration> = None;
        if !route.has_remaining() {
            wait = Some(route.time_to_reset(now));
        }
        if !global.has_remaining() {
            let global_wait = global.time_to_reset(now);
            wait = Some(wait.map_or(global_wait, |w| w.min(global_wait)));
        }

        match wait {
            Some(wait) => Acquire::Wait(wait),
            None => {
                route.take();
                global.take();
                Acquire::Permit
            }
        }
    }

    /// Overwrite a route bucket from server-reported response metadata
    pub fn update(&self, key: &str, remaining: u64, limit: u64, reset_after: Duration) {
        let now = Instant::now();
        let entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(Bucket::new(limit.max(1))));
        let mut route = entry.lock();
        route.update(remaining, limit, reset_after, now);
        route.touch(now);

        tracing::trace!(
            route = %key,
            remaining,
            limit,
            reset_after_ms = reset_after.as_millis() as u64,
            "Bucket updated from response"
        );
    }

    /// Absorb an explicit back-off signal
    ///
    /// Exhausts the route bucket until `retry_after` elapses; the global
    /// bucket is touched only when the signal is marked global.
    pub fn note_backoff(&self, key: &str, retry_after: Duration, global: bool) {
        let now = Instant::now();
        {
            let entry = self
                .buckets
                .entry(key.to_string())
                .or_insert_with(|| Mutex::new(Bucket::new(DEFAULT_ROUTE_LIMIT)));
            let mut route = entry.lock();
            route.exhaust(retry_after, now);
            route.touch(now);
        }
        if global {
            self.global.lock().exhaust(retry_after, now);
            tracing::warn!(
                route = %key,
                retry_after_ms = retry_after.as_millis() as u64,
                "Global back-off signal received"
            );
        }
    }

    /// Drop buckets unused for longer than the idle period
    pub fn evict_idle(&self) {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.lock().idle_for(now) < self.idle_period);
        // concurrent inserts during retain can push len past `before`
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted idle rate-limit buckets");
        }
    }

    /// Number of live route buckets
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    // Opportunistic eviction, at most once per idle period. Must run before
    // any bucket entry is held: retain and entry can contend on a shard.
    fn maybe_evict(&self, now: Instant) {
        let due = {
            let mut last = self.last_eviction.lock();
            if now.saturating_duration_since(*last) < self.idle_period {
                false
            } else {
                *last = now;
                true
            }
        };
        if due {
            self.evict_idle();
        }
    }
}
