//! Token-bucket limiter for security alarms.
//!
//! Invalid webhook signatures are logged at warn level, but a caller
//! replaying forged notifications must not be able to flood the logs.
//! Each source gets its own bucket; suppressed events are still counted.
//! Buckets that have refilled completely carry no state and are evicted
//! once the table grows past `PRUNE_THRESHOLD`.

use std::time::Instant;

use dashmap::DashMap;

/// Table size at which refilled buckets are evicted before adding a source.
const PRUNE_THRESHOLD: usize = 1024;

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whether the bucket would be back at capacity by `now`.
    fn is_full_at(&self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * refill_rate >= capacity
    }
}

/// Per-source limiter deciding whether a security event is logged.
pub struct SignatureAlarm {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    refill_per_sec: f64,
}

impl SignatureAlarm {
    /// Allow `per_minute` logged events per source, with the same burst.
    pub fn new(per_minute: u32) -> Self {
        let capacity = per_minute.max(1) as f64;
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_per_sec: capacity / 60.0,
        }
    }

    /// Whether an event from `source` should be logged now.
    pub fn should_log(&self, source: &str) -> bool {
        if self.buckets.len() >= PRUNE_THRESHOLD && !self.buckets.contains_key(source) {
            self.prune_at(Instant::now());
        }

        let mut bucket = self
            .buckets
            .entry(source.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity));
        bucket.try_acquire(self.capacity, self.refill_per_sec)
    }

    /// Number of sources currently tracked.
    pub fn tracked_sources(&self) -> usize {
        self.buckets.len()
    }

    fn prune_at(&self, now: Instant) {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| !bucket.is_full_at(now, self.capacity, self.refill_per_sec));
        tracing::debug!(before, after = self.tracked_sources(), "Evicted refilled signature alarm buckets");
    }
}
