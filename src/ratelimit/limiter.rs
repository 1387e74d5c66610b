//! Core rate limiter implementation.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;
use crate::error::Result;

use super::key::{HeaderSource, KeyExtractor};
use super::window::SlidingWindow;

/// One sweep per this many checks, on average.
const SWEEP_INTERVAL: u32 = 100;

/// Structured rejection returned when a key is over quota.
///
/// Serializes with the field names callers put on the wire in a 429 body
/// (`message`, `retryAfter`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaExceeded {
    /// Human-readable explanation for the caller
    pub message: String,
    /// Whole seconds until the next admission becomes possible
    #[serde(rename = "retryAfter")]
    pub retry_after_secs: u64,
}

/// The outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The call is admitted.
    Allowed,
    /// The key is over quota; the call was not recorded.
    Limited(QuotaExceeded),
}

impl Decision {
    /// Whether the call was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    /// The rejection details, if the call was limited.
    pub fn error(&self) -> Option<&QuotaExceeded> {
        match self {
            Decision::Allowed => None,
            Decision::Limited(err) => Some(err),
        }
    }
}

/// A sliding-window rate limiter with an instance-owned keyspace.
///
/// Each limiter tracks admitted-request timestamps per key and admits a call
/// only while fewer than `max` admissions sit inside the trailing window.
/// Distinct instances never share state, even for identical key strings.
///
/// This struct is thread-safe and can be shared across tasks behind an
/// `Arc`. The prune-compare-append sequence for a key runs under that key's
/// map entry guard, so the count check and the append are atomic with
/// respect to other calls for the same key.
pub struct RateLimiter {
    window_ms: i64,
    max: u64,
    message: String,
    key_extractor: KeyExtractor,
    clock: Arc<dyn Clock>,
    /// Per-key windows, created lazily on first access
    windows: DashMap<String, SlidingWindow>,
    /// RNG driving the probabilistic idle-key sweep
    sweep_rng: Mutex<SmallRng>,
}

impl RateLimiter {
    /// Create a rate limiter with the default client-address key derivation.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        Self::with_key_extractor(config, KeyExtractor::default())
    }

    /// Create a rate limiter with a custom key derivation strategy.
    pub fn with_key_extractor(config: LimiterConfig, key_extractor: KeyExtractor) -> Result<Self> {
        Self::with_clock(config, key_extractor, Arc::new(SystemClock))
    }

    /// Create a rate limiter reading time from the given clock.
    pub fn with_clock(
        config: LimiterConfig,
        key_extractor: KeyExtractor,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window_ms: config.window_ms,
            max: config.max,
            message: config.message,
            key_extractor,
            clock,
            windows: DashMap::new(),
            sweep_rng: Mutex::new(SmallRng::from_entropy()),
        })
    }

    /// Width of the trailing window in milliseconds.
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Maximum admitted calls per key inside the window.
    pub fn max(&self) -> u64 {
        self.max
    }

    /// Check the rate limit for an inbound request.
    ///
    /// Derives the bucket key from the request headers and decides
    /// admit/deny for it. Never fails: the only non-success outcome is a
    /// structured [`Decision::Limited`].
    pub fn check<S: HeaderSource>(&self, source: &S) -> Decision {
        let key = self.key_extractor.extract(source);
        self.check_key(&key)
    }

    /// Check the rate limit for an already-derived key.
    pub fn check_key(&self, key: &str) -> Decision {
        let now = self.clock.now_millis();
        let window_start = now - self.window_ms;

        trace!(key = %key, "Checking rate limit");

        let decision = {
            let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| {
                debug!(
                    key = %key,
                    window_ms = self.window_ms,
                    max = self.max,
                    "Tracking new rate limit key"
                );
                SlidingWindow::new()
            });
            let window = entry.value_mut();

            window.prune(window_start);

            if window.len() as u64 >= self.max {
                let retry_after_secs = window.retry_after_secs(self.window_ms, now);
                debug!(
                    key = %key,
                    retry_after_secs = retry_after_secs,
                    "Rate limit exceeded"
                );
                Decision::Limited(QuotaExceeded {
                    message: self.message.clone(),
                    retry_after_secs,
                })
            } else {
                window.record(now);
                Decision::Allowed
            }
        };

        // Entry guard is released above; sweeping here cannot deadlock on
        // the shard the current key lives in.
        self.maybe_sweep(now);

        decision
    }

    /// Drop all entries with no timestamp inside the current window.
    ///
    /// Purely a memory bound: pruning on access already keeps decisions
    /// correct, so collecting an idle entry can never change an outcome.
    pub fn sweep(&self) {
        self.sweep_at(self.clock.now_millis());
    }

    fn sweep_at(&self, now: i64) {
        let window_start = now - self.window_ms;
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_idle(window_start));
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(
                removed = removed,
                remaining = self.windows.len(),
                "Swept idle rate limit keys"
            );
        }
    }

    /// Sweep on roughly one call in `SWEEP_INTERVAL`.
    fn maybe_sweep(&self, now: i64) {
        let roll = self.sweep_rng.lock().gen_range(0..SWEEP_INTERVAL);
        if roll == 0 {
            self.sweep_at(now);
        }
    }

    /// Get the in-window count for a key.
    ///
    /// Returns `None` if the key has never been seen (or was swept). Prunes
    /// the key's window as a side effect, like any other access.
    pub fn current_count(&self, key: &str) -> Option<u64> {
        let window_start = self.clock.now_millis() - self.window_ms;
        self.windows.get_mut(key).map(|mut entry| {
            let window = entry.value_mut();
            window.prune(window_start);
            window.len() as u64
        })
    }

    /// Get the number of tracked keys.
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }

    /// Drop all tracked keys.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.windows.clear();
    }
}
