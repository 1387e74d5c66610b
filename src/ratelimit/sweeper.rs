//! Timer-driven background collection of idle keys.
//!
//! An alternative to the probabilistic on-request sweep for deployments
//! that prefer a predictable cadence. Both mechanisms only free memory;
//! admit/deny correctness rests entirely on per-call pruning.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Handle to a background sweep task.
///
/// Dropping the handle leaves the task running for the lifetime of the
/// runtime; call [`Sweeper::shutdown`] for a clean stop.
pub struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a task that sweeps the limiter on a fixed interval.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        let (shutdown, mut signal) = watch::channel(false);

        info!(interval_ms = interval.as_millis() as u64, "Starting sweeper");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        limiter.sweep();
                    }
                    changed = signal.changed() => {
                        if changed.is_err() || *signal.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Sweeper stopped");
        });

        Self { shutdown, handle }
    }

    /// Signal the task to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::LimiterConfig;
    use crate::ratelimit::KeyExtractor;

    fn limiter_at(clock: Arc<ManualClock>) -> Arc<RateLimiter> {
        Arc::new(
            RateLimiter::with_clock(
                LimiterConfig::new(60_000, 10),
                KeyExtractor::default(),
                clock,
            )
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_collects_idle_keys() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter_at(Arc::clone(&clock));

        limiter.check_key("idle");
        assert_eq!(limiter.key_count(), 1);

        // Push the key's whole window into the past.
        clock.set(61_000);

        let sweeper = Sweeper::spawn(Arc::clone(&limiter), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(limiter.key_count(), 0);
        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_leaves_live_keys() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter_at(Arc::clone(&clock));

        limiter.check_key("active");
        clock.set(30_000);

        let sweeper = Sweeper::spawn(Arc::clone(&limiter), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(limiter.key_count(), 1);
        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_completes() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter_at(clock);

        let sweeper = Sweeper::spawn(limiter, Duration::from_secs(3600));
        // Shutdown must not wait for the next tick.
        sweeper.shutdown().await;
    }
}
