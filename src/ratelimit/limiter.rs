//! Sliding-window rate limiter for cost-incurring outbound calls.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::ledger::{TimestampLedger, WindowCounts};
use super::window::TimeWindow;
use crate::clock::{SharedClock, SystemClock};
use crate::config::RateLimitConfig;
use crate::error::RateLimitError;

/// Gates outbound calls so the per-minute, per-hour and per-day caps hold.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    /// Immutable caps set at construction
    config: RateLimitConfig,
    /// Timestamps of admitted calls
    ledger: TimestampLedger,
    clock: SharedClock,
}

/// Snapshot of how many admitted calls fall in each window.
pub type UsageStats = WindowCounts;

impl RateLimiter {
    /// Create a rate limiter using the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            config,
            ledger: TimestampLedger::new(),
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Fail if any window is at or above its cap. No side effect on success.
    pub fn check_rate_limit(&self) -> Result<(), RateLimitError> {
        let now = self.clock.now();
        match self.ledger.check(now, |w| self.cap(w)) {
            Ok(counts) => {
                trace!(
                    minute = counts.minute,
                    hour = counts.hour,
                    day = counts.day,
                    "Rate limit check passed"
                );
                Ok(())
            }
            Err((window, retry_after)) => {
                warn!(
                    window = %window,
                    cap = self.cap(window),
                    retry_after_secs = retry_after.as_secs_f64(),
                    "Rate limit exceeded"
                );
                Err(RateLimitError::for_window(window, retry_after))
            }
        }
    }

    /// Record one admitted call at the current time.
    ///
    /// Call once per call that passed [`check_rate_limit`](Self::check_rate_limit).
    /// The pair is not atomic; concurrent callers may interleave between them.
    pub fn record_request(&self) {
        let now = self.clock.now();
        self.ledger.push(now);
        debug!(at = %now, "Recorded rate-limited request");
    }

    /// Check and record under one exclusive section.
    pub fn try_acquire(&self) -> Result<UsageStats, RateLimitError> {
        let now = self.clock.now();
        self.ledger
            .try_push(now, |w| self.cap(w))
            .map_err(|(window, retry_after)| {
                warn!(
                    window = %window,
                    retry_after_secs = retry_after.as_secs_f64(),
                    "Rate limit exceeded on acquire"
                );
                RateLimitError::for_window(window, retry_after)
            })
    }

    /// Check, run `work`, and record the request only if `work` succeeds.
    ///
    /// A failed call consumes no quota.
    pub async fn execute<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RateLimitError>,
    {
        self.check_rate_limit()?;
        let value = work().await?;
        self.record_request();
        Ok(value)
    }

    /// Current minute/hour/day counts.
    pub fn get_usage_stats(&self) -> UsageStats {
        self.ledger.counts(self.clock.now())
    }

    /// Clear the ledger entirely.
    pub fn reset(&self) {
        self.ledger.clear();
        debug!("Rate limiter ledger cleared");
    }

    fn cap(&self, window: TimeWindow) -> usize {
        let cap = match window {
            TimeWindow::Minute => self.config.per_minute,
            TimeWindow::Hour => self.config.per_hour,
            TimeWindow::Day => self.config.per_day,
        };
        cap as usize
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
