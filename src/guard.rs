//! The usage guard: rate limiting and usage recording for outbound calls.

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::anomaly::UsageAnomaly;
use crate::clock::{SharedClock, SystemClock};
use crate::config::GuardConfig;
use crate::error::RateLimitError;
use crate::ratelimit::RateLimiter;
use crate::usage::{CallCategory, FileStore, KeyValueStore, UsageRecorder};

/// Service object handed to whatever component issues external calls.
///
/// Constructed once by the application's composition root and shared via
/// `Arc`; there is no global instance.
pub struct UsageGuard {
    limiter: RateLimiter,
    recorder: UsageRecorder,
}

impl UsageGuard {
    /// Build a guard over the given store and clock, restoring persisted usage.
    pub async fn new(config: GuardConfig, store: Arc<dyn KeyValueStore>, clock: SharedClock) -> Self {
        let limiter = RateLimiter::with_clock(config.rate_limit, clock.clone());
        let recorder = UsageRecorder::open(config.usage, config.anomaly, store, clock).await;

        info!(
            per_minute = limiter.config().per_minute,
            per_hour = limiter.config().per_hour,
            per_day = limiter.config().per_day,
            records = recorder.len(),
            "Usage guard initialized"
        );

        Self { limiter, recorder }
    }

    /// Build a guard persisting under `config.storage.data_dir` with the system clock.
    pub async fn from_config(config: GuardConfig) -> Self {
        let store = Arc::new(FileStore::new(config.storage.data_dir.clone()));
        Self::new(config, store, Arc::new(SystemClock)).await
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn recorder(&self) -> &UsageRecorder {
        &self.recorder
    }

    /// Rate-limit and track one outbound call.
    ///
    /// Refused calls never run and are not recorded. Admitted calls are
    /// timed and recorded whatever their outcome, but only successful ones
    /// consume rate-limit quota.
    pub async fn execute<F, Fut, T, E>(&self, category: CallCategory, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RateLimitError> + std::fmt::Display,
    {
        self.limiter
            .execute(|| self.recorder.track(category, work()))
            .await
    }

    pub fn check_for_anomalies(&self) -> Vec<UsageAnomaly> {
        self.recorder.check_for_anomalies()
    }

    pub fn get_formatted_report(&self) -> String {
        let stats = self.limiter.get_usage_stats();
        let mut report = self.recorder.get_formatted_report();
        report.push_str(&format!(
            "\nRate limit usage: {}/{} per minute, {}/{} per hour, {}/{} per day\n",
            stats.minute,
            self.limiter.config().per_minute,
            stats.hour,
            self.limiter.config().per_hour,
            stats.day,
            self.limiter.config().per_day,
        ));
        report
    }
}
