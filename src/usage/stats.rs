//! Aggregate statistics over a slice of the call history.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::record::{CallCategory, CallRecord};

/// Per-category counts within a statistics window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_cost: f64,
}

/// Aggregates over the records whose timestamp falls in `[from, to]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStatistics {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_calls: usize,
    pub successful_calls: usize,
    pub failed_calls: usize,
    /// 0.0 when there were no calls
    pub success_rate: f64,
    pub failure_rate: f64,
    /// Mean over the records that carried a latency
    pub average_latency_secs: Option<f64>,
    pub total_cost: f64,
    pub by_category: BTreeMap<CallCategory, CategoryStats>,
}

impl UsageStatistics {
    pub fn compute<'a, I>(records: I, from: DateTime<Utc>, to: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a CallRecord>,
    {
        let mut stats = UsageStatistics {
            from,
            to,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            success_rate: 0.0,
            failure_rate: 0.0,
            average_latency_secs: None,
            total_cost: 0.0,
            by_category: BTreeMap::new(),
        };
        let mut latency_sum = 0.0;
        let mut latency_samples = 0usize;

        for record in records
            .into_iter()
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
        {
            let cost = record.cost_units.unwrap_or(0.0);
            let category = stats.by_category.entry(record.category).or_default();

            stats.total_calls += 1;
            category.total += 1;
            if record.success {
                stats.successful_calls += 1;
                category.successful += 1;
            } else {
                stats.failed_calls += 1;
                category.failed += 1;
            }
            stats.total_cost += cost;
            category.total_cost += cost;

            if let Some(latency) = record.latency_secs_checked() {
                latency_sum += latency;
                latency_samples += 1;
            }
        }

        if stats.total_calls > 0 {
            stats.success_rate = stats.successful_calls as f64 / stats.total_calls as f64;
            stats.failure_rate = stats.failed_calls as f64 / stats.total_calls as f64;
        }
        if latency_samples > 0 {
            stats.average_latency_secs = Some(latency_sum / latency_samples as f64);
        }
        stats
    }

    pub fn average_latency(&self) -> Option<Duration> {
        self.average_latency_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}
