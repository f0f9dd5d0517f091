//! Usage anomaly detection.
//!
//! Anomalies are advisory. They are recomputed from the call history on
//! demand, never persisted and never deduplicated: a condition keeps firing
//! on every check until it clears.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::AnomalyConfig;
use crate::usage::{CallRecord, UsageStatistics};

/// Which rule produced an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HighFrequency,
    UnusualFailureRate,
    HighLatency,
    ExcessiveCost,
}

impl AnomalyKind {
    /// Fixed severity on a 1-10 scale.
    pub fn severity(&self) -> u8 {
        match self {
            AnomalyKind::HighFrequency => 7,
            AnomalyKind::UnusualFailureRate => 8,
            AnomalyKind::HighLatency => 5,
            AnomalyKind::ExcessiveCost => 6,
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnomalyKind::HighFrequency => "high frequency",
            AnomalyKind::UnusualFailureRate => "unusual failure rate",
            AnomalyKind::HighLatency => "high latency",
            AnomalyKind::ExcessiveCost => "excessive cost",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageAnomaly {
    pub kind: AnomalyKind,
    pub description: String,
    pub severity: u8,
    pub detected_at: DateTime<Utc>,
}

impl UsageAnomaly {
    fn new(kind: AnomalyKind, description: String, detected_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            description,
            severity: kind.severity(),
            detected_at,
        }
    }
}

/// Evaluates the threshold rules against the call history.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Derive the trailing-minute count and trailing-day statistics from
    /// `records` and run every rule.
    pub fn scan<'a, I>(&self, records: I, now: DateTime<Utc>) -> Vec<UsageAnomaly>
    where
        I: IntoIterator<Item = &'a CallRecord> + Copy,
    {
        let minute_start = now - Duration::seconds(60);
        let last_minute = records
            .into_iter()
            .filter(|r| r.timestamp > minute_start && r.timestamp <= now)
            .count();
        let last_day = UsageStatistics::compute(records, now - Duration::days(1), now);

        self.evaluate(last_minute, &last_day, now)
    }

    /// Run the rules independently; any subset may fire.
    pub fn evaluate(
        &self,
        calls_last_minute: usize,
        last_day: &UsageStatistics,
        now: DateTime<Utc>,
    ) -> Vec<UsageAnomaly> {
        let mut anomalies = Vec::new();

        if calls_last_minute > self.config.frequency_threshold {
            anomalies.push(UsageAnomaly::new(
                AnomalyKind::HighFrequency,
                format!(
                    "{} calls in the last minute (threshold {})",
                    calls_last_minute, self.config.frequency_threshold
                ),
                now,
            ));
        }

        if last_day.total_calls > self.config.min_calls_for_failure_rate
            && last_day.failure_rate > self.config.failure_rate_threshold
        {
            anomalies.push(UsageAnomaly::new(
                AnomalyKind::UnusualFailureRate,
                format!(
                    "{:.0}% of {} calls failed in the last 24h",
                    last_day.failure_rate * 100.0,
                    last_day.total_calls
                ),
                now,
            ));
        }

        if let Some(latency) = last_day.average_latency_secs {
            if latency > self.config.latency_threshold_secs {
                anomalies.push(UsageAnomaly::new(
                    AnomalyKind::HighLatency,
                    format!(
                        "mean latency {:.1}s over the last 24h (threshold {:.1}s)",
                        latency, self.config.latency_threshold_secs
                    ),
                    now,
                ));
            }
        }

        if let Some(budget) = self.config.daily_cost_budget {
            if last_day.total_cost > budget {
                anomalies.push(UsageAnomaly::new(
                    AnomalyKind::ExcessiveCost,
                    format!(
                        "{:.2} cost units spent in the last 24h (budget {:.2})",
                        last_day.total_cost, budget
                    ),
                    now,
                ));
            }
        }

        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::CallCategory;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 20, 18, 0, 0).unwrap()
    }

    fn call(seconds_ago: i64, success: bool, latency_secs: f64) -> CallRecord {
        CallRecord::new(
            now() - Duration::seconds(seconds_ago),
            CallCategory::AssistantQuery,
            success,
            Some(std::time::Duration::from_secs_f64(latency_secs)),
            None,
            None,
        )
    }

    fn kinds(anomalies: &[UsageAnomaly]) -> Vec<AnomalyKind> {
        anomalies.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn test_quiet_history_has_no_anomalies() {
        let records: Vec<_> = (0..5).map(|i| call(i * 600, true, 1.0)).collect();
        assert!(AnomalyDetector::default().scan(&records, now()).is_empty());
    }

    #[test]
    fn test_frequency_only() {
        let records: Vec<_> = (0..16).map(|i| call(i, true, 0.5)).collect();
        let anomalies = AnomalyDetector::default().scan(&records, now());

        assert_eq!(kinds(&anomalies), vec![AnomalyKind::HighFrequency]);
        assert_eq!(anomalies[0].severity, 7);
    }

    #[test]
    fn test_failure_rate_fires_once_with_severity_eight() {
        // 20 calls spread across the day, 8 of them failed.
        let records: Vec<_> = (0..20).map(|i| call(i * 3600, i >= 8, 2.0)).collect();
        let anomalies = AnomalyDetector::default().scan(&records, now());

        let failure: Vec<_> = anomalies
            .iter()
            .filter(|a| a.kind == AnomalyKind::UnusualFailureRate)
            .collect();
        assert_eq!(failure.len(), 1);
        assert_eq!(failure[0].severity, 8);
        assert_eq!(anomalies.len(), 1);
    }

    #[test]
    fn test_failure_rate_needs_enough_calls() {
        let records: Vec<_> = (0..10).map(|i| call(i * 60, false, 1.0)).collect();
        let anomalies = AnomalyDetector::default().scan(&records, now());
        assert!(!kinds(&anomalies).contains(&AnomalyKind::UnusualFailureRate));
    }

    #[test]
    fn test_all_three_rules_fire_together() {
        let records: Vec<_> = (0..16).map(|i| call(i, i % 2 == 0, 12.0)).collect();
        let anomalies = AnomalyDetector::default().scan(&records, now());

        assert_eq!(
            kinds(&anomalies),
            vec![
                AnomalyKind::HighFrequency,
                AnomalyKind::UnusualFailureRate,
                AnomalyKind::HighLatency,
            ]
        );
    }

    #[test]
    fn test_cost_rule_only_with_budget() {
        let records: Vec<_> = (0..3)
            .map(|i| {
                CallRecord::new(
                    now() - Duration::minutes(i * 10),
                    CallCategory::ImageGeneration,
                    true,
                    None,
                    None,
                    Some(4.0),
                )
            })
            .collect();

        assert!(AnomalyDetector::default().scan(&records, now()).is_empty());

        let detector = AnomalyDetector::new(AnomalyConfig {
            daily_cost_budget: Some(10.0),
            ..AnomalyConfig::default()
        });
        let anomalies = detector.scan(&records, now());
        assert_eq!(kinds(&anomalies), vec![AnomalyKind::ExcessiveCost]);
        assert_eq!(anomalies[0].severity, 6);
    }

    #[test]
    fn test_old_records_are_ignored() {
        let records: Vec<_> = (0..20).map(|i| call(2 * 86400 + i, false, 30.0)).collect();
        assert!(AnomalyDetector::default().scan(&records, now()).is_empty());
    }
}
