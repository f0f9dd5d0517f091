//! Bounded history of external-call outcomes with best-effort persistence.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::record::{decode_records, encode_records, CallCategory, CallRecord};
use super::stats::UsageStatistics;
use super::store::KeyValueStore;
use crate::anomaly::{AnomalyDetector, UsageAnomaly};
use crate::clock::SharedClock;
use crate::config::{AnomalyConfig, UsageConfig, MAX_RETENTION_DAYS};

/// Records call outcomes into a capped FIFO buffer.
///
/// The buffer is persisted to the store every `persist_every` insertions
/// from a spawned task. Persistence failures are logged and otherwise
/// ignored; the recorder keeps working from memory.
pub struct UsageRecorder {
    config: UsageConfig,
    records: RwLock<VecDeque<CallRecord>>,
    insertions: AtomicUsize,
    /// Bumped on every insertion, never reset
    sequence: AtomicU64,
    gate: Arc<PersistGate>,
    store: Arc<dyn KeyValueStore>,
    detector: AnomalyDetector,
    clock: SharedClock,
}

impl UsageRecorder {
    /// Create an empty recorder without touching the store.
    pub fn new(
        config: UsageConfig,
        anomaly: AnomalyConfig,
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            records: RwLock::new(VecDeque::new()),
            insertions: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
            gate: Arc::new(PersistGate::default()),
            store,
            detector: AnomalyDetector::new(anomaly),
            clock,
        }
    }

    /// Create a recorder and restore the last persisted buffer.
    pub async fn open(
        config: UsageConfig,
        anomaly: AnomalyConfig,
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
    ) -> Self {
        let recorder = Self::new(config, anomaly, store, clock);
        recorder.restore().await;
        recorder
    }

    /// Load persisted records, dropping any past the retention period.
    async fn restore(&self) {
        let key = &self.config.store_key;
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %key, "No persisted usage records");
                return;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read persisted usage records");
                return;
            }
        };

        let loaded = match decode_records(&bytes) {
            Ok(records) => records,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to decode persisted usage records");
                return;
            }
        };

        let retention = self.config.retention_days.clamp(1, MAX_RETENTION_DAYS);
        let cutoff = self.clock.now() - ChronoDuration::days(retention);
        let total = loaded.len();
        let mut kept: Vec<CallRecord> = loaded.into_iter().filter(|r| r.timestamp >= cutoff).collect();
        kept.sort_by_key(|r| r.timestamp);
        let excess = kept.len().saturating_sub(self.config.max_records_in_memory);

        let mut records = self.records.write();
        records.clear();
        records.extend(kept.into_iter().skip(excess));
        info!(
            loaded = total,
            kept = records.len(),
            "Restored usage records"
        );
    }

    /// Append a record, evict beyond the cap, and re-run the anomaly rules.
    ///
    /// Returns whatever anomalies are active after this call.
    pub fn record_call(
        &self,
        category: CallCategory,
        success: bool,
        latency: Option<Duration>,
        error: Option<String>,
        cost_units: Option<f64>,
    ) -> Vec<UsageAnomaly> {
        let record = CallRecord::new(self.clock.now(), category, success, latency, error, cost_units);
        debug!(
            category = %record.category,
            success = record.success,
            latency_secs = ?record.latency_secs,
            "Recording call"
        );

        let snapshot = {
            let mut records = self.records.write();
            records.push_back(record);
            let excess = records.len().saturating_sub(self.config.max_records_in_memory);
            records.drain(..excess);

            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let inserted = self.insertions.fetch_add(1, Ordering::SeqCst) + 1;
            (inserted % self.config.persist_every == 0).then(|| Snapshot {
                records: records.iter().cloned().collect(),
                epoch: self.gate.epoch.load(Ordering::SeqCst),
                sequence,
            })
        };

        if let Some(snapshot) = snapshot {
            self.spawn_persist(snapshot);
        }

        self.check_for_anomalies()
    }

    /// Run `work`, time it, record the outcome, and hand back its result.
    ///
    /// Errors from `work` are recorded with their message and re-raised.
    pub async fn track<F, T, E>(&self, category: CallCategory, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        let result = work.await;
        let latency = started.elapsed();

        match &result {
            Ok(_) => {
                self.record_call(category, true, Some(latency), None, None);
            }
            Err(e) => {
                self.record_call(category, false, Some(latency), Some(e.to_string()), None);
            }
        }
        result
    }

    /// Evaluate the anomaly rules against the current buffer and log hits.
    pub fn check_for_anomalies(&self) -> Vec<UsageAnomaly> {
        let anomalies = {
            let records = self.records.read();
            self.detector.scan(&*records, self.clock.now())
        };

        for anomaly in &anomalies {
            warn!(
                kind = %anomaly.kind,
                severity = anomaly.severity,
                "Usage anomaly: {}",
                anomaly.description
            );
        }
        anomalies
    }

    /// Statistics between `from` and `to`; defaults to the trailing 24 hours.
    pub fn get_statistics(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> UsageStatistics {
        let to = to.unwrap_or_else(|| self.clock.now());
        let from = from.unwrap_or(to - ChronoDuration::days(1));
        let records = self.records.read();
        UsageStatistics::compute(&*records, from, to)
    }

    pub fn hourly_statistics(&self) -> UsageStatistics {
        self.trailing_statistics(ChronoDuration::hours(1))
    }

    pub fn daily_statistics(&self) -> UsageStatistics {
        self.trailing_statistics(ChronoDuration::days(1))
    }

    pub fn weekly_statistics(&self) -> UsageStatistics {
        self.trailing_statistics(ChronoDuration::weeks(1))
    }

    fn trailing_statistics(&self, span: ChronoDuration) -> UsageStatistics {
        let now = self.clock.now();
        self.get_statistics(Some(now - span), Some(now))
    }

    /// Serialize the buffer as pretty JSON with sorted keys.
    pub fn export_as_json(&self) -> serde_json::Result<String> {
        let snapshot = self.snapshot();
        encode_records(&snapshot)
    }

    /// Copy of the buffer, oldest first.
    pub fn snapshot(&self) -> Vec<CallRecord> {
        self.records.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Empty the buffer and delete the persisted copy.
    ///
    /// Snapshots taken before the clear are never written afterwards.
    pub async fn clear_all_records(&self) {
        {
            let mut records = self.records.write();
            records.clear();
            self.insertions.store(0, Ordering::SeqCst);
            self.gate.epoch.fetch_add(1, Ordering::SeqCst);
        }

        let _writing = self.gate.last_written.lock().await;
        if let Err(e) = self.store.remove(&self.config.store_key).await {
            warn!(key = %self.config.store_key, error = %e, "Failed to delete persisted usage records");
        }
        info!("Cleared usage records");
    }

    /// Persist the current buffer now and wait for it.
    pub async fn flush(&self) {
        let snapshot = {
            let records = self.records.read();
            Snapshot {
                records: records.iter().cloned().collect(),
                epoch: self.gate.epoch.load(Ordering::SeqCst),
                sequence: self.sequence.load(Ordering::SeqCst),
            }
        };
        write_snapshot(self.store.as_ref(), &self.config.store_key, &self.gate, snapshot).await;
    }

    /// Multi-line summary for a diagnostics screen.
    pub fn get_formatted_report(&self) -> String {
        let day = self.daily_statistics();
        let week = self.weekly_statistics();
        let anomalies = self.check_for_anomalies();

        let mut report = String::new();
        let _ = writeln!(report, "Usage report ({})", day.to.format("%Y-%m-%d %H:%M UTC"));
        let _ = writeln!(report, "Records in memory: {}", self.len());
        let _ = writeln!(report);
        write_window(&mut report, "Last 24 hours", &day);
        let _ = writeln!(report);
        write_window(&mut report, "Last 7 days", &week);
        let _ = writeln!(report);

        if anomalies.is_empty() {
            let _ = writeln!(report, "Active anomalies: none");
        } else {
            let _ = writeln!(report, "Active anomalies:");
            for anomaly in &anomalies {
                let _ = writeln!(
                    report,
                    "  [severity {}] {}: {}",
                    anomaly.severity, anomaly.kind, anomaly.description
                );
            }
        }
        report
    }

    fn spawn_persist(&self, snapshot: Snapshot) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                let key = self.config.store_key.clone();
                let gate = self.gate.clone();
                handle.spawn(async move {
                    write_snapshot(store.as_ref(), &key, &gate, snapshot).await;
                });
            }
            Err(_) => {
                debug!("No async runtime available; skipping usage persistence");
            }
        }
    }
}

/// Orders store writes so an older snapshot never lands after a newer one
/// or after a clear.
#[derive(Debug, Default)]
struct PersistGate {
    /// Bumped by every clear
    epoch: AtomicU64,
    /// Sequence of the last snapshot written; held across each store call
    last_written: tokio::sync::Mutex<u64>,
}

/// Buffer copy tagged with where it sits in the insertion order.
struct Snapshot {
    records: Vec<CallRecord>,
    epoch: u64,
    sequence: u64,
}

async fn write_snapshot(store: &dyn KeyValueStore, key: &str, gate: &PersistGate, snapshot: Snapshot) {
    let mut last_written = gate.last_written.lock().await;
    if snapshot.epoch != gate.epoch.load(Ordering::SeqCst) {
        debug!(key = %key, "Dropping usage snapshot taken before a clear");
        return;
    }
    if snapshot.sequence < *last_written {
        debug!(
            key = %key,
            sequence = snapshot.sequence,
            last_written = *last_written,
            "Dropping stale usage snapshot"
        );
        return;
    }

    if persist(store, key, &snapshot.records).await {
        *last_written = snapshot.sequence;
    }
}

async fn persist(store: &dyn KeyValueStore, key: &str, records: &[CallRecord]) -> bool {
    let encoded = match encode_records(records) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to encode usage records");
            return false;
        }
    };

    match store.set(key, encoded.into_bytes()).await {
        Ok(()) => {
            debug!(key = %key, records = records.len(), "Persisted usage records");
            true
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to persist usage records");
            false
        }
    }
}

fn write_window(report: &mut String, title: &str, stats: &UsageStatistics) {
    let _ = writeln!(report, "{}", title);
    let _ = writeln!(report, "  Total calls: {}", stats.total_calls);
    let _ = writeln!(
        report,
        "  Succeeded: {} ({:.1}%)",
        stats.successful_calls,
        stats.success_rate * 100.0
    );
    let _ = writeln!(
        report,
        "  Failed: {} ({:.1}%)",
        stats.failed_calls,
        stats.failure_rate * 100.0
    );
    match stats.average_latency_secs {
        Some(latency) => {
            let _ = writeln!(report, "  Mean latency: {:.2}s", latency);
        }
        None => {
            let _ = writeln!(report, "  Mean latency: n/a");
        }
    }
    let _ = writeln!(report, "  Total cost: {:.2}", stats.total_cost);

    for (category, counts) in &stats.by_category {
        let _ = writeln!(
            report,
            "  - {}: {} calls, {} failed",
            category, counts.total, counts.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::usage::MemoryStore;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 10, 0, 0).unwrap()
    }

    fn recorder_with(config: UsageConfig) -> (UsageRecorder, ManualClock, Arc<MemoryStore>) {
        let clock = ManualClock::new(start());
        let store = Arc::new(MemoryStore::new());
        let recorder = UsageRecorder::new(
            config,
            AnomalyConfig::default(),
            store.clone(),
            Arc::new(clock.clone()),
        );
        (recorder, clock, store)
    }

    fn recorder() -> (UsageRecorder, ManualClock, Arc<MemoryStore>) {
        recorder_with(UsageConfig::default())
    }

    #[test]
    fn test_eviction_keeps_most_recent_in_order() {
        let (recorder, clock, _store) = recorder_with(UsageConfig {
            max_records_in_memory: 5,
            ..UsageConfig::default()
        });

        for i in 0..8 {
            recorder.record_call(CallCategory::Other, true, None, Some(format!("#{}", i)), None);
            clock.advance(ChronoDuration::seconds(1));
        }

        let labels: Vec<_> = recorder
            .snapshot()
            .into_iter()
            .map(|r| r.error.unwrap())
            .collect();
        assert_eq!(labels, vec!["#3", "#4", "#5", "#6", "#7"]);
    }

    #[test]
    fn test_default_statistics_cover_last_day() {
        let (recorder, clock, _store) = recorder();

        recorder.record_call(CallCategory::AssistantQuery, true, None, None, None);
        clock.advance(ChronoDuration::hours(25));
        recorder.record_call(CallCategory::AssistantQuery, false, None, Some("503".into()), None);

        let stats = recorder.get_statistics(None, None);
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.failed_calls, 1);
        assert_eq!(recorder.weekly_statistics().total_calls, 2);
        assert_eq!(recorder.hourly_statistics().total_calls, 1);
    }

    #[test]
    fn test_record_call_returns_anomalies() {
        let (recorder, _clock, _store) = recorder();

        let mut last = Vec::new();
        for _ in 0..16 {
            last = recorder.record_call(CallCategory::AssistantQuery, true, None, None, None);
        }
        assert_eq!(last.len(), 1);

        // Still firing on the next call; nothing is deduplicated.
        let again = recorder.record_call(CallCategory::AssistantQuery, true, None, None, None);
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_failure_rate_scenario() {
        let (recorder, clock, _store) = recorder();

        for i in 0..20 {
            recorder.record_call(CallCategory::Recommendation, i >= 8, None, None, None);
            clock.advance(ChronoDuration::minutes(30));
        }

        let anomalies = recorder.check_for_anomalies();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, crate::anomaly::AnomalyKind::UnusualFailureRate);
        assert_eq!(anomalies[0].severity, 8);
    }

    #[test]
    fn test_export_reparses_to_buffer_size() {
        let (recorder, _clock, _store) = recorder();
        for i in 0..12 {
            recorder.record_call(CallCategory::ImageGeneration, i % 3 != 0, None, None, Some(0.5));
        }

        let json = recorder.export_as_json().unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), recorder.len());
    }

    #[tokio::test]
    async fn test_track_records_success_and_failure() {
        let (recorder, _clock, _store) = recorder();

        let ok: Result<&str, String> = recorder
            .track(CallCategory::AssistantQuery, async { Ok("answer") })
            .await;
        assert_eq!(ok.unwrap(), "answer");

        let err: Result<(), String> = recorder
            .track(CallCategory::AssistantQuery, async { Err("upstream 500".to_string()) })
            .await;
        assert_eq!(err.unwrap_err(), "upstream 500");

        let records = recorder.snapshot();
        assert_eq!(records.len(), 2);
        assert!(records[0].success);
        assert!(records[0].latency_secs.is_some());
        assert!(!records[1].success);
        assert_eq!(records[1].error.as_deref(), Some("upstream 500"));
    }

    #[tokio::test]
    async fn test_flush_and_restore_drops_expired() {
        let (recorder, clock, store) = recorder();

        recorder.record_call(CallCategory::Other, true, None, None, None);
        clock.advance(ChronoDuration::days(6));
        recorder.record_call(CallCategory::Other, true, None, None, None);
        recorder.flush().await;

        clock.advance(ChronoDuration::days(2));
        let restored = UsageRecorder::open(
            UsageConfig::default(),
            AnomalyConfig::default(),
            store.clone(),
            Arc::new(clock.clone()),
        )
        .await;
        assert_eq!(restored.len(), 1);
    }

    #[tokio::test]
    async fn test_every_tenth_insertion_persists() {
        let (recorder, _clock, store) = recorder();

        for _ in 0..9 {
            recorder.record_call(CallCategory::Other, true, None, None, None);
        }
        tokio::task::yield_now().await;
        assert!(!store.contains("usage_guard.call_records"));

        recorder.record_call(CallCategory::Other, true, None, None, None);
        for _ in 0..10 {
            if store.contains("usage_guard.call_records") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(store.contains("usage_guard.call_records"));
    }

    #[tokio::test]
    async fn test_unvalidated_retention_does_not_panic_on_restore() {
        let (recorder, _clock, store) = recorder();
        recorder.record_call(CallCategory::Other, true, None, None, None);
        recorder.flush().await;

        let restored = UsageRecorder::open(
            UsageConfig {
                retention_days: i64::MAX,
                ..UsageConfig::default()
            },
            AnomalyConfig::default(),
            store,
            Arc::new(ManualClock::new(start())),
        )
        .await;
        assert_eq!(restored.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_store_degrades_to_empty() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("usage_guard.call_records", b"not json".to_vec())
            .await
            .unwrap();

        let recorder = UsageRecorder::open(
            UsageConfig::default(),
            AnomalyConfig::default(),
            store,
            Arc::new(ManualClock::new(start())),
        )
        .await;
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_records_removes_persisted_state() {
        let (recorder, _clock, store) = recorder();
        recorder.record_call(CallCategory::Other, true, None, None, None);
        recorder.flush().await;
        assert!(store.contains("usage_guard.call_records"));

        recorder.clear_all_records().await;
        assert!(recorder.is_empty());
        assert!(!store.contains("usage_guard.call_records"));
    }

    #[tokio::test]
    async fn test_clear_after_tenth_insertion_stays_cleared() {
        let (recorder, _clock, store) = recorder();

        for _ in 0..10 {
            recorder.record_call(CallCategory::Other, true, None, None, None);
        }
        recorder.clear_all_records().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(!store.contains("usage_guard.call_records"));
        let reopened = UsageRecorder::open(
            UsageConfig::default(),
            AnomalyConfig::default(),
            store.clone(),
            Arc::new(ManualClock::new(start())),
        )
        .await;
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn test_flush_is_not_overwritten_by_older_snapshot() {
        let (recorder, _clock, store) = recorder();

        for _ in 0..10 {
            recorder.record_call(CallCategory::Other, true, None, None, None);
        }
        recorder.record_call(CallCategory::Other, true, None, None, None);
        recorder.flush().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let bytes = store.get("usage_guard.call_records").await.unwrap().unwrap();
        assert_eq!(decode_records(&bytes).unwrap().len(), 11);
    }

    #[tokio::test]
    async fn test_out_of_range_latency_in_store_does_not_panic() {
        let store = Arc::new(MemoryStore::new());
        let json = r#"[{"category": "assistant_query", "id": "x", "latency_secs": 1e30, "success": true, "timestamp": "2024-09-01T09:30:00Z"}]"#;
        store
            .set("usage_guard.call_records", json.as_bytes().to_vec())
            .await
            .unwrap();

        let recorder = UsageRecorder::open(
            UsageConfig::default(),
            AnomalyConfig::default(),
            store,
            Arc::new(ManualClock::new(start())),
        )
        .await;
        assert_eq!(recorder.len(), 1);

        let anomalies = recorder.check_for_anomalies();
        assert!(anomalies
            .iter()
            .any(|a| a.kind == crate::anomaly::AnomalyKind::HighLatency));
        assert_eq!(recorder.daily_statistics().average_latency(), None);
        assert!(recorder.get_formatted_report().contains("Total calls: 1"));
    }

    /// Reads nothing and rejects every write.
    struct FailingStore;

    #[async_trait::async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> crate::error::Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn set(&self, key: &str, _value: Vec<u8>) -> crate::error::Result<()> {
            Err(crate::error::GuardError::Storage(format!("{} is read-only", key)))
        }

        async fn remove(&self, key: &str) -> crate::error::Result<()> {
            Err(crate::error::GuardError::Storage(format!("{} is read-only", key)))
        }
    }

    #[tokio::test]
    async fn test_write_failures_keep_memory_buffer() {
        let recorder = UsageRecorder::new(
            UsageConfig::default(),
            AnomalyConfig::default(),
            Arc::new(FailingStore),
            Arc::new(ManualClock::new(start())),
        );

        for _ in 0..10 {
            recorder.record_call(CallCategory::Other, true, None, None, None);
        }
        recorder.flush().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(recorder.len(), 10);
        assert_eq!(recorder.hourly_statistics().total_calls, 10);

        recorder.clear_all_records().await;
        assert!(recorder.is_empty());

        recorder.record_call(CallCategory::Other, false, None, Some("retry".into()), None);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_formatted_report_lists_categories() {
        let (recorder, _clock, _store) = recorder();
        recorder.record_call(CallCategory::AssistantQuery, true, Some(Duration::from_secs(2)), None, None);
        recorder.record_call(CallCategory::ImageGeneration, false, None, Some("quota".into()), Some(3.0));

        let report = recorder.get_formatted_report();
        assert!(report.contains("Total calls: 2"));
        assert!(report.contains("Succeeded: 1 (50.0%)"));
        assert!(report.contains("Mean latency: 2.00s"));
        assert!(report.contains("- assistant_query: 1 calls, 0 failed"));
        assert!(report.contains("- image_generation: 1 calls, 1 failed"));
        assert!(report.contains("Active anomalies: none"));
    }
}
