//! Call records kept by the usage recorder.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of external call being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCategory {
    /// Free-form question to the assistant
    AssistantQuery,
    /// Feeding/sleep recommendation request
    Recommendation,
    /// Illustration generation
    ImageGeneration,
    Other,
}

impl CallCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallCategory::AssistantQuery => "assistant_query",
            CallCategory::Recommendation => "recommendation",
            CallCategory::ImageGeneration => "image_generation",
            CallCategory::Other => "other",
        }
    }
}

impl fmt::Display for CallCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged outcome of an external call. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category: CallCategory,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_units: Option<f64>,
}

impl CallRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        category: CallCategory,
        success: bool,
        latency: Option<Duration>,
        error: Option<String>,
        cost_units: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            category,
            success,
            latency_secs: latency.map(|l| l.as_secs_f64()),
            error,
            cost_units,
        }
    }

    /// Latency in seconds, ignoring negative or non-finite values.
    pub fn latency_secs_checked(&self) -> Option<f64> {
        self.latency_secs.filter(|secs| secs.is_finite() && *secs >= 0.0)
    }

    /// `None` when the stored seconds don't fit a `Duration`.
    pub fn latency(&self) -> Option<Duration> {
        self.latency_secs_checked()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Encode records as pretty JSON with sorted keys and RFC 3339 timestamps.
pub fn encode_records(records: &[CallRecord]) -> serde_json::Result<String> {
    // Going through `Value` sorts object keys.
    let value = serde_json::to_value(records)?;
    serde_json::to_string_pretty(&value)
}

pub fn decode_records(bytes: &[u8]) -> serde_json::Result<Vec<CallRecord>> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encoded_keys_are_sorted() {
        let at = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        let record = CallRecord::new(
            at,
            CallCategory::ImageGeneration,
            false,
            Some(Duration::from_millis(1500)),
            Some("timeout".to_string()),
            Some(2.0),
        );

        let json = encode_records(&[record]).unwrap();
        let keys: Vec<usize> = ["category", "cost_units", "error", "id", "latency_secs", "success", "timestamp"]
            .iter()
            .map(|k| json.find(&format!("\"{}\"", k)).unwrap())
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "keys out of order: {}", json);
        assert!(json.contains("\"2024-02-03T04:05:06Z\""));
        assert!(json.contains("\"image_generation\""));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let record = CallRecord::new(Utc::now(), CallCategory::Other, true, None, None, None);
        let json = encode_records(&[record.clone()]).unwrap();
        assert!(!json.contains("latency_secs"));

        let decoded = decode_records(json.as_bytes()).unwrap();
        assert_eq!(decoded, vec![record]);
    }

    #[test]
    fn test_out_of_range_latency_is_none() {
        let json = r#"[
            {"category": "other", "id": "a", "latency_secs": 1e30, "success": true, "timestamp": "2024-02-03T04:05:06Z"},
            {"category": "other", "id": "b", "latency_secs": -2.0, "success": true, "timestamp": "2024-02-03T04:05:06Z"},
            {"category": "other", "id": "c", "latency_secs": 2.5, "success": true, "timestamp": "2024-02-03T04:05:06Z"}
        ]"#;
        let records = decode_records(json.as_bytes()).unwrap();

        assert_eq!(records[0].latency(), None);
        assert_eq!(records[0].latency_secs_checked(), Some(1e30));
        assert_eq!(records[1].latency(), None);
        assert_eq!(records[1].latency_secs_checked(), None);
        assert_eq!(records[2].latency(), Some(Duration::from_millis(2500)));
    }
}
