//! Configuration management for the usage guard.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GuardError, Result};

/// Environment variable prefix, e.g. `CRADLE_GUARD__RATE_LIMIT__PER_MINUTE=20`.
const ENV_PREFIX: &str = "CRADLE_GUARD";

/// Main configuration for the usage guard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Sliding-window caps
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Usage recorder settings
    #[serde(default)]
    pub usage: UsageConfig,

    /// Anomaly detection thresholds
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Where persisted state lives
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Per-window caps for outbound calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    #[serde(default = "default_per_hour")]
    pub per_hour: u32,

    #[serde(default = "default_per_day")]
    pub per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
            per_day: default_per_day(),
        }
    }
}

fn default_per_minute() -> u32 {
    10
}

fn default_per_hour() -> u32 {
    100
}

fn default_per_day() -> u32 {
    500
}

/// Usage recorder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Maximum number of call records held in memory
    #[serde(default = "default_max_records")]
    pub max_records_in_memory: usize,

    /// Persist the buffer after this many insertions
    #[serde(default = "default_persist_every")]
    pub persist_every: usize,

    /// Records older than this are dropped when loading persisted state
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Key under which the buffer is persisted
    #[serde(default = "default_store_key")]
    pub store_key: String,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            max_records_in_memory: default_max_records(),
            persist_every: default_persist_every(),
            retention_days: default_retention_days(),
            store_key: default_store_key(),
        }
    }
}

fn default_max_records() -> usize {
    1000
}

fn default_persist_every() -> usize {
    10
}

/// Upper bound on `usage.retention_days`, ten years
pub const MAX_RETENTION_DAYS: i64 = 3650;

fn default_retention_days() -> i64 {
    7
}

fn default_store_key() -> String {
    "usage_guard.call_records".to_string()
}

/// Thresholds for the usage anomaly rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Calls in the trailing minute above which a frequency anomaly fires
    #[serde(default = "default_frequency_threshold")]
    pub frequency_threshold: usize,

    /// Minimum calls in the trailing day before the failure rate is judged
    #[serde(default = "default_min_calls_for_failure_rate")]
    pub min_calls_for_failure_rate: usize,

    /// Failure rate (0.0-1.0) above which a failure-rate anomaly fires
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    /// Mean latency in seconds above which a latency anomaly fires
    #[serde(default = "default_latency_threshold_secs")]
    pub latency_threshold_secs: f64,

    /// Daily cost budget in cost units; no cost rule when unset
    #[serde(default)]
    pub daily_cost_budget: Option<f64>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            frequency_threshold: default_frequency_threshold(),
            min_calls_for_failure_rate: default_min_calls_for_failure_rate(),
            failure_rate_threshold: default_failure_rate_threshold(),
            latency_threshold_secs: default_latency_threshold_secs(),
            daily_cost_budget: None,
        }
    }
}

fn default_frequency_threshold() -> usize {
    15
}

fn default_min_calls_for_failure_rate() -> usize {
    10
}

fn default_failure_rate_threshold() -> f64 {
    0.3
}

fn default_latency_threshold_secs() -> f64 {
    10.0
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the file-backed key-value store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".cradle-guard")
}

impl GuardConfig {
    /// Load configuration from an optional YAML file layered under
    /// `CRADLE_GUARD__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path, "Loading guard configuration");
            builder = builder.add_source(::config::File::with_name(path).required(true));
        }

        let config: GuardConfig = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GuardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse guard config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the guard unusable.
    pub fn validate(&self) -> Result<()> {
        let caps = &self.rate_limit;
        if caps.per_minute == 0 || caps.per_hour == 0 || caps.per_day == 0 {
            return Err(GuardError::Config(
                "rate limit caps must be greater than zero".to_string(),
            ));
        }
        if self.usage.max_records_in_memory == 0 {
            return Err(GuardError::Config(
                "usage.max_records_in_memory must be greater than zero".to_string(),
            ));
        }
        if self.usage.persist_every == 0 {
            return Err(GuardError::Config(
                "usage.persist_every must be greater than zero".to_string(),
            ));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.usage.retention_days) {
            return Err(GuardError::Config(format!(
                "usage.retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }
        if !(0.0..=1.0).contains(&self.anomaly.failure_rate_threshold) {
            return Err(GuardError::Config(
                "anomaly.failure_rate_threshold must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}
