//! Activity logs as a closed set of kinds, with JSON import/export and merge.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::growth::GrowthMetric;

/// Current export format version.
pub const EXPORT_VERSION: u32 = 1;

/// Fields every log kind carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMeta {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LogMeta {
    pub fn new(occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at,
            updated_at: occurred_at,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedingMethod {
    BreastLeft,
    BreastRight,
    Bottle,
    Solids,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedingLog {
    #[serde(flatten)]
    pub meta: LogMeta,
    pub method: FeedingMethod,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub amount_ml: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepLog {
    #[serde(flatten)]
    pub meta: LogMeta,
    /// Open-ended while the baby is still asleep
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiaperContents {
    Wet,
    Dirty,
    Mixed,
    Dry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaperLog {
    #[serde(flatten)]
    pub meta: LogMeta,
    pub contents: DiaperContents,
}

/// Growth measurements are stored in kg or cm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthLog {
    #[serde(flatten)]
    pub meta: LogMeta,
    pub metric: GrowthMetric,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodReaction {
    None,
    Liked,
    Disliked,
    Allergic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodIntroductionLog {
    #[serde(flatten)]
    pub meta: LogMeta,
    pub food: String,
    pub reaction: FoodReaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Feeding,
    Sleep,
    Diaper,
    Growth,
    FoodIntroduction,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityKind::Feeding => "feeding",
            ActivityKind::Sleep => "sleep",
            ActivityKind::Diaper => "diaper",
            ActivityKind::Growth => "growth",
            ActivityKind::FoodIntroduction => "food introduction",
        };
        f.write_str(name)
    }
}

/// Any logged activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityLog {
    Feeding(FeedingLog),
    Sleep(SleepLog),
    Diaper(DiaperLog),
    Growth(GrowthLog),
    FoodIntroduction(FoodIntroductionLog),
}

impl ActivityLog {
    pub fn meta(&self) -> &LogMeta {
        match self {
            ActivityLog::Feeding(log) => &log.meta,
            ActivityLog::Sleep(log) => &log.meta,
            ActivityLog::Diaper(log) => &log.meta,
            ActivityLog::Growth(log) => &log.meta,
            ActivityLog::FoodIntroduction(log) => &log.meta,
        }
    }

    pub fn id(&self) -> Uuid {
        self.meta().id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.meta().occurred_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.meta().updated_at
    }

    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityLog::Feeding(_) => ActivityKind::Feeding,
            ActivityLog::Sleep(_) => ActivityKind::Sleep,
            ActivityLog::Diaper(_) => ActivityKind::Diaper,
            ActivityLog::Growth(_) => ActivityKind::Growth,
            ActivityLog::FoodIntroduction(_) => ActivityKind::FoodIntroduction,
        }
    }
}

/// Portable snapshot of a profile's logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub logs: Vec<ActivityLog>,
}

impl ActivityExport {
    pub fn new(logs: Vec<ActivityLog>, exported_at: DateTime<Utc>) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at,
            logs,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let export: ActivityExport = serde_json::from_str(json)?;
        debug!(
            version = export.version,
            logs = export.logs.len(),
            "Parsed activity export"
        );
        Ok(export)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Union `incoming` into `local` by id.
///
/// When both sides hold the same id the later `updated_at` wins; ties keep
/// the local copy. The result is ordered by `occurred_at`.
pub fn merge(local: Vec<ActivityLog>, incoming: Vec<ActivityLog>) -> (Vec<ActivityLog>, MergeSummary) {
    let mut summary = MergeSummary::default();
    let mut index: HashMap<Uuid, usize> = HashMap::with_capacity(local.len());
    let mut merged: Vec<ActivityLog> = Vec::with_capacity(local.len() + incoming.len());

    for log in local {
        match index.get(&log.id()) {
            Some(&slot) => {
                if log.updated_at() > merged[slot].updated_at() {
                    merged[slot] = log;
                }
            }
            None => {
                index.insert(log.id(), merged.len());
                merged.push(log);
            }
        }
    }

    for log in incoming {
        match index.get(&log.id()) {
            Some(&slot) => {
                if log.updated_at() > merged[slot].updated_at() {
                    merged[slot] = log;
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
            }
            None => {
                index.insert(log.id(), merged.len());
                merged.push(log);
                summary.added += 1;
            }
        }
    }

    merged.sort_by_key(|log| log.occurred_at());
    info!(
        added = summary.added,
        updated = summary.updated,
        unchanged = summary.unchanged,
        "Merged activity logs"
    );
    (merged, summary)
}
