//! Growth percentiles against WHO reference tables and simple trend projection.

mod percentile;
mod reference;
mod trend;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use percentile::{percentile_for, PercentileBand, PercentileResult};
pub use reference::{nearest_bracket, reference_row, AGE_BRACKETS_MONTHS, PERCENTILE_COLUMNS};
pub use trend::{GrowthPoint, ProjectedPoint, TrendEstimator, TrendLine, TrendProjection};

/// Kilograms per pound.
pub const KG_PER_LB: f64 = 0.453_592_37;
/// Centimetres per inch.
pub const CM_PER_IN: f64 = 2.54;

/// Errors from growth calculations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GrowthError {
    #[error("Measurement must be a positive number, got {0}")]
    InvalidValue(f64),

    #[error("Age must be a non-negative number of months, got {0}")]
    InvalidAge(f64),

    #[error("At least two measurements on different dates are needed, got {0}")]
    InsufficientData(usize),

    #[error("Unknown {kind}: {value}")]
    Unrecognized { kind: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

impl FromStr for Sex {
    type Err = GrowthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "male" | "boy" | "m" => Ok(Sex::Male),
            "female" | "girl" | "f" => Ok(Sex::Female),
            _ => Err(GrowthError::Unrecognized {
                kind: "sex",
                value: s.to_string(),
            }),
        }
    }
}

/// What was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthMetric {
    Weight,
    Length,
    HeadCircumference,
}

impl GrowthMetric {
    /// Unit label in the given system.
    pub fn unit(&self, units: UnitSystem) -> &'static str {
        match (self, units) {
            (GrowthMetric::Weight, UnitSystem::Metric) => "kg",
            (GrowthMetric::Weight, UnitSystem::Imperial) => "lb",
            (_, UnitSystem::Metric) => "cm",
            (_, UnitSystem::Imperial) => "in",
        }
    }
}

impl fmt::Display for GrowthMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GrowthMetric::Weight => "weight",
            GrowthMetric::Length => "length",
            GrowthMetric::HeadCircumference => "head circumference",
        };
        f.write_str(name)
    }
}

impl FromStr for GrowthMetric {
    type Err = GrowthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "weight" => Ok(GrowthMetric::Weight),
            "length" | "height" => Ok(GrowthMetric::Length),
            "head" | "head_circumference" => Ok(GrowthMetric::HeadCircumference),
            _ => Err(GrowthError::Unrecognized {
                kind: "metric",
                value: s.to_string(),
            }),
        }
    }
}

/// Display unit system chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

/// Convert a display value into the metric units the reference tables use.
pub fn to_metric(metric: GrowthMetric, value: f64, units: UnitSystem) -> f64 {
    match (metric, units) {
        (_, UnitSystem::Metric) => value,
        (GrowthMetric::Weight, UnitSystem::Imperial) => value * KG_PER_LB,
        (_, UnitSystem::Imperial) => value * CM_PER_IN,
    }
}

/// Convert a metric value into display units.
pub fn from_metric(metric: GrowthMetric, value: f64, units: UnitSystem) -> f64 {
    match (metric, units) {
        (_, UnitSystem::Metric) => value,
        (GrowthMetric::Weight, UnitSystem::Imperial) => value / KG_PER_LB,
        (_, UnitSystem::Imperial) => value / CM_PER_IN,
    }
}
