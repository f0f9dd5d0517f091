//! Percentile band lookup.

use std::fmt;

use serde::Serialize;

use super::reference::{reference_row, PERCENTILE_COLUMNS};
use super::{to_metric, GrowthError, GrowthMetric, Sex, UnitSystem};

/// Which pair of reference columns a measurement falls between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentileBand {
    Below3rd,
    From3rdTo15th,
    From15thTo50th,
    From50thTo85th,
    From85thTo97th,
    Above97th,
}

impl PercentileBand {
    fn from_index(index: usize) -> Self {
        match index {
            0 => PercentileBand::Below3rd,
            1 => PercentileBand::From3rdTo15th,
            2 => PercentileBand::From15thTo50th,
            3 => PercentileBand::From50thTo85th,
            4 => PercentileBand::From85thTo97th,
            _ => PercentileBand::Above97th,
        }
    }

    /// Whether the measurement sits outside the 3rd-97th range.
    pub fn is_outlier(&self) -> bool {
        matches!(self, PercentileBand::Below3rd | PercentileBand::Above97th)
    }
}

impl fmt::Display for PercentileBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PercentileBand::Below3rd => "below the 3rd percentile",
            PercentileBand::From3rdTo15th => "3rd-15th percentile",
            PercentileBand::From15thTo50th => "15th-50th percentile",
            PercentileBand::From50thTo85th => "50th-85th percentile",
            PercentileBand::From85thTo97th => "85th-97th percentile",
            PercentileBand::Above97th => "above the 97th percentile",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileResult {
    pub band: PercentileBand,
    /// Linear estimate inside the band; 1 or 99 outside the table range
    pub approximate_percentile: f64,
    /// Age bracket the reference row was taken from
    pub age_bracket_months: u32,
    /// The measurement in kg or cm
    pub metric_value: f64,
    /// Reference median at that bracket, in kg or cm
    pub median: f64,
}

/// Place a measurement, given in display `units`, against the nearest
/// age bracket's reference row.
pub fn percentile_for(
    sex: Sex,
    metric: GrowthMetric,
    age_months: f64,
    value: f64,
    units: UnitSystem,
) -> Result<PercentileResult, GrowthError> {
    if !age_months.is_finite() || age_months < 0.0 {
        return Err(GrowthError::InvalidAge(age_months));
    }
    if !value.is_finite() || value <= 0.0 {
        return Err(GrowthError::InvalidValue(value));
    }

    let metric_value = to_metric(metric, value, units);
    let (bracket, row) = reference_row(sex, metric, age_months);

    // Number of reference columns the value is at or above.
    let index = row.iter().take_while(|reference| metric_value >= **reference).count();
    let band = PercentileBand::from_index(index);

    let approximate_percentile = match index {
        0 => 1.0,
        i if i >= row.len() => 99.0,
        i => {
            let (lo, hi) = (row[i - 1], row[i]);
            let (p_lo, p_hi) = (f64::from(PERCENTILE_COLUMNS[i - 1]), f64::from(PERCENTILE_COLUMNS[i]));
            p_lo + (metric_value - lo) / (hi - lo) * (p_hi - p_lo)
        }
    };

    Ok(PercentileResult {
        band,
        approximate_percentile,
        age_bracket_months: bracket,
        metric_value,
        median: row[2],
    })
}
