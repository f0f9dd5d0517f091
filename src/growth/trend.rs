//! Linear trend fitting and short-range projection.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::GrowthError;

/// One dated measurement, in whatever unit the caller tracks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl GrowthPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Least-squares line over (days since `origin`, value).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendLine {
    pub origin: NaiveDate,
    pub slope_per_day: f64,
    pub intercept: f64,
}

impl TrendLine {
    pub fn value_at(&self, date: NaiveDate) -> f64 {
        let x = (date - self.origin).num_days() as f64;
        self.intercept + self.slope_per_day * x
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectedPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendProjection {
    pub line: TrendLine,
    pub points: Vec<ProjectedPoint>,
}

/// Fits a straight line and projects it forward.
///
/// The band around each projected value is a fixed fraction of that value,
/// not a statistical confidence interval.
#[derive(Debug, Clone)]
pub struct TrendEstimator {
    /// Days after the latest measurement to project at
    pub offsets_days: Vec<i64>,
    /// Half-width of the band as a fraction of the projected value
    pub band_fraction: f64,
}

impl Default for TrendEstimator {
    fn default() -> Self {
        Self {
            offsets_days: vec![7, 14, 30],
            band_fraction: 0.05,
        }
    }
}

impl TrendEstimator {
    pub fn fit(&self, points: &[GrowthPoint]) -> Result<TrendLine, GrowthError> {
        let origin = points
            .iter()
            .map(|p| p.date)
            .min()
            .ok_or(GrowthError::InsufficientData(0))?;

        let n = points.len() as f64;
        let xs: Vec<f64> = points.iter().map(|p| (p.date - origin).num_days() as f64).collect();
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.value).sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (x, p) in xs.iter().zip(points) {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (p.value - mean_y);
        }

        // All measurements on one date: no slope to fit.
        if sxx == 0.0 {
            return Err(GrowthError::InsufficientData(points.len()));
        }

        let slope_per_day = sxy / sxx;
        Ok(TrendLine {
            origin,
            slope_per_day,
            intercept: mean_y - slope_per_day * mean_x,
        })
    }

    pub fn project(&self, points: &[GrowthPoint]) -> Result<TrendProjection, GrowthError> {
        if let Some(bad) = points.iter().find(|p| !p.value.is_finite()) {
            return Err(GrowthError::InvalidValue(bad.value));
        }

        let line = self.fit(points)?;
        let last = points
            .iter()
            .map(|p| p.date)
            .max()
            .ok_or(GrowthError::InsufficientData(0))?;

        let points = self
            .offsets_days
            .iter()
            .map(|offset| {
                let date = last + Duration::days(*offset);
                let value = line.value_at(date);
                let margin = value.abs() * self.band_fraction;
                ProjectedPoint {
                    date,
                    value,
                    lower: value - margin,
                    upper: value + margin,
                }
            })
            .collect();

        Ok(TrendProjection { line, points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_fit_exact_line() {
        let points = vec![
            GrowthPoint::new(day(1), 4.0),
            GrowthPoint::new(day(11), 5.0),
            GrowthPoint::new(day(21), 6.0),
        ];
        let line = TrendEstimator::default().fit(&points).unwrap();
        assert!((line.slope_per_day - 0.1).abs() < 1e-9);
        assert!((line.intercept - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_project_default_offsets() {
        let points = vec![GrowthPoint::new(day(1), 50.0), GrowthPoint::new(day(31), 53.0)];
        let projection = TrendEstimator::default().project(&points).unwrap();

        let dates: Vec<_> = projection.points.iter().map(|p| p.date).collect();
        assert_eq!(
            dates,
            vec![day(31) + Duration::days(7), day(31) + Duration::days(14), day(31) + Duration::days(30)]
        );

        let first = projection.points[0];
        assert!((first.value - 53.7).abs() < 1e-9);
        assert!((first.upper - first.value - 53.7 * 0.05).abs() < 1e-9);
        assert!((first.value - first.lower - 53.7 * 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_unordered_points() {
        let points = vec![GrowthPoint::new(day(21), 6.0), GrowthPoint::new(day(1), 4.0)];
        let line = TrendEstimator::default().fit(&points).unwrap();
        assert_eq!(line.origin, day(1));
        assert!((line.value_at(day(11)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_needs_two_distinct_dates() {
        let estimator = TrendEstimator::default();
        assert_eq!(estimator.project(&[]), Err(GrowthError::InsufficientData(0)));

        let same_day = vec![GrowthPoint::new(day(3), 4.0), GrowthPoint::new(day(3), 4.2)];
        assert_eq!(estimator.project(&same_day), Err(GrowthError::InsufficientData(2)));
    }
}
