//! WHO child growth standard reference rows.
//!
//! Values are the 3rd, 15th, 50th, 85th and 97th percentiles at each age
//! bracket, in kilograms (weight) or centimetres (length, head circumference).

use super::{GrowthMetric, Sex};

/// Age brackets (in months) every table is sampled at.
pub const AGE_BRACKETS_MONTHS: [u32; 11] = [0, 1, 2, 3, 4, 5, 6, 9, 12, 18, 24];

/// Percentile columns, in table order.
pub const PERCENTILE_COLUMNS: [u8; 5] = [3, 15, 50, 85, 97];

pub type ReferenceRow = [f64; 5];

const BOYS_WEIGHT: [ReferenceRow; 11] = [
    [2.5, 2.9, 3.3, 3.9, 4.3],
    [3.4, 3.9, 4.5, 5.1, 5.7],
    [4.4, 4.9, 5.6, 6.3, 7.0],
    [5.1, 5.6, 6.4, 7.2, 7.9],
    [5.6, 6.2, 7.0, 7.8, 8.6],
    [6.1, 6.7, 7.5, 8.4, 9.2],
    [6.4, 7.1, 7.9, 8.8, 9.7],
    [7.2, 7.9, 8.9, 9.9, 10.9],
    [7.8, 8.6, 9.6, 10.8, 11.8],
    [8.9, 9.7, 10.9, 12.2, 13.3],
    [9.8, 10.8, 12.2, 13.6, 14.8],
];

const GIRLS_WEIGHT: [ReferenceRow; 11] = [
    [2.4, 2.8, 3.2, 3.7, 4.2],
    [3.2, 3.6, 4.2, 4.8, 5.4],
    [4.0, 4.5, 5.1, 5.9, 6.5],
    [4.6, 5.1, 5.8, 6.7, 7.4],
    [5.1, 5.6, 6.4, 7.3, 8.1],
    [5.5, 6.1, 6.9, 7.8, 8.7],
    [5.8, 6.4, 7.3, 8.3, 9.2],
    [6.6, 7.3, 8.2, 9.3, 10.2],
    [7.1, 7.9, 8.9, 10.1, 11.1],
    [8.2, 9.1, 10.2, 11.6, 12.7],
    [9.2, 10.2, 11.5, 13.0, 14.4],
];

const BOYS_LENGTH: [ReferenceRow; 11] = [
    [46.3, 47.9, 49.9, 51.8, 53.4],
    [51.1, 52.7, 54.7, 56.7, 58.4],
    [54.7, 56.4, 58.4, 60.5, 62.2],
    [57.6, 59.3, 61.4, 63.5, 65.3],
    [60.0, 61.7, 63.9, 66.0, 67.8],
    [61.9, 63.7, 65.9, 68.1, 69.9],
    [63.6, 65.4, 67.6, 69.8, 71.6],
    [67.7, 69.6, 72.0, 74.4, 76.3],
    [71.3, 73.3, 75.7, 78.2, 80.2],
    [77.2, 79.5, 82.3, 85.1, 87.3],
    [81.4, 83.9, 87.1, 90.3, 92.9],
];

const GIRLS_LENGTH: [ReferenceRow; 11] = [
    [45.6, 47.2, 49.1, 51.1, 52.7],
    [50.0, 51.7, 53.7, 55.7, 57.4],
    [53.2, 55.0, 57.1, 59.2, 60.9],
    [55.8, 57.6, 59.8, 62.0, 63.8],
    [58.0, 59.8, 62.1, 64.3, 66.2],
    [59.9, 61.7, 64.0, 66.3, 68.2],
    [61.5, 63.4, 65.7, 68.1, 70.0],
    [65.6, 67.6, 70.1, 72.6, 74.7],
    [69.2, 71.3, 74.0, 76.7, 78.9],
    [75.2, 77.7, 80.7, 83.7, 86.2],
    [80.3, 83.0, 86.4, 89.8, 92.5],
];

const BOYS_HEAD: [ReferenceRow; 11] = [
    [32.1, 33.1, 34.5, 35.8, 36.9],
    [35.1, 36.1, 37.3, 38.5, 39.5],
    [36.9, 37.9, 39.1, 40.3, 41.3],
    [38.3, 39.3, 40.5, 41.7, 42.7],
    [39.4, 40.4, 41.6, 42.9, 43.9],
    [40.3, 41.3, 42.6, 43.8, 44.8],
    [41.0, 42.1, 43.3, 44.6, 45.6],
    [42.6, 43.7, 45.0, 46.3, 47.4],
    [43.6, 44.7, 46.1, 47.4, 48.5],
    [44.9, 46.0, 47.4, 48.7, 49.8],
    [45.8, 46.9, 48.3, 49.7, 50.8],
];

const GIRLS_HEAD: [ReferenceRow; 11] = [
    [31.7, 32.7, 33.9, 35.1, 36.1],
    [34.3, 35.3, 36.5, 37.8, 38.8],
    [36.0, 37.0, 38.3, 39.5, 40.5],
    [37.2, 38.2, 39.5, 40.8, 41.9],
    [38.2, 39.3, 40.6, 41.9, 43.0],
    [39.0, 40.1, 41.5, 42.8, 43.9],
    [39.7, 40.8, 42.2, 43.5, 44.6],
    [41.2, 42.3, 43.8, 45.2, 46.3],
    [42.2, 43.4, 44.9, 46.3, 47.5],
    [43.6, 44.8, 46.2, 47.7, 48.8],
    [44.6, 45.8, 47.2, 48.7, 49.9],
];

fn table(sex: Sex, metric: GrowthMetric) -> &'static [ReferenceRow; 11] {
    match (sex, metric) {
        (Sex::Male, GrowthMetric::Weight) => &BOYS_WEIGHT,
        (Sex::Female, GrowthMetric::Weight) => &GIRLS_WEIGHT,
        (Sex::Male, GrowthMetric::Length) => &BOYS_LENGTH,
        (Sex::Female, GrowthMetric::Length) => &GIRLS_LENGTH,
        (Sex::Male, GrowthMetric::HeadCircumference) => &BOYS_HEAD,
        (Sex::Female, GrowthMetric::HeadCircumference) => &GIRLS_HEAD,
    }
}

/// Index of the bracket closest to `age_months`; ties go to the younger one.
pub fn nearest_bracket(age_months: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, bracket) in AGE_BRACKETS_MONTHS.iter().enumerate() {
        let distance = (f64::from(*bracket) - age_months).abs();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

/// Reference row for the bracket nearest to `age_months`, with that bracket.
pub fn reference_row(sex: Sex, metric: GrowthMetric, age_months: f64) -> (u32, &'static ReferenceRow) {
    let index = nearest_bracket(age_months);
    (AGE_BRACKETS_MONTHS[index], &table(sex, metric)[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_bracket() {
        assert_eq!(AGE_BRACKETS_MONTHS[nearest_bracket(0.2)], 0);
        assert_eq!(AGE_BRACKETS_MONTHS[nearest_bracket(7.4)], 6);
        assert_eq!(AGE_BRACKETS_MONTHS[nearest_bracket(8.0)], 9);
        assert_eq!(AGE_BRACKETS_MONTHS[nearest_bracket(15.0)], 12);
        assert_eq!(AGE_BRACKETS_MONTHS[nearest_bracket(40.0)], 24);
    }

    #[test]
    fn test_rows_are_monotonic() {
        for sex in [Sex::Male, Sex::Female] {
            for metric in [GrowthMetric::Weight, GrowthMetric::Length, GrowthMetric::HeadCircumference] {
                let rows = table(sex, metric);
                for row in rows.iter() {
                    assert!(row.windows(2).all(|w| w[0] < w[1]), "{:?} {:?} {:?}", sex, metric, row);
                }
                for pair in rows.windows(2) {
                    assert!(pair[0][2] < pair[1][2], "median must grow with age");
                }
            }
        }
    }
}
