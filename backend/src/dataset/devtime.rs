//! Development time: days since an entity's per-capita case rate first
//! reached the alignment threshold.
//!
//! ```text
//! date        2020-03-01  2020-03-02  2020-03-03  2020-03-04
//! cases/pop   2.1         4.9         5.3         7.8
//! devt_time   -2          -1          0           1
//!                                     ^ t0
//! ```
//!
//! The per-entity table is built once when the dataset loads. Views that
//! group coarser than `country_area` compute their origins on the
//! aggregated series with the same rule.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{AggregatedRow, Observation, Ratio};

/// Time origins of one `country_area`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct DevTimeRecord {
    /// First date with `confirmed_cases / population >= threshold`.
    pub t0_date: Option<NaiveDate>,
    /// First date with at least one confirmed case.
    pub first_case_date: Option<NaiveDate>,
}

impl DevTimeRecord {
    /// Day offset of `date` from `t0`, undefined when the entity never crossed.
    pub fn devt_time(&self, date: NaiveDate) -> Option<i64> {
        self.t0_date.map(|t0| days_between(t0, date))
    }
}

/// Per-entity development-time origins, keyed by `country_area`.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct DevTimeTable {
    pub threshold: f64,
    entries: BTreeMap<String, DevTimeRecord>,
}

impl DevTimeTable {
    /// Scan every entity's date-ordered observations.
    ///
    /// `observations` must be sorted by (`country_area`, `date`).
    pub fn build(observations: &[Observation], threshold: f64) -> Self {
        let mut entries: BTreeMap<String, DevTimeRecord> = BTreeMap::new();

        for obs in observations {
            let entry = entries.entry(obs.country_area.clone()).or_default();
            if entry.first_case_date.is_none() && obs.confirmed_cases > 0 {
                entry.first_case_date = Some(obs.date);
            }
            if entry.t0_date.is_none()
                && crosses(obs.confirmed_cases as f64, obs.population, threshold)
            {
                entry.t0_date = Some(obs.date);
            }
        }

        Self { threshold, entries }
    }

    pub fn get(&self, entity: &str) -> Option<&DevTimeRecord> {
        self.entries.get(entity)
    }

    pub fn t0(&self, entity: &str) -> Option<NaiveDate> {
        self.entries.get(entity).and_then(|r| r.t0_date)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DevTimeRecord)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entities that reached the threshold.
    pub fn crossed(&self) -> usize {
        self.entries.values().filter(|r| r.t0_date.is_some()).count()
    }
}

fn crosses(cases: f64, population: f64, threshold: f64) -> bool {
    Ratio::of(cases, population)
        .value()
        .map_or(false, |rate| rate >= threshold)
}

fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// First date of each category's series at which the summed per-capita
/// rate reaches `threshold`.
///
/// `rows` must be ordered by (split, date), as produced by aggregation.
pub fn series_origins(rows: &[AggregatedRow], threshold: f64) -> BTreeMap<String, NaiveDate> {
    let mut origins = BTreeMap::new();
    for row in rows {
        if origins.contains_key(row.label()) {
            continue;
        }
        if crosses(row.totals.confirmed_cases as f64, row.population, threshold) {
            origins.insert(row.label().to_string(), row.date);
        }
    }
    origins
}

/// Attach `devt_time` to each row and keep only rows on or after their
/// category's origin. Categories without an origin are dropped.
pub fn align(
    rows: Vec<AggregatedRow>,
    origins: &BTreeMap<String, NaiveDate>,
) -> Vec<AggregatedRow> {
    rows.into_iter()
        .filter_map(|mut row| {
            let t0 = *origins.get(row.label())?;
            let offset = days_between(t0, row.date);
            if offset < 0 {
                return None;
            }
            row.devt_time = Some(offset);
            Some(row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{day, observation};
    use crate::models::Measures;

    fn series(label: &str, population: f64, cases: &[i64]) -> Vec<AggregatedRow> {
        cases
            .iter()
            .enumerate()
            .map(|(i, c)| {
                AggregatedRow::new(
                    Some(label.to_string()),
                    day(i as i64),
                    Measures::new(*c, 0, 0, *c),
                    population,
                )
            })
            .collect()
    }

    #[test]
    fn test_table_finds_first_crossing() {
        let rows = vec![
            observation("A", 0, 10.0, 0),
            observation("A", 1, 10.0, 21),
            observation("A", 2, 10.0, 49),
            observation("A", 3, 10.0, 53),
            observation("A", 4, 10.0, 78),
            observation("B", 0, 10.0, 1),
            observation("B", 1, 10.0, 2),
        ];
        let table = DevTimeTable::build(&rows, 5.0);

        let a = table.get("A").unwrap();
        assert_eq!(a.t0_date, Some(day(3)));
        assert_eq!(a.first_case_date, Some(day(1)));

        let b = table.get("B").unwrap();
        assert_eq!(b.t0_date, None);
        assert_eq!(b.first_case_date, Some(day(0)));
        assert_eq!(table.crossed(), 1);
    }

    #[test]
    fn test_devt_time_is_monotonic_around_origin() {
        let record = DevTimeRecord {
            t0_date: Some(day(3)),
            first_case_date: Some(day(0)),
        };
        assert_eq!(record.devt_time(day(3)), Some(0));
        assert_eq!(record.devt_time(day(2)), Some(-1));

        let offsets: Vec<i64> = (0..6).filter_map(|d| record.devt_time(day(d))).collect();
        assert!(offsets.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(DevTimeRecord::default().devt_time(day(1)), None);
    }

    #[test]
    fn test_zero_population_never_crosses() {
        let rows = vec![observation("A", 0, 0.0, 100)];
        let table = DevTimeTable::build(&rows, 5.0);
        assert_eq!(table.t0("A"), None);
    }

    #[test]
    fn test_align_drops_rows_before_origin() {
        let mut rows = series("A", 10.0, &[10, 60, 80]);
        rows.extend(series("B", 10.0, &[1, 2, 3]));

        let origins = series_origins(&rows, 5.0);
        assert_eq!(origins.get("A"), Some(&day(1)));
        assert!(origins.get("B").is_none());

        let aligned = align(rows, &origins);
        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned[0].devt_time, Some(0));
        assert_eq!(aligned[0].date, day(1));
        assert_eq!(aligned[1].devt_time, Some(1));
        assert!(aligned.iter().all(|r| r.label() == "A"));
    }
}
