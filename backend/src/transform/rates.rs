//! Rate and increment calculator.
//!
//! Rates are always recomputed from summed numerators and denominators,
//! never averaged across categories.

use serde::{Deserialize, Serialize};

use crate::models::{AggregatedRow, Derived, LevelRates, Measures, PercentChange};

/// Measurement mode of a derived view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Cumulative values with per-capita and share-of-cases rates.
    #[default]
    Level,
    /// Day-over-day increments with their percent change.
    Increment,
}

impl Mode {
    pub fn from_increments(increments: bool) -> Self {
        if increments {
            Mode::Increment
        } else {
            Mode::Level
        }
    }
}

/// Attach the derived fields of `mode` to each row.
///
/// `rows` must be ordered by (split, date).
pub fn apply(rows: Vec<AggregatedRow>, mode: Mode) -> Vec<AggregatedRow> {
    match mode {
        Mode::Level => rows.into_iter().map(with_level_rates).collect(),
        Mode::Increment => with_increments(rows),
    }
}

fn with_level_rates(mut row: AggregatedRow) -> AggregatedRow {
    row.derived = Some(Derived::Level {
        rates: LevelRates::compute(&row.totals, row.population),
    });
    row
}

/// Day-over-day differences per category. The first day of each category
/// has increment 0 and an undefined percent change.
fn with_increments(rows: Vec<AggregatedRow>) -> Vec<AggregatedRow> {
    let mut previous: Option<(Option<String>, Measures, Measures)> = None;

    rows.into_iter()
        .map(|mut row| {
            let derived = match &previous {
                Some((split, totals, increments)) if *split == row.split => {
                    let current = row.totals - *totals;
                    Derived::Increment {
                        increments: current,
                        percent_change: PercentChange::between(&current, increments),
                    }
                }
                _ => Derived::Increment {
                    increments: Measures::default(),
                    percent_change: PercentChange::default(),
                },
            };
            if let Derived::Increment { increments, .. } = derived {
                previous = Some((row.split.clone(), row.totals, increments));
            }
            row.derived = Some(derived);
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{day, two_entities};
    use crate::models::{Dimension, Metric};
    use crate::transform::aggregate::{aggregate, Grouping};

    fn series(label: &str, cases: &[i64]) -> Vec<AggregatedRow> {
        cases
            .iter()
            .enumerate()
            .map(|(i, c)| {
                AggregatedRow::new(
                    Some(label.to_string()),
                    day(i as i64),
                    Measures::new(*c, *c / 10, 0, *c - *c / 10),
                    10.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_level_rates() {
        let ds = two_entities();
        let rows = apply(
            aggregate(ds.records(), Grouping::GroupedBy(Dimension::CountryArea)),
            Mode::Level,
        );
        let capita: Vec<Option<f64>> = rows
            .iter()
            .map(|r| r.level_rates().case_capita.value())
            .collect();
        assert_eq!(capita, vec![Some(0.1), Some(0.2), Some(0.6), Some(0.6)]);
        assert!(matches!(rows[0].derived, Some(Derived::Level { .. })));
    }

    #[test]
    fn test_level_zero_cases_undefined() {
        let rows = apply(series("A", &[0]), Mode::Level);
        let rates = rows[0].level_rates();
        assert!(rates.deaths_rate.is_undefined());
        assert!(rates.recovered_rate.is_undefined());
        assert_eq!(rates.case_capita.value(), Some(0.0));
    }

    #[test]
    fn test_rates_recomputed_from_sums() {
        let ds = two_entities();
        let rows = apply(aggregate(ds.records(), Grouping::Ungrouped), Mode::Level);
        // (2 + 3) / (10 + 5), not the mean of 0.2 and 0.6
        let rate = rows[1].level_rates().case_capita.value().unwrap();
        assert!((rate - 5.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_entity_increments() {
        let ds = two_entities();
        let rows = apply(
            aggregate(ds.records(), Grouping::GroupedBy(Dimension::CountryArea)),
            Mode::Increment,
        );
        let a: Vec<&AggregatedRow> = rows.iter().filter(|r| r.label() == "A").collect();
        assert_eq!(a[0].increments().unwrap().confirmed_cases, 0);
        assert_eq!(a[1].increments().unwrap().confirmed_cases, 1);
        assert!(a[0].percent_change().unwrap().confirmed_cases.is_undefined());
        // Prior increment is 0
        assert!(a[1].percent_change().unwrap().confirmed_cases.is_undefined());

        // B restarts at zero instead of diffing against A
        let b: Vec<&AggregatedRow> = rows.iter().filter(|r| r.label() == "B").collect();
        assert_eq!(b[0].increments().unwrap().confirmed_cases, 0);
    }

    #[test]
    fn test_three_day_percent_change() {
        let rows = apply(series("A", &[10, 30, 70]), Mode::Increment);
        let pct = rows[2].percent_change().unwrap();
        // Increments 0, 20, 40
        assert_eq!(pct.confirmed_cases.value(), Some(1.0));
        assert_eq!(rows[2].increments().unwrap().confirmed_cases, 40);
        assert!(rows[1].percent_change().unwrap().get(Metric::ConfirmedCases).is_undefined());
    }

    #[test]
    fn test_increments_telescope() {
        let cumulative = [3, 3, 8, 20, 21, 40];
        let rows = apply(series("A", &cumulative), Mode::Increment);
        for t in 0..cumulative.len() {
            let sum: i64 = rows[1..=t]
                .iter()
                .map(|r| r.increments().unwrap().confirmed_cases)
                .sum();
            assert_eq!(cumulative[t], cumulative[0] + sum);
        }
    }

    #[test]
    fn test_negative_corrections_allowed() {
        let rows = apply(series("A", &[10, 8]), Mode::Increment);
        assert_eq!(rows[1].increments().unwrap().confirmed_cases, -2);
        assert_eq!(rows[1].totals.confirmed_cases, 8);
    }
}
