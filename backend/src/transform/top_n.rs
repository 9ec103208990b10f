//! Top-N reducer: keep the leading split categories and merge the tail
//! into a single `Rest` category.
//!
//! ```text
//! US, Italy, Hubei, France, Monaco   (ranked at end date)
//! limit = 2
//! US, Italy, Rest = Hubei + France + Monaco   (per date)
//! ```

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use super::order::order;
use crate::models::{AggregatedRow, Measures};

/// Label of the synthetic remainder category.
pub const REST_LABEL: &str = "Rest";

/// Keep the top `limit` categories (at least one) ranked at `anchor`;
/// sum the rest per date into [`REST_LABEL`].
///
/// An existing `Rest` category is never kept on its own: it is merged into
/// the new remainder, so running the reducer on its own output with the
/// same or a larger limit changes nothing. Ungrouped rows pass through.
pub fn reduce(rows: Vec<AggregatedRow>, limit: usize, anchor: NaiveDate) -> Vec<AggregatedRow> {
    let limit = limit.max(1);

    let kept: BTreeSet<String> = order(&rows, anchor)
        .into_iter()
        .filter(|label| label != REST_LABEL)
        .take(limit)
        .collect();

    let mut output: Vec<AggregatedRow> = Vec::with_capacity(rows.len());
    let mut rest: BTreeMap<NaiveDate, (Measures, f64)> = BTreeMap::new();

    for row in rows {
        match row.split.as_deref() {
            Some(label) if !kept.contains(label) => {
                let (totals, population) = rest
                    .entry(row.date)
                    .or_insert((Measures::default(), 0.0));
                *totals += row.totals;
                *population += row.population;
            }
            _ => output.push(row),
        }
    }

    output.extend(rest.into_iter().map(|(date, (totals, population))| {
        AggregatedRow::new(Some(REST_LABEL.to_string()), date, totals, population)
    }));
    output.sort_by(|a, b| a.split.cmp(&b.split).then_with(|| a.date.cmp(&b.date)));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{two_entities, world};
    use crate::models::{Dimension, Metric};
    use crate::transform::aggregate::{aggregate, Grouping};

    fn labels(rows: &[AggregatedRow]) -> BTreeSet<&str> {
        rows.iter().map(|r| r.label()).collect()
    }

    #[test]
    fn test_top_one_of_two_entities() {
        let ds = two_entities();
        let rows = aggregate(ds.records(), Grouping::GroupedBy(Dimension::CountryArea));
        let reduced = reduce(rows.clone(), 1, ds.end_date());

        assert_eq!(labels(&reduced), BTreeSet::from(["B", "Rest"]));
        let rest: Vec<&AggregatedRow> = reduced
            .iter()
            .filter(|r| r.label() == REST_LABEL)
            .collect();
        let a: Vec<&AggregatedRow> = rows.iter().filter(|r| r.label() == "A").collect();
        assert_eq!(rest.len(), a.len());
        for (r, a) in rest.iter().zip(a) {
            assert_eq!(r.date, a.date);
            assert_eq!(r.totals, a.totals);
            assert_eq!(r.population, a.population);
        }
        assert_eq!(order(&reduced, ds.end_date()), vec!["B", "Rest"]);
    }

    #[test]
    fn test_limit_below_one_keeps_one() {
        let ds = two_entities();
        let rows = aggregate(ds.records(), Grouping::GroupedBy(Dimension::CountryArea));
        let reduced = reduce(rows, 0, ds.end_date());
        assert_eq!(labels(&reduced), BTreeSet::from(["B", "Rest"]));
    }

    #[test]
    fn test_conservation_per_date() {
        let ds = world();
        let rows = aggregate(ds.records(), Grouping::GroupedBy(Dimension::CountryArea));
        let reduced = reduce(rows.clone(), 2, ds.end_date());
        assert_eq!(labels(&reduced), BTreeSet::from(["Italy", "Rest", "US"]));

        let per_date = |rows: &[AggregatedRow]| {
            let mut sums: BTreeMap<NaiveDate, (Measures, f64)> = BTreeMap::new();
            for r in rows {
                let entry = sums.entry(r.date).or_insert((Measures::default(), 0.0));
                entry.0 += r.totals;
                entry.1 += r.population;
            }
            sums
        };
        let before = per_date(&rows);
        let after = per_date(&reduced);
        assert_eq!(before.len(), after.len());
        for (date, (totals, population)) in &before {
            let (t, p) = after[date];
            for metric in Metric::ALL {
                assert_eq!(t.get(metric), totals.get(metric));
            }
            assert!((p - population).abs() < 1e-9);
        }
    }

    #[test]
    fn test_idempotent() {
        let ds = world();
        let rows = aggregate(ds.records(), Grouping::GroupedBy(Dimension::CountryArea));
        let once = reduce(rows, 2, ds.end_date());
        let twice = reduce(once.clone(), 2, ds.end_date());
        let larger = reduce(once.clone(), 10, ds.end_date());
        assert_eq!(once, twice);
        assert_eq!(once, larger);
    }

    #[test]
    fn test_no_rest_when_everything_fits() {
        let ds = two_entities();
        let rows = aggregate(ds.records(), Grouping::GroupedBy(Dimension::CountryArea));
        let reduced = reduce(rows.clone(), 5, ds.end_date());
        assert_eq!(reduced, rows);
    }

    #[test]
    fn test_ungrouped_passes_through() {
        let ds = two_entities();
        let rows = aggregate(ds.records(), Grouping::Ungrouped);
        assert_eq!(reduce(rows.clone(), 1, ds.end_date()), rows);
    }

    #[test]
    fn test_output_ordered_by_split_then_date() {
        let ds = world();
        let rows = aggregate(ds.records(), Grouping::GroupedBy(Dimension::Country));
        let reduced = reduce(rows, 1, ds.end_date());
        let keys: Vec<(&str, NaiveDate)> = reduced.iter().map(|r| (r.label(), r.date)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
