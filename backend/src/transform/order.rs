//! Category order resolver.
//!
//! Ranks split categories at an anchor date so legends and stacks keep a
//! fixed order whatever the grouping iteration order was.

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{AggregatedRow, Metric};

/// Ranking value and population of a category at the anchor.
#[derive(Debug, Clone, Copy, Default)]
struct Standing {
    value: i64,
    population: f64,
}

/// Labels ranked by `confirmed_cases` then population, both descending,
/// at `anchor`.
pub fn order(rows: &[AggregatedRow], anchor: NaiveDate) -> Vec<String> {
    order_by(rows, anchor, Metric::ConfirmedCases)
}

/// Labels ranked by `metric` then population, both descending, at `anchor`.
///
/// Every split label appears once. Categories without a row at the anchor
/// rank as zero; remaining ties sort by label so the result is reproducible.
pub fn order_by(rows: &[AggregatedRow], anchor: NaiveDate, metric: Metric) -> Vec<String> {
    let mut standings: BTreeMap<&str, Standing> = BTreeMap::new();

    for row in rows {
        let Some(label) = row.split.as_deref() else {
            continue;
        };
        let standing = standings.entry(label).or_default();
        if row.date == anchor {
            standing.value += row.totals.get(metric);
            standing.population += row.population;
        }
    }

    let mut ranked: Vec<(&str, Standing)> = standings.into_iter().collect();
    ranked.sort_by(|(a_label, a), (b_label, b)| {
        b.value
            .cmp(&a.value)
            .then_with(|| {
                b.population
                    .partial_cmp(&a.population)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a_label.cmp(b_label))
    });

    ranked.into_iter().map(|(label, _)| label.to_string()).collect()
}
