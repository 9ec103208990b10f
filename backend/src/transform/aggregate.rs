//! Aggregation engine: sum resolved rows per (split, date).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dataset::Record;
use crate::models::{AggregatedRow, Dimension, Measures};

/// How rows are grouped before summing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "grouping", content = "dimension", rename_all = "snake_case")]
pub enum Grouping {
    /// One series, grouped by date only.
    #[default]
    Ungrouped,
    /// One series per value of the dimension.
    GroupedBy(Dimension),
}

impl Grouping {
    pub fn dimension(&self) -> Option<Dimension> {
        match self {
            Grouping::Ungrouped => None,
            Grouping::GroupedBy(d) => Some(*d),
        }
    }

    pub fn is_grouped(&self) -> bool {
        matches!(self, Grouping::GroupedBy(_))
    }

    fn key(&self, record: &Record) -> Option<String> {
        self.dimension()
            .map(|d| d.value_of(&record.observation).to_string())
    }
}

impl From<Option<Dimension>> for Grouping {
    fn from(split: Option<Dimension>) -> Self {
        split.map_or(Grouping::Ungrouped, Grouping::GroupedBy)
    }
}

/// Sum measures and population per group.
///
/// Output is ordered by (split, date) ascending.
pub fn aggregate<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    grouping: Grouping,
) -> Vec<AggregatedRow> {
    let mut groups: BTreeMap<(Option<String>, NaiveDate), (Measures, f64)> = BTreeMap::new();

    for record in records {
        let obs = &record.observation;
        let (totals, population) = groups
            .entry((grouping.key(record), obs.date))
            .or_insert((Measures::default(), 0.0));
        *totals += obs.measures();
        *population += obs.population;
    }

    groups
        .into_iter()
        .map(|((split, date), (totals, population))| {
            AggregatedRow::new(split, date, totals, population)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{day, two_entities, world};
    use crate::models::LevelRates;
    use crate::transform::filter::{resolve, RowSet};
    use crate::models::Selection;

    #[test]
    fn test_two_entity_split() {
        let ds = two_entities();
        let rows = aggregate(ds.records(), Grouping::GroupedBy(Dimension::CountryArea));

        let summary: Vec<(&str, NaiveDate, i64, f64)> = rows
            .iter()
            .map(|r| (r.label(), r.date, r.totals.confirmed_cases, r.population))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("A", day(0), 1, 10.0),
                ("A", day(1), 2, 10.0),
                ("B", day(0), 3, 5.0),
                ("B", day(1), 3, 5.0),
            ]
        );

        let rate = |r: &AggregatedRow| {
            LevelRates::compute(&r.totals, r.population)
                .case_capita
                .value()
        };
        assert_eq!(rate(&rows[0]), Some(0.1));
        assert_eq!(rate(&rows[1]), Some(0.2));
        assert_eq!(rate(&rows[2]), Some(0.6));
    }

    #[test]
    fn test_ungrouped_sums_by_date() {
        let ds = two_entities();
        let rows = aggregate(ds.records(), Grouping::Ungrouped);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].split, None);
        assert_eq!(rows[0].totals.confirmed_cases, 4);
        assert_eq!(rows[1].totals.confirmed_cases, 5);
        assert_eq!(rows[1].population, 15.0);
    }

    #[test]
    fn test_region_split_sums_population() {
        let ds = world();
        let rows = aggregate(
            RowSet::Worldwide.records(&ds),
            Grouping::from(Some(Dimension::Region)),
        );
        let europe_day3 = rows
            .iter()
            .find(|r| r.label() == "Europe" && r.date == day(3))
            .unwrap();
        assert_eq!(europe_day3.totals.confirmed_cases, 400 + 900 + 3);
        assert!((europe_day3.population - 125.04).abs() < 1e-9);
        assert_eq!(rows.len(), 12);
    }

    #[test]
    fn test_empty_rowset_aggregates_to_nothing() {
        let ds = world();
        let sel = Selection::default().with(Dimension::Region, "Antarctica");
        let rows = aggregate(resolve(&ds, &sel).records(&ds), Grouping::Ungrouped);
        assert!(rows.is_empty());
    }
}
