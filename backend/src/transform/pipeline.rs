//! High-level view API combining every pipeline stage.
//!
//! ```text
//! Selection -> filter -> aggregate -> top-N -> rates -> order -> (align)
//! ```
//!
//! Three views feed the rendering layer:
//!
//! - [`compute_timeline_view`] - split series with rates or increments,
//!   the deaths/recovered/active composition and the current detail rows
//! - [`compute_progression_view`] - per-entity curves, optionally aligned
//!   on development time
//! - [`compute_map_snapshot`] - one day of every entity plus headline totals
//!
//! Each entry point reads the shared [`DatasetStore`] and fails only when no
//! dataset is loaded. Everything built here belongs to the request.
//!
//! # Example
//!
//! ```rust,ignore
//! use curves::{compute_timeline_view, DatasetStore, Dimension, Selection};
//!
//! let store = DatasetStore::new();
//! store.load("data/covid.csv", &Default::default())?;
//!
//! let selection = Selection::default()
//!     .with(Dimension::Region, "Europe")
//!     .split_by(Dimension::Country)
//!     .limit(5);
//! let view = compute_timeline_view(&store, &selection)?;
//! println!("{:?}", view.order);
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::aggregate::{aggregate, Grouping};
use super::filter::select;
use super::order::{order, order_by};
use super::rates::{apply, Mode};
use super::top_n::reduce;
use crate::api::logs::log_info;
use crate::dataset::devtime::{align, series_origins};
use crate::dataset::{Dataset, DatasetStore, Record};
use crate::error::PipelineResult;
use crate::models::{AggregatedRow, Dimension, Measures, Metric, Observation, Ratio, Selection};

// =============================================================================
// Timeline
// =============================================================================

/// One measure of the composition view on a given date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CompositionValue {
    /// Cumulative value.
    pub value: i64,
    /// Day-over-day increment, 0 on the first day.
    pub increment: i64,
    pub value_change: Ratio,
    pub increment_change: Ratio,
}

/// Deaths, recovered and active totals of one date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompositionPoint {
    pub date: NaiveDate,
    pub deaths: CompositionValue,
    pub recovered: CompositionValue,
    pub active: CompositionValue,
}

/// Output of [`compute_timeline_view`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineView {
    pub series: Vec<AggregatedRow>,
    /// Category order; empty without a split.
    pub order: Vec<String>,
    pub split_active: bool,
    pub composition: Vec<CompositionPoint>,
    /// Split rows at the dataset's end date, in category order.
    pub current: Vec<AggregatedRow>,
}

impl TimelineView {
    pub fn build(dataset: &Dataset, selection: &Selection) -> Self {
        let rows = select(dataset, selection);
        let grouping = Grouping::from(selection.split);
        let end_date = dataset.end_date();

        let mut aggregated = aggregate(rows.records(dataset), grouping);
        if let (Grouping::GroupedBy(_), Some(limit)) = (grouping, selection.top_limit) {
            aggregated = reduce(aggregated, limit, end_date);
        }

        let composition = composition(&aggregated);
        let mut order = if grouping.is_grouped() {
            order(&aggregated, end_date)
        } else {
            Vec::new()
        };

        let origins = if selection.devtime {
            Some(development_origins(dataset, grouping, &aggregated))
        } else {
            None
        };

        let mut series = apply(aggregated, Mode::from_increments(selection.increments));

        let current = if grouping.is_grouped() {
            let mut at_end: BTreeMap<String, AggregatedRow> = series
                .iter()
                .filter(|r| r.date == end_date)
                .map(|r| (r.label().to_string(), r.clone()))
                .collect();
            order.iter().filter_map(|label| at_end.remove(label)).collect()
        } else {
            Vec::new()
        };

        if let Some(origins) = origins {
            series = align(series, &origins);
            order.retain(|label| origins.contains_key(label));
        }

        log_info(format!(
            "Timeline: {} rows selected, {} series rows, {} categories",
            rows.len(dataset),
            series.len(),
            order.len()
        ));

        TimelineView {
            series,
            order,
            split_active: grouping.is_grouped(),
            composition,
            current,
        }
    }
}

/// Development-time origins of each category of `rows`.
///
/// Entity splits read the load-time table; coarser groupings (and the
/// `Rest` bucket) cross the threshold on their own summed series.
fn development_origins(
    dataset: &Dataset,
    grouping: Grouping,
    rows: &[AggregatedRow],
) -> BTreeMap<String, NaiveDate> {
    let series = series_origins(rows, dataset.devtime().threshold);
    if grouping != Grouping::GroupedBy(Dimension::CountryArea) {
        return series;
    }

    let labels: BTreeSet<&str> = rows.iter().map(|r| r.label()).collect();
    labels
        .into_iter()
        .filter_map(|label| {
            let t0 = match dataset.devtime().get(label) {
                Some(entity) => entity.t0_date,
                None => series.get(label).copied(),
            }?;
            Some((label.to_string(), t0))
        })
        .collect()
}

/// Per-date deaths, recovered and active totals over every category.
pub fn composition(rows: &[AggregatedRow]) -> Vec<CompositionPoint> {
    let mut per_date: BTreeMap<NaiveDate, Measures> = BTreeMap::new();
    for row in rows {
        *per_date.entry(row.date).or_default() += row.totals;
    }

    let mut previous: Option<(Measures, Measures)> = None;
    per_date
        .into_iter()
        .map(|(date, totals)| {
            let increments =
                previous.map_or(Measures::default(), |(prev_totals, _)| totals - prev_totals);
            let component = |metric: Metric| {
                let (value_change, increment_change) = match previous {
                    Some((prev_totals, prev_increments)) => (
                        Ratio::percent_change(
                            totals.get(metric) as f64,
                            prev_totals.get(metric) as f64,
                        ),
                        Ratio::percent_change(
                            increments.get(metric) as f64,
                            prev_increments.get(metric) as f64,
                        ),
                    ),
                    None => (Ratio::UNDEFINED, Ratio::UNDEFINED),
                };
                CompositionValue {
                    value: totals.get(metric),
                    increment: increments.get(metric),
                    value_change,
                    increment_change,
                }
            };
            let point = CompositionPoint {
                date,
                deaths: component(Metric::Deaths),
                recovered: component(Metric::Recovered),
                active: component(Metric::Active),
            };
            previous = Some((totals, increments));
            point
        })
        .collect()
}

/// Build the timeline view from the shared dataset.
pub fn compute_timeline_view(
    store: &DatasetStore,
    selection: &Selection,
) -> PipelineResult<TimelineView> {
    let dataset = store.get()?;
    Ok(TimelineView::build(&dataset, selection))
}

// =============================================================================
// Progression
// =============================================================================

/// Display switches of the progression view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ProgressionOptions {
    pub metric: Metric,
    /// Align curves on development time instead of calendar dates.
    pub devtime: bool,
    /// Non-positive values become undefined.
    pub log_scale: bool,
    /// Plot the day-over-day percent change of the value.
    pub percent: bool,
}

/// One point of an entity curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurvePoint {
    #[serde(flatten)]
    pub row: AggregatedRow,
    /// Plotted value.
    pub value: Ratio,
}

/// Cases and per-capita rate of an entity on a reference date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub date: NaiveDate,
    pub confirmed_cases: i64,
    pub case_capita: Ratio,
}

/// First notification and development-time origin of one entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferencePoint {
    pub entity: String,
    pub first_case: Option<Milestone>,
    pub t0: Option<Milestone>,
}

/// Output of [`compute_progression_view`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressionView {
    pub curves: Vec<CurvePoint>,
    pub reference_points: Vec<ReferencePoint>,
    pub order: Vec<String>,
    pub options: ProgressionOptions,
}

impl ProgressionView {
    /// `selection.percent_change` and `options.percent` both switch the
    /// plotted value to its percent change.
    pub fn build(dataset: &Dataset, selection: &Selection, options: &ProgressionOptions) -> Self {
        let options = &ProgressionOptions {
            percent: options.percent || selection.percent_change,
            ..*options
        };
        let end_date = dataset.end_date();
        let rows = select(dataset, selection);
        let mut entities = aggregate(
            rows.records(dataset),
            Grouping::GroupedBy(Dimension::CountryArea),
        );

        if let Some(limit) = selection.top_limit {
            let kept: Vec<String> = order_by(&entities, end_date, options.metric)
                .into_iter()
                .take(limit.max(1))
                .collect();
            entities.retain(|r| kept.iter().any(|k| k == r.label()));
        }

        let order = order(&entities, end_date);
        let reference_points = reference_points(dataset, &entities, &order);

        let mut curves = apply(entities, Mode::Level);
        if options.devtime {
            let origins: BTreeMap<String, NaiveDate> = dataset
                .devtime()
                .iter()
                .filter_map(|(entity, record)| record.t0_date.map(|t0| (entity.clone(), t0)))
                .collect();
            curves = align(curves, &origins);
        }

        let curves = curve_values(curves, options, selection.per_capita);

        log_info(format!(
            "Progression: {} entities, {} points ({})",
            order.len(),
            curves.len(),
            options.metric
        ));

        ProgressionView {
            curves,
            reference_points,
            order,
            options: *options,
        }
    }
}

fn curve_values(
    rows: Vec<AggregatedRow>,
    options: &ProgressionOptions,
    per_capita: bool,
) -> Vec<CurvePoint> {
    let mut previous: Option<(String, Ratio)> = None;

    rows.into_iter()
        .map(|row| {
            let base = if per_capita {
                options.metric.rate(&row.totals, row.population)
            } else {
                Ratio::defined(row.totals.get(options.metric) as f64)
            };

            let mut value = base;
            if options.percent {
                value = match &previous {
                    Some((label, prior)) if label == row.label() => {
                        base.and_then(|current| {
                            prior.and_then(|p| Ratio::percent_change(current, p))
                        })
                    }
                    _ => Ratio::UNDEFINED,
                };
            }
            if options.log_scale {
                value = value.and_then(|v| {
                    if v > 0.0 {
                        Ratio::defined(v)
                    } else {
                        Ratio::UNDEFINED
                    }
                });
            }

            previous = Some((row.label().to_string(), base));
            CurvePoint { row, value }
        })
        .collect()
}

fn reference_points(
    dataset: &Dataset,
    rows: &[AggregatedRow],
    order: &[String],
) -> Vec<ReferencePoint> {
    let by_key: BTreeMap<(&str, NaiveDate), &AggregatedRow> =
        rows.iter().map(|r| ((r.label(), r.date), r)).collect();

    let milestone = |entity: &str, date: Option<NaiveDate>| -> Option<Milestone> {
        let date = date?;
        let row = by_key.get(&(entity, date))?;
        Some(Milestone {
            date,
            confirmed_cases: row.totals.confirmed_cases,
            case_capita: Metric::ConfirmedCases.rate(&row.totals, row.population),
        })
    };

    order
        .iter()
        .map(|entity| {
            let record = dataset.devtime().get(entity).copied().unwrap_or_default();
            ReferencePoint {
                entity: entity.clone(),
                first_case: milestone(entity, record.first_case_date),
                t0: milestone(entity, record.t0_date),
            }
        })
        .collect()
}

/// Build the progression view from the shared dataset.
pub fn compute_progression_view(
    store: &DatasetStore,
    selection: &Selection,
    options: &ProgressionOptions,
) -> PipelineResult<ProgressionView> {
    let dataset = store.get()?;
    Ok(ProgressionView::build(&dataset, selection, options))
}

// =============================================================================
// Map snapshot
// =============================================================================

/// Request of the map view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MapOptions {
    pub metric: Metric,
    pub per_capita: bool,
    /// Defaults to the dataset's end date; clamped into the valid range.
    pub date: Option<NaiveDate>,
    pub exclude_small_population: bool,
}

/// One entity on the snapshot date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapRow {
    #[serde(flatten)]
    pub observation: Observation,
    /// Metric, or its rate when per capita.
    pub value: Ratio,
}

/// Dataset-wide total of one metric on the snapshot date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Headline {
    pub metric: Metric,
    pub total: i64,
    pub previous_total: i64,
    /// `total / previous_total - 1`.
    pub day_over_day_variance: Ratio,
    /// Per capita for cases, share of cases otherwise.
    pub rate: Ratio,
    pub label: String,
}

impl Headline {
    fn compute(metric: Metric, current: &(Measures, f64), previous: &(Measures, f64)) -> Self {
        let total = current.0.get(metric);
        let previous_total = previous.0.get(metric);
        Headline {
            metric,
            total,
            previous_total,
            day_over_day_variance: Ratio::of(total as f64, previous_total as f64)
                .and_then(|r| Ratio::defined(r - 1.0)),
            rate: metric.rate(&current.0, current.1),
            label: human_format(total as f64),
        }
    }
}

/// Cases and deaths headlines shown next to the map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapSummary {
    pub cases: Headline,
    pub deaths: Headline,
}

/// Output of [`compute_map_snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapSnapshot {
    pub date: NaiveDate,
    pub rows: Vec<MapRow>,
    /// Largest value over entities meeting the population threshold.
    pub scale_max: Ratio,
    pub headline: Headline,
    pub summary: MapSummary,
    pub options: MapOptions,
}

impl MapSnapshot {
    pub fn build(dataset: &Dataset, options: &MapOptions) -> Self {
        let date = dataset.clamp_date(options.date.unwrap_or_else(|| dataset.end_date()));
        let previous = date.pred_opt().unwrap_or(date);

        let value_of = |record: &Record| -> Ratio {
            if options.per_capita {
                record.rates.get(options.metric)
            } else {
                Ratio::defined(record.observation.measures().get(options.metric) as f64)
            }
        };

        let rows: Vec<MapRow> = dataset
            .records()
            .iter()
            .filter(|r| r.observation.date == date)
            .filter(|r| !options.exclude_small_population || r.observation.pop_flag)
            .map(|r| MapRow {
                observation: r.observation.clone(),
                value: value_of(r),
            })
            .collect();

        let scale_max = dataset
            .records()
            .iter()
            .filter(|r| r.observation.pop_flag)
            .filter_map(|r| value_of(r).value())
            .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))));

        let totals_on = |day: NaiveDate| -> (Measures, f64) {
            dataset
                .records()
                .iter()
                .filter(|r| r.observation.date == day)
                .fold((Measures::default(), 0.0), |(m, p), r| {
                    (m + r.observation.measures(), p + r.observation.population)
                })
        };
        let current = totals_on(date);
        let prior = totals_on(previous);

        if options.date.map_or(false, |requested| requested != date) {
            log_info(format!("Map date clamped to {}", date));
        }

        MapSnapshot {
            date,
            rows,
            scale_max: Ratio::from(scale_max),
            headline: Headline::compute(options.metric, &current, &prior),
            summary: MapSummary {
                cases: Headline::compute(Metric::ConfirmedCases, &current, &prior),
                deaths: Headline::compute(Metric::Deaths, &current, &prior),
            },
            options: *options,
        }
    }
}

/// Build the map snapshot from the shared dataset.
pub fn compute_map_snapshot(
    store: &DatasetStore,
    options: &MapOptions,
) -> PipelineResult<MapSnapshot> {
    let dataset = store.get()?;
    Ok(MapSnapshot::build(&dataset, options))
}

/// Compact number label with a K/M/G/T/P suffix and one decimal.
pub fn human_format(num: f64) -> String {
    const SUFFIXES: [&str; 6] = ["", "K", "M", "G", "T", "P"];

    if !num.is_finite() {
        return String::new();
    }
    let mut num = num;
    let mut magnitude = 0;
    while num.abs() >= 1000.0 && magnitude < SUFFIXES.len() - 1 {
        magnitude += 1;
        num /= 1000.0;
    }
    format!("{:.1}{}", num, SUFFIXES[magnitude])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{day, two_entities, world};
    use crate::error::PipelineError;
    use crate::transform::top_n::REST_LABEL;

    // -------------------------------------------------------------------------
    // Timeline
    // -------------------------------------------------------------------------

    #[test]
    fn test_timeline_two_entities() {
        let ds = two_entities();
        let sel = Selection::default().split_by(Dimension::CountryArea);
        let view = TimelineView::build(&ds, &sel);

        assert!(view.split_active);
        assert_eq!(view.order, vec!["B", "A"]);
        assert_eq!(view.series.len(), 4);
        let capita: Vec<(&str, Option<f64>)> = view
            .series
            .iter()
            .map(|r| (r.label(), r.level_rates().case_capita.value()))
            .collect();
        assert_eq!(
            capita,
            vec![("A", Some(0.1)), ("A", Some(0.2)), ("B", Some(0.6)), ("B", Some(0.6))]
        );

        let current: Vec<&str> = view.current.iter().map(|r| r.label()).collect();
        assert_eq!(current, vec!["B", "A"]);
        assert!(view.current.iter().all(|r| r.date == day(1)));
    }

    #[test]
    fn test_timeline_top_limit() {
        let ds = two_entities();
        let sel = Selection::default().split_by(Dimension::CountryArea).limit(1);
        let view = TimelineView::build(&ds, &sel);
        assert_eq!(view.order, vec!["B", REST_LABEL]);
        let rest: Vec<i64> = view
            .series
            .iter()
            .filter(|r| r.label() == REST_LABEL)
            .map(|r| r.totals.confirmed_cases)
            .collect();
        assert_eq!(rest, vec![1, 2]);
    }

    #[test]
    fn test_timeline_ungrouped_ignores_limit() {
        let ds = world();
        let sel = Selection::default().limit(1);
        let view = TimelineView::build(&ds, &sel);
        assert!(!view.split_active);
        assert!(view.order.is_empty());
        assert!(view.current.is_empty());
        assert_eq!(view.series.len(), 4);
        assert!(view.series.iter().all(|r| r.split.is_none()));
    }

    #[test]
    fn test_timeline_increments() {
        let ds = two_entities();
        let mut sel = Selection::default().split_by(Dimension::CountryArea);
        sel.increments = true;
        let view = TimelineView::build(&ds, &sel);
        let a: Vec<i64> = view
            .series
            .iter()
            .filter(|r| r.label() == "A")
            .map(|r| r.increments().unwrap().confirmed_cases)
            .collect();
        assert_eq!(a, vec![0, 1]);
    }

    #[test]
    fn test_timeline_empty_selection() {
        let ds = world();
        let sel = Selection::default().with(Dimension::Country, "Atlantis");
        let view = TimelineView::build(&ds, &sel);
        assert!(view.series.is_empty());
        assert!(view.composition.is_empty());
    }

    #[test]
    fn test_timeline_devtime_entity_split() {
        let ds = world();
        let mut sel = Selection::default().split_by(Dimension::CountryArea);
        sel.devtime = true;
        let view = TimelineView::build(&ds, &sel);

        // Italy crosses on day 1
        let italy: Vec<(NaiveDate, Option<i64>)> = view
            .series
            .iter()
            .filter(|r| r.label() == "Italy")
            .map(|r| (r.date, r.devt_time))
            .collect();
        assert_eq!(italy, vec![(day(1), Some(0)), (day(2), Some(1)), (day(3), Some(2))]);
        assert!(view.series.iter().all(|r| r.devt_time.map_or(false, |t| t >= 0)));

        // US: 2000 / 330 = 6.06 on day 2; France: 300 / 65 = 4.6 on day 2, 6.15 on day 3
        assert_eq!(
            view.series.iter().find(|r| r.label() == "US").map(|r| r.date),
            Some(day(2))
        );
        assert_eq!(
            view.series.iter().find(|r| r.label() == "France").map(|r| r.date),
            Some(day(3))
        );
    }

    #[test]
    fn test_timeline_devtime_drops_non_crossing() {
        let ds = two_entities();
        let mut sel = Selection::default().split_by(Dimension::CountryArea);
        sel.devtime = true;
        let view = TimelineView::build(&ds, &sel);
        assert!(view.series.is_empty());
        assert!(view.order.is_empty());
    }

    #[test]
    fn test_timeline_devtime_region_split() {
        let ds = world();
        let mut sel = Selection::default().split_by(Dimension::Region);
        sel.devtime = true;
        let view = TimelineView::build(&ds, &sel);
        // Asia: 200 / 58 = 3.4, 400 / 58 = 6.9 on day 1
        let asia: Vec<Option<i64>> = view
            .series
            .iter()
            .filter(|r| r.label() == "Asia")
            .map(|r| r.devt_time)
            .collect();
        assert_eq!(asia, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_composition() {
        let ds = world();
        let view = TimelineView::build(&ds, &Selection::default());
        assert_eq!(view.composition.len(), 4);

        let first = &view.composition[0];
        assert_eq!(first.deaths.increment, 0);
        assert!(first.deaths.value_change.is_undefined());
        assert!(first.deaths.increment_change.is_undefined());

        // deaths: day0 = 0 + 1 + 0 + 10 + 0 = 11, day1 = 5 + 30 + 0 + 20 + 0 = 55
        let second = &view.composition[1];
        assert_eq!(first.deaths.value, 11);
        assert_eq!(second.deaths.value, 55);
        assert_eq!(second.deaths.increment, 44);
        assert_eq!(second.deaths.value_change.value(), Some(4.0));
        assert!(second.deaths.increment_change.is_undefined());

        let total: i64 = ds
            .records()
            .iter()
            .filter(|r| r.observation.date == day(3))
            .map(|r| r.observation.active as i64)
            .sum();
        assert_eq!(view.composition[3].active.value, total);
    }

    #[test]
    fn test_entry_point_requires_dataset() {
        let store = DatasetStore::new();
        let err = compute_timeline_view(&store, &Selection::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DatasetNotLoaded));
        assert!(compute_map_snapshot(&store, &MapOptions::default()).is_err());

        store.install(two_entities());
        let view = compute_timeline_view(&store, &Selection::default()).unwrap();
        assert_eq!(view.series.len(), 2);
    }

    // -------------------------------------------------------------------------
    // Progression
    // -------------------------------------------------------------------------

    #[test]
    fn test_progression_top_limit_by_metric() {
        let ds = world();
        let sel = Selection::default().limit(2);
        let options = ProgressionOptions {
            metric: Metric::Deaths,
            ..ProgressionOptions::default()
        };
        let view = ProgressionView::build(&ds, &sel, &options);
        // Deaths at day 3: Italy 90, France 40, Hubei 26
        assert_eq!(view.order, vec!["Italy", "France"]);
        assert!(view.curves.iter().all(|c| c.row.label() != "US"));
        assert_eq!(view.curves.len(), 8);
        assert_eq!(view.curves[0].value.value(), Some(0.0));
    }

    #[test]
    fn test_progression_per_capita_and_percent() {
        let ds = two_entities();
        let mut sel = Selection::default();
        sel.per_capita = true;
        let options = ProgressionOptions {
            percent: true,
            ..ProgressionOptions::default()
        };
        let view = ProgressionView::build(&ds, &sel, &options);
        let a: Vec<Option<f64>> = view
            .curves
            .iter()
            .filter(|c| c.row.label() == "A")
            .map(|c| c.value.value())
            .collect();
        // Rate 0.1 then 0.2
        assert_eq!(a[0], None);
        assert!((a[1].unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_progression_percent_from_selection() {
        let ds = two_entities();
        let mut sel = Selection::default();
        sel.percent_change = true;
        let view = ProgressionView::build(&ds, &sel, &ProgressionOptions::default());
        assert!(view.options.percent);

        let b: Vec<Option<f64>> = view
            .curves
            .iter()
            .filter(|c| c.row.label() == "B")
            .map(|c| c.value.value())
            .collect();
        // Cases 3 then 3
        assert_eq!(b, vec![None, Some(0.0)]);
    }

    #[test]
    fn test_progression_log_scale_hides_non_positive() {
        let ds = world();
        let sel = Selection::default().with(Dimension::Country, "US");
        let options = ProgressionOptions {
            log_scale: true,
            ..ProgressionOptions::default()
        };
        let view = ProgressionView::build(&ds, &sel, &options);
        let values: Vec<Option<f64>> = view.curves.iter().map(|c| c.value.value()).collect();
        assert_eq!(values, vec![None, Some(10.0), Some(2000.0), Some(2000.0)]);
    }

    #[test]
    fn test_progression_devtime_and_reference_points() {
        let ds = world();
        let options = ProgressionOptions {
            devtime: true,
            ..ProgressionOptions::default()
        };
        let view = ProgressionView::build(&ds, &Selection::default(), &options);
        assert!(view.curves.iter().all(|c| c.row.devt_time.map_or(false, |t| t >= 0)));

        let italy = view
            .reference_points
            .iter()
            .find(|p| p.entity == "Italy")
            .unwrap();
        let first = italy.first_case.unwrap();
        assert_eq!(first.date, day(0));
        assert_eq!(first.confirmed_cases, 10);
        let t0 = italy.t0.unwrap();
        assert_eq!(t0.date, day(1));
        assert_eq!(t0.case_capita.value(), Some(5.0));

        let us = view.reference_points.iter().find(|p| p.entity == "US").unwrap();
        assert_eq!(us.first_case.unwrap().date, day(1));
    }

    // -------------------------------------------------------------------------
    // Map
    // -------------------------------------------------------------------------

    #[test]
    fn test_map_snapshot_headline() {
        let ds = world();
        let options = MapOptions {
            date: Some(day(2)),
            ..MapOptions::default()
        };
        let map = MapSnapshot::build(&ds, &options);

        assert_eq!(map.date, day(2));
        assert_eq!(map.rows.len(), 5);
        // Cases day 2 = 300 + 700 + 2000 + 500 + 2, day 1 = 50 + 300 + 10 + 400 + 1
        assert_eq!(map.headline.total, 3502);
        assert_eq!(map.headline.previous_total, 761);
        let variance = map.headline.day_over_day_variance.value().unwrap();
        assert!((variance - (3502.0 / 761.0 - 1.0)).abs() < 1e-12);
        assert_eq!(map.headline.label, "3.5K");
        assert_eq!(map.summary.deaths.metric, Metric::Deaths);
        assert_eq!(map.scale_max.value(), Some(2000.0));
    }

    #[test]
    fn test_map_date_clamped() {
        let ds = world();
        let early = MapSnapshot::build(
            &ds,
            &MapOptions {
                date: Some(day(-30)),
                ..MapOptions::default()
            },
        );
        assert_eq!(early.date, ds.begin_date());
        let late = MapSnapshot::build(
            &ds,
            &MapOptions {
                date: Some(day(30)),
                ..MapOptions::default()
            },
        );
        assert_eq!(late.date, ds.end_date());
        assert_eq!(MapSnapshot::build(&ds, &MapOptions::default()).date, ds.end_date());
    }

    #[test]
    fn test_map_small_population_and_rates() {
        let ds = world();
        let options = MapOptions {
            metric: Metric::Deaths,
            per_capita: true,
            date: Some(day(1)),
            exclude_small_population: true,
        };
        let map = MapSnapshot::build(&ds, &options);
        assert_eq!(map.rows.len(), 4);
        assert!(map.rows.iter().all(|r| r.observation.country != "Monaco"));

        let france = map
            .rows
            .iter()
            .find(|r| r.observation.country == "France")
            .unwrap();
        assert_eq!(france.value.value(), Some(0.1));
        let us = map.rows.iter().find(|r| r.observation.country == "US").unwrap();
        assert_eq!(us.value.value(), Some(0.0));
    }

    #[test]
    fn test_map_zero_previous_is_undefined() {
        let ds = two_entities();
        let map = MapSnapshot::build(
            &ds,
            &MapOptions {
                metric: Metric::Deaths,
                ..MapOptions::default()
            },
        );
        assert_eq!(map.headline.total, 0);
        assert!(map.headline.day_over_day_variance.is_undefined());
        assert!(map.headline.rate.value() == Some(0.0));
    }

    #[test]
    fn test_human_format() {
        assert_eq!(human_format(999.0), "999.0");
        assert_eq!(human_format(1500.0), "1.5K");
        assert_eq!(human_format(2_340_000.0), "2.3M");
        assert_eq!(human_format(-12_000.0), "-12.0K");
        assert_eq!(human_format(f64::NAN), "");
    }
}
