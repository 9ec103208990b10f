//! The loaded dataset, enriched once and read-only afterwards.
//!
//! [`Dataset::from_observations`] is a pure transform from parsed rows to
//! [`Record`]s carrying per-row rates and development-time offsets, plus
//! the lookup structures the pipeline needs:
//!
//! - per-dimension value indices for the filter engine
//! - the date range (`begin_date` skips the first day, which only serves
//!   as the increment baseline)
//! - the per-entity [`DevTimeTable`]
//! - sorted option lists for the control surface
//!
//! [`DatasetStore`] holds the shared instance for the process lifetime.

pub mod devtime;

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use crate::api::logs::{log_info, log_success, log_warning};
use crate::config::DatasetConfig;
use crate::error::{DatasetError, DatasetResult, PipelineError, PipelineResult};
use crate::models::{Dimension, LevelRates, Observation};
use crate::parser::parse_csv_file_auto;
use crate::validation::validate_dataset;

pub use devtime::{DevTimeRecord, DevTimeTable};

/// One observation with its load-time derived columns.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Record {
    #[serde(flatten)]
    pub observation: Observation,
    /// `case_capita` is `confirmed_cases / population`; the others are
    /// shares of `confirmed_cases`.
    pub rates: LevelRates,
    /// Days since the entity's development-time origin.
    pub devt_time: Option<i64>,
}

/// Sorted distinct values of each dimension.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct DimensionOptions {
    pub region: Vec<String>,
    pub subregion: Vec<String>,
    pub country: Vec<String>,
    /// Only the `country_area` values that differ from their country.
    pub area: Vec<String>,
}

/// Overview of a loaded dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub entities: usize,
    pub first_date: NaiveDate,
    pub begin_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i64,
    pub devtime_threshold: f64,
    pub entities_with_t0: usize,
    pub small_population_entities: usize,
    pub options: DimensionOptions,
}

/// Immutable enriched table.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<Record>,
    first_date: NaiveDate,
    begin_date: NaiveDate,
    end_date: NaiveDate,
    indices: BTreeMap<Dimension, BTreeMap<String, Vec<usize>>>,
    options: DimensionOptions,
    devtime: DevTimeTable,
    config: DatasetConfig,
}

impl Dataset {
    /// Enrich parsed observations.
    ///
    /// Rows are reordered by (`country_area`, `date`); row indices refer to
    /// that order.
    pub fn from_observations(
        mut observations: Vec<Observation>,
        config: &DatasetConfig,
    ) -> DatasetResult<Self> {
        if observations.is_empty() {
            return Err(DatasetError::Empty);
        }

        observations.sort_by(|a, b| {
            a.country_area
                .cmp(&b.country_area)
                .then_with(|| a.date.cmp(&b.date))
        });

        let first_date = observations.iter().map(|o| o.date).min().ok_or(DatasetError::Empty)?;
        let end_date = observations.iter().map(|o| o.date).max().ok_or(DatasetError::Empty)?;
        let begin_date = first_date.succ_opt().unwrap_or(first_date);

        let devtime = DevTimeTable::build(&observations, config.devtime_threshold);

        let mut indices: BTreeMap<Dimension, BTreeMap<String, Vec<usize>>> = BTreeMap::new();
        let mut areas: BTreeSet<String> = BTreeSet::new();
        for (idx, obs) in observations.iter().enumerate() {
            for dimension in Dimension::ALL {
                indices
                    .entry(dimension)
                    .or_default()
                    .entry(dimension.value_of(obs).to_string())
                    .or_default()
                    .push(idx);
            }
            if obs.country_area != obs.country {
                areas.insert(obs.country_area.clone());
            }
        }

        let sorted_keys = |dimension: Dimension| -> Vec<String> {
            indices
                .get(&dimension)
                .map(|values| values.keys().cloned().collect())
                .unwrap_or_default()
        };
        let options = DimensionOptions {
            region: sorted_keys(Dimension::Region),
            subregion: sorted_keys(Dimension::Subregion),
            country: sorted_keys(Dimension::Country),
            area: areas.into_iter().collect(),
        };

        let records = observations
            .into_iter()
            .map(|observation| {
                let rates = LevelRates::compute(&observation.measures(), observation.population);
                let devt_time = devtime
                    .get(&observation.country_area)
                    .and_then(|r| r.devt_time(observation.date));
                Record {
                    observation,
                    rates,
                    devt_time,
                }
            })
            .collect();

        Ok(Self {
            records,
            first_date,
            begin_date,
            end_date,
            indices,
            options,
            devtime,
            config: *config,
        })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, idx: usize) -> Option<&Record> {
        self.records.get(idx)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Earliest date in the file; only used as the increment baseline.
    pub fn first_date(&self) -> NaiveDate {
        self.first_date
    }

    /// First selectable date.
    pub fn begin_date(&self) -> NaiveDate {
        self.begin_date
    }

    /// Maximum date; the anchor for rankings.
    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Span of the selectable range in days.
    pub fn days(&self) -> i64 {
        (self.end_date - self.begin_date).num_days().max(0)
    }

    /// Clamp a requested date into `[begin_date, end_date]`.
    pub fn clamp_date(&self, date: NaiveDate) -> NaiveDate {
        date.max(self.begin_date).min(self.end_date)
    }

    /// Indices of rows whose `dimension` column equals `value`.
    pub fn rows_matching(&self, dimension: Dimension, value: &str) -> &[usize] {
        self.indices
            .get(&dimension)
            .and_then(|values| values.get(value))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn options(&self) -> &DimensionOptions {
        &self.options
    }

    pub fn devtime(&self) -> &DevTimeTable {
        &self.devtime
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn entity_count(&self) -> usize {
        self.indices
            .get(&Dimension::CountryArea)
            .map_or(0, |values| values.len())
    }

    pub fn summary(&self) -> DatasetSummary {
        let small_population_entities = self
            .indices
            .get(&Dimension::CountryArea)
            .map_or(0, |values| {
                values
                    .values()
                    .filter(|rows| rows.iter().any(|i| !self.records[*i].observation.pop_flag))
                    .count()
            });

        DatasetSummary {
            rows: self.len(),
            entities: self.entity_count(),
            first_date: self.first_date,
            begin_date: self.begin_date,
            end_date: self.end_date,
            days: self.days(),
            devtime_threshold: self.devtime.threshold,
            entities_with_t0: self.devtime.crossed(),
            small_population_entities,
            options: self.options.clone(),
        }
    }
}

/// Parse, validate and enrich a dataset file.
pub fn load_dataset<P: AsRef<Path>>(path: P, config: &DatasetConfig) -> DatasetResult<Dataset> {
    log_info(format!("📖 Reading dataset {}...", path.as_ref().display()));
    let parsed = parse_csv_file_auto(path.as_ref(), config)?;
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows", parsed.observations.len()));
    if parsed.pop_flag_derived {
        log_warning(format!(
            "No pop_flag column, derived from population >= {} million",
            config.small_population_threshold
        ));
    }

    let report = validate_dataset(&parsed.observations);
    for issue in &report.issues {
        log_warning(issue.clone());
    }
    if report.truncated > 0 {
        log_warning(format!("... {} more issue(s)", report.truncated));
    }

    let dataset = Dataset::from_observations(parsed.observations, config)?;
    log_success(format!(
        "{} entities from {} to {}, {} crossed {} cases per million",
        dataset.entity_count(),
        dataset.first_date(),
        dataset.end_date(),
        dataset.devtime().crossed(),
        config.devtime_threshold
    ));
    Ok(dataset)
}

/// Format delimiter for display
fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

/// Load-once holder of the shared dataset.
#[derive(Debug, Default)]
pub struct DatasetStore {
    cell: OnceCell<Arc<Dataset>>,
}

impl DatasetStore {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Load from `path` unless a dataset is already present.
    pub fn load<P: AsRef<Path>>(
        &self,
        path: P,
        config: &DatasetConfig,
    ) -> PipelineResult<Arc<Dataset>> {
        let dataset = self
            .cell
            .get_or_try_init(|| load_dataset(path, config).map(Arc::new))?;
        Ok(Arc::clone(dataset))
    }

    /// Install an already built dataset; keeps the existing one if set.
    pub fn install(&self, dataset: Dataset) -> Arc<Dataset> {
        Arc::clone(self.cell.get_or_init(|| Arc::new(dataset)))
    }

    pub fn get(&self) -> PipelineResult<Arc<Dataset>> {
        self.cell.get().cloned().ok_or(PipelineError::DatasetNotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}
