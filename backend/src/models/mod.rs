//! Domain models for the curves pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`Observation`] - One loaded row: a geographic entity on a given day
//! - [`Dimension`] - Geographic hierarchy level used for filtering and splitting
//! - [`Metric`] - One of the four counted measures
//! - [`Measures`] - The four counts carried together
//! - [`Ratio`] - A division result that may be explicitly undefined
//! - [`Selection`] - The request coming from the control surface
//! - [`AggregatedRow`] - One (category, date) row of a derived view

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

// =============================================================================
// Geographic dimensions
// =============================================================================

/// Level of the geographic hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Region,
    Subregion,
    Country,
    /// Finest level; defaults to the country where no sub-national data exists.
    CountryArea,
}

impl Dimension {
    /// All dimensions, coarsest first.
    pub const ALL: [Dimension; 4] = [
        Dimension::Region,
        Dimension::Subregion,
        Dimension::Country,
        Dimension::CountryArea,
    ];

    /// Column name in the input dataset.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Subregion => "subregion",
            Self::Country => "country",
            Self::CountryArea => "country_area",
        }
    }

    /// Value of this dimension for an observation.
    pub fn value_of<'a>(&self, observation: &'a Observation) -> &'a str {
        match self {
            Self::Region => &observation.region,
            Self::Subregion => &observation.subregion,
            Self::Country => &observation.country,
            Self::CountryArea => &observation.country_area,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "region" => Ok(Self::Region),
            "subregion" | "sub_region" => Ok(Self::Subregion),
            "country" => Ok(Self::Country),
            "country_area" | "area" => Ok(Self::CountryArea),
            other => Err(format!("unknown dimension '{}'", other)),
        }
    }
}

// =============================================================================
// Metrics and measures
// =============================================================================

/// One of the counted measures of an observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    ConfirmedCases,
    Deaths,
    Recovered,
    Active,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::ConfirmedCases,
        Metric::Deaths,
        Metric::Recovered,
        Metric::Active,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Self::ConfirmedCases => "confirmed_cases",
            Self::Deaths => "deaths",
            Self::Recovered => "recovered",
            Self::Active => "active",
        }
    }

    /// Rate of this metric: per capita (millions) for confirmed cases,
    /// share of confirmed cases for everything else.
    pub fn rate(&self, measures: &Measures, population: f64) -> Ratio {
        match self {
            Self::ConfirmedCases => Ratio::of(measures.confirmed_cases as f64, population),
            other => Ratio::of(
                measures.get(*other) as f64,
                measures.confirmed_cases as f64,
            ),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "confirmed_cases" | "cases" | "confirmed" => Ok(Self::ConfirmedCases),
            "deaths" => Ok(Self::Deaths),
            "recovered" => Ok(Self::Recovered),
            "active" => Ok(Self::Active),
            other => Err(format!("unknown metric '{}'", other)),
        }
    }
}

/// The four counted measures, summed together.
///
/// Signed so that day-over-day differences of corrected series can go negative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Measures {
    pub confirmed_cases: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub active: i64,
}

impl Measures {
    pub fn new(confirmed_cases: i64, deaths: i64, recovered: i64, active: i64) -> Self {
        Self {
            confirmed_cases,
            deaths,
            recovered,
            active,
        }
    }

    pub fn get(&self, metric: Metric) -> i64 {
        match metric {
            Metric::ConfirmedCases => self.confirmed_cases,
            Metric::Deaths => self.deaths,
            Metric::Recovered => self.recovered,
            Metric::Active => self.active,
        }
    }
}

impl Add for Measures {
    type Output = Measures;

    fn add(self, rhs: Measures) -> Measures {
        Measures {
            confirmed_cases: self.confirmed_cases + rhs.confirmed_cases,
            deaths: self.deaths + rhs.deaths,
            recovered: self.recovered + rhs.recovered,
            active: self.active + rhs.active,
        }
    }
}

impl AddAssign for Measures {
    fn add_assign(&mut self, rhs: Measures) {
        *self = *self + rhs;
    }
}

impl Sub for Measures {
    type Output = Measures;

    fn sub(self, rhs: Measures) -> Measures {
        Measures {
            confirmed_cases: self.confirmed_cases - rhs.confirmed_cases,
            deaths: self.deaths - rhs.deaths,
            recovered: self.recovered - rhs.recovered,
            active: self.active - rhs.active,
        }
    }
}

// =============================================================================
// Ratio (undefined sentinel)
// =============================================================================

/// Result of a division that is undefined when the denominator is zero
/// or not finite. Serializes as a number or `null`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Ratio(Option<f64>);

impl Ratio {
    pub const UNDEFINED: Ratio = Ratio(None);

    /// `numerator / denominator`, undefined on zero or non-finite inputs.
    pub fn of(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
            return Self::UNDEFINED;
        }
        Self::defined(numerator / denominator)
    }

    /// Relative change from `previous` to `current`.
    pub fn percent_change(current: f64, previous: f64) -> Self {
        Self::of(current - previous, previous)
    }

    pub fn defined(value: f64) -> Self {
        if value.is_finite() {
            Self(Some(value))
        } else {
            Self::UNDEFINED
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.0
    }

    pub fn is_undefined(&self) -> bool {
        self.0.is_none()
    }

    /// Apply `f` to a defined value; undefined stays undefined.
    pub fn and_then(self, f: impl FnOnce(f64) -> Ratio) -> Ratio {
        match self.0 {
            Some(v) => f(v),
            None => Self::UNDEFINED,
        }
    }
}

impl From<Option<f64>> for Ratio {
    fn from(value: Option<f64>) -> Self {
        value.map(Ratio::defined).unwrap_or(Ratio::UNDEFINED)
    }
}

// =============================================================================
// Observation
// =============================================================================

/// One loaded row: a geographic entity on a given day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub region: String,
    pub subregion: String,
    pub country: String,
    pub country_area: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Population in millions.
    pub population: f64,
    pub confirmed_cases: u64,
    pub deaths: u64,
    pub recovered: u64,
    pub active: u64,
    /// Population meets the reporting threshold.
    pub pop_flag: bool,
}

impl Observation {
    pub fn measures(&self) -> Measures {
        Measures::new(
            self.confirmed_cases as i64,
            self.deaths as i64,
            self.recovered as i64,
            self.active as i64,
        )
    }
}

// =============================================================================
// Selection
// =============================================================================

/// A request coming from the control surface.
///
/// Empty dimension sets are unconstrained; the non-empty ones are combined
/// by union.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Selection {
    pub region: BTreeSet<String>,
    pub subregion: BTreeSet<String>,
    pub country: BTreeSet<String>,
    pub area: BTreeSet<String>,
    pub split: Option<Dimension>,
    /// `None` means no reduction. Non-positive or non-numeric input becomes `None`.
    #[serde(deserialize_with = "deserialize_top_limit")]
    pub top_limit: Option<usize>,
    pub increments: bool,
    pub per_capita: bool,
    pub devtime: bool,
    /// Plot the percent change along each progression curve.
    pub percent_change: bool,
    pub small_pop_exclude: bool,
}

impl Selection {
    /// Values chosen for a dimension.
    pub fn values(&self, dimension: Dimension) -> &BTreeSet<String> {
        match dimension {
            Dimension::Region => &self.region,
            Dimension::Subregion => &self.subregion,
            Dimension::Country => &self.country,
            Dimension::CountryArea => &self.area,
        }
    }

    pub fn values_mut(&mut self, dimension: Dimension) -> &mut BTreeSet<String> {
        match dimension {
            Dimension::Region => &mut self.region,
            Dimension::Subregion => &mut self.subregion,
            Dimension::Country => &mut self.country,
            Dimension::CountryArea => &mut self.area,
        }
    }

    /// True when no dimension constrains the selection (worldwide).
    pub fn is_unconstrained(&self) -> bool {
        Dimension::ALL.iter().all(|d| self.values(*d).is_empty())
    }

    /// Add a value to one dimension.
    pub fn with(mut self, dimension: Dimension, value: impl Into<String>) -> Self {
        self.values_mut(dimension).insert(value.into());
        self
    }

    pub fn split_by(mut self, dimension: Dimension) -> Self {
        self.split = Some(dimension);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.top_limit = normalize_top_limit(limit as f64);
        self
    }
}

/// Normalize a raw limit: non-positive or non-finite means no limit.
pub fn normalize_top_limit(raw: f64) -> Option<usize> {
    if raw.is_finite() && raw >= 1.0 {
        Some(raw.trunc() as usize)
    } else {
        None
    }
}

/// Parse a limit typed into a text field; anything non-numeric means no limit.
pub fn parse_top_limit(raw: &str) -> Option<usize> {
    raw.trim().parse::<f64>().ok().and_then(normalize_top_limit)
}

fn deserialize_top_limit<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().and_then(normalize_top_limit),
        Some(serde_json::Value::String(s)) => parse_top_limit(&s),
        _ => None,
    })
}

// =============================================================================
// Aggregated rows
// =============================================================================

/// Per-capita and share-of-cases rates (level mode).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct LevelRates {
    /// Confirmed cases per million population.
    pub case_capita: Ratio,
    pub deaths_rate: Ratio,
    pub recovered_rate: Ratio,
    pub active_rate: Ratio,
}

impl LevelRates {
    pub fn compute(totals: &Measures, population: f64) -> Self {
        let cases = totals.confirmed_cases as f64;
        Self {
            case_capita: Ratio::of(cases, population),
            deaths_rate: Ratio::of(totals.deaths as f64, cases),
            recovered_rate: Ratio::of(totals.recovered as f64, cases),
            active_rate: Ratio::of(totals.active as f64, cases),
        }
    }

    pub fn get(&self, metric: Metric) -> Ratio {
        match metric {
            Metric::ConfirmedCases => self.case_capita,
            Metric::Deaths => self.deaths_rate,
            Metric::Recovered => self.recovered_rate,
            Metric::Active => self.active_rate,
        }
    }
}

/// Percent change of each daily increment relative to the prior day's increment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PercentChange {
    pub confirmed_cases: Ratio,
    pub deaths: Ratio,
    pub recovered: Ratio,
    pub active: Ratio,
}

impl PercentChange {
    pub fn between(current: &Measures, previous: &Measures) -> Self {
        let pct = |metric: Metric| {
            Ratio::percent_change(current.get(metric) as f64, previous.get(metric) as f64)
        };
        Self {
            confirmed_cases: pct(Metric::ConfirmedCases),
            deaths: pct(Metric::Deaths),
            recovered: pct(Metric::Recovered),
            active: pct(Metric::Active),
        }
    }

    pub fn get(&self, metric: Metric) -> Ratio {
        match metric {
            Metric::ConfirmedCases => self.confirmed_cases,
            Metric::Deaths => self.deaths,
            Metric::Recovered => self.recovered,
            Metric::Active => self.active,
        }
    }
}

/// Derived fields of an aggregated row, one variant per measurement mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Derived {
    Level {
        #[serde(flatten)]
        rates: LevelRates,
    },
    Increment {
        increments: Measures,
        percent_change: PercentChange,
    },
}

/// One (category, date) row of a derived view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedRow {
    /// Split category; `None` for an ungrouped series.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub split: Option<String>,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: Measures,
    /// Summed population in millions.
    pub population: f64,
    /// Days since the category's development-time origin.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub devt_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub derived: Option<Derived>,
}

impl AggregatedRow {
    pub fn new(split: Option<String>, date: NaiveDate, totals: Measures, population: f64) -> Self {
        Self {
            split,
            date,
            totals,
            population,
            devt_time: None,
            derived: None,
        }
    }

    /// Split label, or the empty string for an ungrouped series.
    pub fn label(&self) -> &str {
        self.split.as_deref().unwrap_or("")
    }

    pub fn level_rates(&self) -> LevelRates {
        match self.derived {
            Some(Derived::Level { rates }) => rates,
            _ => LevelRates::compute(&self.totals, self.population),
        }
    }

    pub fn increments(&self) -> Option<&Measures> {
        match &self.derived {
            Some(Derived::Increment { increments, .. }) => Some(increments),
            _ => None,
        }
    }

    pub fn percent_change(&self) -> Option<&PercentChange> {
        match &self.derived {
            Some(Derived::Increment { percent_change, .. }) => Some(percent_change),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
