//! Consistency checks for a loaded time series.
//!
//! The pipeline relies on a few properties of the input table:
//!
//! - `population` is constant for a given `country_area`
//! - each entity has one row per day, contiguous from the global first
//!   date to the global last date
//! - `active` never exceeds `confirmed_cases`
//!
//! Violations are reported, not rejected: the loader logs them as
//! warnings and the `validate` command prints them.
//!
//! # Example
//!
//! ```rust,ignore
//! use curves::validation::validate_dataset;
//!
//! let report = validate_dataset(&observations);
//! for issue in &report.issues {
//!     eprintln!("{}", issue);
//! }
//! ```

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::Observation;

/// Maximum number of issues kept per check.
const MAX_ISSUES_PER_CHECK: usize = 20;

/// Outcome of [`validate_dataset`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Number of observations checked.
    pub rows: usize,
    /// Number of distinct `country_area` entities.
    pub entities: usize,
    /// Human-readable issues.
    pub issues: Vec<String>,
    /// Issues found but not listed.
    pub truncated: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, counter: &mut usize, issue: String) {
        *counter += 1;
        if *counter <= MAX_ISSUES_PER_CHECK {
            self.issues.push(issue);
        } else {
            self.truncated += 1;
        }
    }
}

/// Check the invariants the pipeline relies on.
pub fn validate_dataset(observations: &[Observation]) -> ValidationReport {
    let mut report = ValidationReport {
        rows: observations.len(),
        ..ValidationReport::default()
    };

    let (first, last) = match date_bounds(observations) {
        Some(bounds) => bounds,
        None => return report,
    };
    let expected_days = (last - first).num_days() + 1;

    let mut by_entity: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        by_entity.entry(obs.country_area.as_str()).or_default().push(obs);
    }
    report.entities = by_entity.len();

    let mut population_issues = 0;
    let mut coverage_issues = 0;
    let mut duplicate_issues = 0;
    let mut active_issues = 0;

    for (entity, rows) in by_entity.iter_mut() {
        rows.sort_by_key(|o| o.date);

        let population = rows[0].population;
        if rows.iter().any(|o| o.population != population) {
            report.push(
                &mut population_issues,
                format!("{}: population is not constant across dates", entity),
            );
        }

        let duplicates = rows.windows(2).filter(|w| w[0].date == w[1].date).count();
        if duplicates > 0 {
            report.push(
                &mut duplicate_issues,
                format!("{}: {} duplicate date(s)", entity, duplicates),
            );
        }

        let distinct_days = rows.len() - duplicates;
        let gaps = rows
            .windows(2)
            .any(|w| (w[1].date - w[0].date).num_days() > 1);
        if rows[0].date != first
            || rows[rows.len() - 1].date != last
            || gaps
            || distinct_days as i64 != expected_days
        {
            report.push(
                &mut coverage_issues,
                format!(
                    "{}: dates do not cover {} to {} contiguously ({} of {} days)",
                    entity, first, last, distinct_days, expected_days
                ),
            );
        }

        for obs in rows.iter().filter(|o| o.active > o.confirmed_cases) {
            report.push(
                &mut active_issues,
                format!(
                    "{} on {}: active ({}) exceeds confirmed cases ({})",
                    entity, obs.date, obs.active, obs.confirmed_cases
                ),
            );
        }
    }

    report
}

fn date_bounds(observations: &[Observation]) -> Option<(NaiveDate, NaiveDate)> {
    let first = observations.iter().map(|o| o.date).min()?;
    let last = observations.iter().map(|o| o.date).max()?;
    Some((first, last))
}
