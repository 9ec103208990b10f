//! Filter engine: resolve a [`Selection`] into a set of dataset rows.
//!
//! Each non-empty dimension set contributes the rows whose column value is
//! a member of that set, and the contributions are combined by **union**:
//!
//! ```text
//! region  = {Europe}   ->  rows of Europe
//! country = {US}       ->  rows of US
//!                          ---------------------
//! resolved             =   Europe ∪ US
//! ```
//!
//! With every set empty the selection is worldwide. A non-empty selection
//! whose values match nothing resolves to an explicitly empty set.

use std::collections::BTreeSet;

use crate::dataset::{Dataset, Record};
use crate::models::{Dimension, Selection};

/// Rows chosen by a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSet {
    /// No restriction.
    Worldwide,
    /// These dataset row indices, possibly none.
    Rows(BTreeSet<usize>),
}

impl RowSet {
    pub fn empty() -> Self {
        RowSet::Rows(BTreeSet::new())
    }

    /// Set union; worldwide absorbs everything.
    pub fn union(self, other: RowSet) -> RowSet {
        match (self, other) {
            (RowSet::Worldwide, _) | (_, RowSet::Worldwide) => RowSet::Worldwide,
            (RowSet::Rows(mut a), RowSet::Rows(b)) => {
                a.extend(b);
                RowSet::Rows(a)
            }
        }
    }

    pub fn contains(&self, idx: usize) -> bool {
        match self {
            RowSet::Worldwide => true,
            RowSet::Rows(rows) => rows.contains(&idx),
        }
    }

    pub fn is_worldwide(&self) -> bool {
        matches!(self, RowSet::Worldwide)
    }

    /// Number of rows this set covers in `dataset`.
    pub fn len(&self, dataset: &Dataset) -> usize {
        match self {
            RowSet::Worldwide => dataset.len(),
            RowSet::Rows(rows) => rows.len(),
        }
    }

    /// Resolved records, each at most once, in dataset order.
    pub fn records<'a>(&'a self, dataset: &'a Dataset) -> Vec<&'a Record> {
        match self {
            RowSet::Worldwide => dataset.records().iter().collect(),
            RowSet::Rows(rows) => rows.iter().filter_map(|i| dataset.record(*i)).collect(),
        }
    }

    /// Keep only the rows matching `keep`; the result is always explicit.
    pub fn restrict(self, dataset: &Dataset, keep: impl Fn(&Record) -> bool) -> RowSet {
        let rows = match self {
            RowSet::Worldwide => dataset
                .records()
                .iter()
                .enumerate()
                .filter(|(_, r)| keep(r))
                .map(|(i, _)| i)
                .collect(),
            RowSet::Rows(rows) => rows
                .into_iter()
                .filter(|i| dataset.record(*i).map_or(false, &keep))
                .collect(),
        };
        RowSet::Rows(rows)
    }
}

/// Rows whose `dimension` column is one of `values`.
pub fn dimension_rows(
    dataset: &Dataset,
    dimension: Dimension,
    values: &BTreeSet<String>,
) -> BTreeSet<usize> {
    values
        .iter()
        .flat_map(|value| dataset.rows_matching(dimension, value).iter().copied())
        .collect()
}

/// Union of every constrained dimension of `selection`.
pub fn resolve(dataset: &Dataset, selection: &Selection) -> RowSet {
    if selection.is_unconstrained() {
        return RowSet::Worldwide;
    }

    Dimension::ALL
        .iter()
        .filter(|d| !selection.values(**d).is_empty())
        .map(|d| RowSet::Rows(dimension_rows(dataset, *d, selection.values(*d))))
        .fold(RowSet::empty(), RowSet::union)
}

/// Drop rows of entities below the population reporting threshold.
pub fn exclude_small_population(dataset: &Dataset, rows: RowSet) -> RowSet {
    rows.restrict(dataset, |r| r.observation.pop_flag)
}

/// Resolve a selection and apply its small-population switch.
pub fn select(dataset: &Dataset, selection: &Selection) -> RowSet {
    let rows = resolve(dataset, selection);
    if selection.small_pop_exclude {
        exclude_small_population(dataset, rows)
    } else {
        rows
    }
}
