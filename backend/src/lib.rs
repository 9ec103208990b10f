//! # Curves - epidemic time-series views
//!
//! Curves loads a daily epidemiological table (one row per geographic
//! entity and date) and derives the views behind an epidemic dashboard:
//! filtered and grouped series, per-capita rates and daily increments,
//! top-N categories with a `Rest` bucket, and curves aligned on
//! development time.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV File   │────▶│   Parser    │────▶│   Dataset   │────▶│  Transform  │────▶ views
//! │ (ISO/UTF8)  │     │ (auto-enc)  │     │ (rates, t0) │     │ (per query) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! The dataset is built once and never mutated; every request builds its
//! own rows on top of it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use curves::{compute_timeline_view, DatasetConfig, DatasetStore, Dimension, Selection};
//!
//! let store = DatasetStore::new();
//! store.load("data/covid.csv", &DatasetConfig::default())?;
//!
//! let selection = Selection::default().split_by(Dimension::Region).limit(3);
//! let view = compute_timeline_view(&store, &selection)?;
//! println!("{:?}", view.order);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Environment and default settings
//! - [`models`] - Domain models (Observation, Selection, AggregatedRow, Ratio)
//! - [`parser`] - CSV parsing with auto-detection
//! - [`validation`] - Dataset consistency checks
//! - [`dataset`] - Enriched dataset store and development-time table
//! - [`transform`] - Filter, aggregation, top-N, rates, order and views
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Loading
pub mod dataset;
pub mod parser;
pub mod validation;

// Transformation
pub mod transform;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CsvError, CsvResult, DatasetError, DatasetResult, PipelineError, PipelineResult, ServerError,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{Config, DatasetConfig};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AggregatedRow, Derived, Dimension, LevelRates, Measures, Metric, Observation, PercentChange,
    Ratio, Selection,
};

// =============================================================================
// Re-exports - Loading
// =============================================================================

pub use dataset::{
    load_dataset, Dataset, DatasetStore, DatasetSummary, DevTimeRecord, DevTimeTable,
    DimensionOptions, Record,
};
pub use parser::{parse_bytes_auto, parse_csv_file_auto, ParseResult};
pub use validation::{validate_dataset, ValidationReport};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    compute_map_snapshot, compute_progression_view, compute_timeline_view, human_format,
    MapOptions, MapSnapshot, ProgressionOptions, ProgressionView, TimelineView,
};
pub use transform::{aggregate, order, reduce, resolve, Grouping, Mode, RowSet, REST_LABEL};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
