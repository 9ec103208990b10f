//! Error types for the curves pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`CsvError`] - Dataset file reading and parsing errors
//! - [`DatasetError`] - Dataset construction errors
//! - [`PipelineError`] - Request-level errors returned by the view entry points
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries. Numeric edge cases
//! (division by zero and the like) are never errors: they surface as
//! [`crate::models::Ratio::UNDEFINED`].

use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors while reading the dataset file.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the file content.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Malformed CSV record.
    #[error("Invalid CSV format: {0}")]
    ParseError(#[from] csv::Error),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// A required column is missing from the header.
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// A cell could not be parsed.
    #[error("Line {line}, column '{column}' (value '{value}'): {message}")]
    InvalidValue {
        line: usize,
        column: String,
        value: String,
        message: String,
    },
}

impl CsvError {
    pub fn invalid_value(
        line: usize,
        column: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            line,
            column: column.into(),
            value: value.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Dataset Errors
// =============================================================================

/// Errors while building the dataset store.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Underlying file error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// No observation rows.
    #[error("Dataset has no observations")]
    Empty,
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Request-level failures: the request could not produce any output.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No dataset has been loaded into the store.
    #[error("Dataset not loaded")]
    DatasetNotLoaded,

    /// Dataset error.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

impl From<CsvError> for PipelineError {
    fn from(err: CsvError) -> Self {
        PipelineError::Dataset(DatasetError::Csv(err))
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Malformed request body.
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for dataset construction.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
