//! REST API types.
//!
//! Every view is wrapped in a [`ViewResponse`] envelope carrying a request
//! id. Failures use the same envelope shape through [`error_response`].

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{PipelineError, ServerError};
use crate::models::Selection;
use crate::transform::pipeline::{MapOptions, ProgressionOptions};

/// Envelope around a computed view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewResponse<T> {
    /// Unique request identifier
    pub request_id: String,

    /// Status: "ok" or "empty"
    pub status: String,

    pub view: T,
}

impl<T> ViewResponse<T> {
    /// Wrap a view; `empty` marks a selection that produced no rows.
    pub fn new(view: T, empty: bool) -> Self {
        ViewResponse {
            request_id: Uuid::new_v4().to_string(),
            status: if empty { "empty" } else { "ok" }.to_string(),
            view,
        }
    }
}

/// Body of `POST /api/progression`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProgressionRequest {
    pub selection: Selection,
    #[serde(flatten)]
    pub options: ProgressionOptions,
}

/// Body of `POST /api/map`.
pub type MapRequest = MapOptions;

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "request_id": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "view": null
    })
}

/// Status code for a server error.
pub fn status_code(err: &ServerError) -> StatusCode {
    match err {
        ServerError::Pipeline(PipelineError::DatasetNotLoaded) => StatusCode::SERVICE_UNAVAILABLE,
        ServerError::Pipeline(PipelineError::Dataset(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
    }
}
