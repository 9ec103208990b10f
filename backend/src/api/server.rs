//! HTTP server for the curves API.
//!
//! The dataset is loaded once at startup and shared read-only between
//! handlers. If loading fails the server still starts and view endpoints
//! answer 503.
//!
//! # API Endpoints
//!
//! | Method | Path               | Description                       |
//! |--------|--------------------|-----------------------------------|
//! | GET    | `/health`          | Health check                      |
//! | GET    | `/api/dataset`     | Date range, options and counts    |
//! | POST   | `/api/timeline`    | Timeline view for a selection     |
//! | POST   | `/api/progression` | Progression curves                |
//! | POST   | `/api/map`         | Map snapshot                      |
//! | GET    | `/api/logs`        | SSE stream for real-time logs     |

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, status_code, MapRequest, ProgressionRequest, ViewResponse};
use crate::config::Config;
use crate::dataset::{DatasetStore, DatasetSummary};
use crate::error::ServerError;
use crate::models::Selection;
use crate::transform::pipeline::{
    compute_map_snapshot, compute_progression_view, compute_timeline_view, MapSnapshot,
    ProgressionView, TimelineView,
};

/// Shared handler state.
pub type AppState = Arc<DatasetStore>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        log_error(self.to_string());
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

/// Build the router around a dataset store.
pub fn router(state: AppState) -> Router {
    // Permissive CORS for the dashboard dev server
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/dataset", get(dataset_summary))
        .route("/api/timeline", post(timeline))
        .route("/api/progression", post(progression))
        .route("/api/map", post(map))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Load the dataset and start the HTTP server
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(DatasetStore::new());

    let loader = Arc::clone(&store);
    let load_config = config.clone();
    let loaded = tokio::task::spawn_blocking(move || {
        loader.load(&load_config.data_path, &load_config.dataset)
    })
    .await?;
    if let Err(e) = loaded {
        log_error(format!("Dataset unavailable, view endpoints will answer 503: {}", e));
    }

    let app = router(store);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    println!("🚀 Curves server running on http://localhost:{}", config.port);
    println!("   GET  /api/dataset     - Dataset summary");
    println!("   POST /api/timeline    - Timeline view");
    println!("   POST /api/progression - Progression view");
    println!("   POST /api/map         - Map snapshot");
    println!("   GET  /api/logs        - SSE log stream");
    println!("   GET  /health          - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health(State(store): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "curves",
        "version": env!("CARGO_PKG_VERSION"),
        "dataset_loaded": store.is_loaded(),
        "endpoints": {
            "dataset": "GET /api/dataset",
            "timeline": "POST /api/timeline",
            "progression": "POST /api/progression",
            "map": "POST /api/map",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        // Lagged receivers skip what they missed
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn dataset_summary(
    State(store): State<AppState>,
) -> Result<Json<DatasetSummary>, ServerError> {
    let dataset = store.get()?;
    Ok(Json(dataset.summary()))
}

async fn timeline(
    State(store): State<AppState>,
    payload: Result<Json<Selection>, JsonRejection>,
) -> Result<Json<ViewResponse<TimelineView>>, ServerError> {
    let Json(selection) = payload?;
    log_info(format!("📈 Timeline request (split: {:?})", selection.split));
    let view = compute_timeline_view(&store, &selection)?;
    let empty = view.series.is_empty();
    Ok(Json(ViewResponse::new(view, empty)))
}

async fn progression(
    State(store): State<AppState>,
    payload: Result<Json<ProgressionRequest>, JsonRejection>,
) -> Result<Json<ViewResponse<ProgressionView>>, ServerError> {
    let Json(request) = payload?;
    log_info(format!("📉 Progression request ({})", request.options.metric));
    let view = compute_progression_view(&store, &request.selection, &request.options)?;
    let empty = view.curves.is_empty();
    Ok(Json(ViewResponse::new(view, empty)))
}

async fn map(
    State(store): State<AppState>,
    payload: Result<Json<MapRequest>, JsonRejection>,
) -> Result<Json<ViewResponse<MapSnapshot>>, ServerError> {
    let Json(request) = payload?;
    log_info(format!("🗺️  Map request ({})", request.metric));
    let view = compute_map_snapshot(&store, &request)?;
    let empty = view.rows.is_empty();
    Ok(Json(ViewResponse::new(view, empty)))
}
