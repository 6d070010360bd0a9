//! banter server library logic.
//!
//! Wires the message log, the reply pipeline, and the transcription adapter
//! behind the HTTP surface: submit a turn, poll for messages, replay
//! history, push out-of-band replies, and fetch synthesized audio.

pub mod api;
pub mod api_turns;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use banter_db::DbPool;
use banter_log::StoreError;
use banter_pipeline::{Pipeline, PipelineError};
use banter_voice::Transcriber;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Maximum request body size (256 KiB) for JSON endpoints.
const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

/// Maximum audio upload size (50 MiB) for the transcription endpoint.
const MAX_AUDIO_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Handle to the reply pipeline worker.
    pub pipeline: Pipeline,
    /// Speech-to-text adapter.
    pub transcriber: Arc<dyn Transcriber>,
    /// Directory of synthesized audio artifacts, served under `/audio/`.
    pub audio_dir: String,
}

/// Maps a [`StoreError`] to the HTTP status a handler should return,
/// logging non-client errors.
///
/// `InvalidCursor` is handled separately by the poll endpoint; everywhere
/// else it means a malformed request.
pub(crate) fn store_err_to_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::InvalidCursor(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Unavailable(err) => {
            tracing::error!(error = %err, "message store unavailable");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Maps a [`PipelineError`] from the submission path to an HTTP status.
pub(crate) fn pipeline_err_to_status(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::Busy | PipelineError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Store(err) => store_err_to_status(err),
        PipelineError::StoreUnavailable(reason) => {
            tracing::error!(reason = %reason, "message store unavailable");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // The transcription endpoint takes raw recordings, so it gets a much
    // larger body limit than the JSON routes.
    let audio_upload_routes = Router::new()
        .route("/api/transcribe", post(api_turns::transcribe_handler))
        .layer(DefaultBodyLimit::max(MAX_AUDIO_UPLOAD_BYTES));

    let audio_dir = state.audio_dir.clone();

    Router::new()
        .route("/health", get(health))
        .route("/api/speak", post(api_turns::speak_handler))
        .route("/api/respond", post(api_turns::respond_handler))
        .route("/api/delivered/{id}", post(api_turns::delivered_handler))
        .route("/api/poll", get(api::poll_handler))
        .route("/api/history", get(api::history_handler))
        .route("/api/debug/messages", get(api::debug_messages_handler))
        .merge(audio_upload_routes)
        .nest_service("/audio", ServeDir::new(audio_dir))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
