//! Read-side handlers: the polling protocol, history replay, and the debug
//! dump.
//!
//! The poll endpoint is stateless beyond the store — no per-client session
//! state exists, so reconnecting clients simply resume from their last known
//! id. Idempotence and monotonicity come directly from the store contract:
//! rows are immutable and `read_since` returns exactly the rows past the
//! cursor, in id order.

use crate::{store_err_to_status, AppState};
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Json,
};
use banter_log::{read_recent, read_since, StoreError};
use banter_types::{Message, PollBatch};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Default number of rows returned by a history bootstrap.
const DEFAULT_HISTORY_LIMIT: u32 = 20;

/// Rows returned by the debug dump.
const DEBUG_DUMP_LIMIT: u32 = 50;

#[derive(Deserialize)]
pub struct PollParams {
    /// Highest id the caller has already consumed. Absent means bootstrap
    /// from the beginning.
    pub since: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
}

/// GET /api/poll?since=N
///
/// Returns every message with `id > since` present at poll time (bounded
/// batch, ascending), plus the cursor to poll from next. A cursor the store
/// never issued gets 409 and `{"error": "invalid_cursor"}`; the client
/// falls back to `/api/history`, it is not a crash.
pub async fn poll_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<PollParams>,
) -> Result<Json<PollBatch>, (StatusCode, Json<Value>)> {
    let since = params.since.unwrap_or(0);
    let limit = params.limit;
    let pool = state.pool.clone();

    let messages = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| {
            tracing::error!(error = %e, "failed to get db connection for poll");
            internal_error()
        })?;
        read_since(&conn, since, limit).map_err(|e| match e {
            StoreError::InvalidCursor(cursor) => (
                StatusCode::CONFLICT,
                Json(json!({"error": "invalid_cursor", "cursor": cursor})),
            ),
            ref other => {
                tracing::error!(error = %other, "poll read failed");
                internal_error()
            }
        })
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "poll task join error");
        internal_error()
    })??;

    Ok(Json(PollBatch::new(messages, since)))
}

/// GET /api/history?limit=K
///
/// Bootstrap read: the most recent K messages in ascending id order. A
/// client with no cursor replays this, then polls forward from the last id.
pub async fn history_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let pool = state.pool.clone();

    let messages = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| {
            tracing::error!(error = %e, "failed to get db connection for history");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        read_recent(&conn, limit).map_err(|e| store_err_to_status(&e))
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "history task join error");
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(messages))
}

/// A raw store row, including the bookkeeping column the protocol hides.
#[derive(Serialize)]
pub struct DebugRow {
    pub id: i64,
    pub created_at: String,
    pub direction: String,
    pub text: String,
    pub audio_ref: Option<String>,
    pub delivered: bool,
}

fn map_debug_row(row: &Row) -> rusqlite::Result<DebugRow> {
    Ok(DebugRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        direction: row.get(2)?,
        text: row.get(3)?,
        audio_ref: row.get(4)?,
        delivered: row.get::<_, i64>(5)? != 0,
    })
}

/// GET /api/debug/messages
///
/// Raw dump of the newest rows, delivered flag included. Observability
/// convenience only; nothing in the protocol depends on this endpoint.
pub async fn debug_messages_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<DebugRow>>, StatusCode> {
    let pool = state.pool.clone();

    let rows = tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, created_at, direction, text, audio_ref, delivered
                 FROM messages ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mapped = stmt
            .query_map([DEBUG_DUMP_LIMIT], map_debug_row)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?);
        }
        Ok::<_, StatusCode>(rows)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(rows))
}

fn internal_error() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "store_unavailable"})),
    )
}
