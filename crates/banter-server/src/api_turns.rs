//! Write-side handlers: submit turns, transcribe audio, push out-of-band
//! replies, and the delivered bookkeeping marker.

use crate::{pipeline_err_to_status, store_err_to_status, AppState};
use axum::{
    extract::{Extension, Multipart, Path},
    http::StatusCode,
    response::Json,
};
use banter_log::mark_delivered;
use banter_voice::VoiceError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Maximum length for submitted turn text.
const MAX_TURN_TEXT_BYTES: usize = 8 * 1024;

#[derive(Deserialize)]
pub struct SpeakRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct SpeakResponse {
    pub message_id: i64,
}

/// POST /api/speak
///
/// Submits a transcribed user turn. Returns as soon as the inbound row is
/// durable; the reply arrives later through polling. 503 means the
/// pipeline queue is full and the client should retry shortly.
pub async fn speak_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SpeakRequest>,
) -> Result<Json<SpeakResponse>, StatusCode> {
    let text = payload.text.trim();
    if text.is_empty() || text.len() > MAX_TURN_TEXT_BYTES {
        return Err(StatusCode::BAD_REQUEST);
    }

    let message_id = state
        .pipeline
        .submit_turn(text)
        .await
        .map_err(|e| pipeline_err_to_status(&e))?;

    Ok(Json(SpeakResponse { message_id }))
}

/// POST /api/respond
///
/// Pushes an externally generated reply, bypassing the agent call. The
/// reply is queued behind any in-flight turns (commit order is preserved)
/// and becomes visible through polling, so the response is an ack, not the
/// committed row.
pub async fn respond_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SpeakRequest>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let text = payload.text.trim();
    if text.is_empty() || text.len() > MAX_TURN_TEXT_BYTES {
        return Err(StatusCode::BAD_REQUEST);
    }

    state
        .pipeline
        .push_reply(text)
        .await
        .map_err(|e| pipeline_err_to_status(&e))?;

    Ok((StatusCode::ACCEPTED, Json(json!({"status": "accepted"}))))
}

/// POST /api/transcribe
///
/// Transcription only: accepts a multipart recording under the `audio`
/// field and returns the transcript. Clients that buffer speech before
/// sending call this repeatedly, then submit the combined text via
/// `/api/speak`.
pub async fn transcribe_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    let mut audio: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        if field.name() == Some("audio") {
            let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            audio = Some(bytes.to_vec());
            break;
        }
    }

    let audio = audio.filter(|a| !a.is_empty()).ok_or(StatusCode::BAD_REQUEST)?;

    let transcript = state.transcriber.transcribe(&audio).await.map_err(|e| {
        match e {
            VoiceError::Transcription(ref reason) => {
                tracing::warn!(reason = %reason, "transcription failed");
            }
            ref other => {
                tracing::error!(error = %other, "unexpected transcription error");
            }
        }
        StatusCode::BAD_GATEWAY
    })?;

    Ok(Json(json!({"transcript": transcript})))
}

/// POST /api/delivered/{id}
///
/// Marks a message as played on the reading side. Bookkeeping only; the
/// polling protocol never depends on it.
pub async fn delivered_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, StatusCode> {
    let pool = state.pool.clone();

    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| {
            tracing::error!(error = %e, "failed to get db connection for delivered");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        mark_delivered(&conn, id).map_err(|e| store_err_to_status(&e))
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "delivered task join error");
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(json!({"ok": true})))
}
