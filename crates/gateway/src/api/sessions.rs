//! Session management endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::api::session_error;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let id = state.sessions.create_session();
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "session_id": id })),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions, GET /v1/sessions/stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

pub async fn session_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sessions.stats())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Full snapshot, transcript included.  Waits for a running turn to finish.
pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.get_session(&id).await {
        Ok(session) => Json(serde_json::json!({
            "session_id": session.id,
            "created_at": session.created_at,
            "last_active_at": session.last_active_at,
            "message_count": session.message_count(),
            "tool_call_count": session.tool_call_count(),
            "touched_paths": session.touched,
            "transcript": session.transcript,
        }))
        .into_response(),
        Err(e) => session_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/:id/clear, DELETE /v1/sessions/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn clear_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.clear_session(&id).await {
        Ok(dropped) => Json(serde_json::json!({
            "session_id": id,
            "cleared": true,
            "entries_dropped": dropped,
        }))
        .into_response(),
        Err(e) => session_error(e),
    }
}

/// Removes the session only; memory files are kept.
pub async fn destroy_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.destroy_session(&id) {
        Ok(()) => Json(serde_json::json!({ "session_id": id, "deleted": true })).into_response(),
        Err(e) => session_error(e),
    }
}
