pub mod auth;
pub mod chat;
pub mod health;
pub mod memory;
pub mod sessions;
pub mod tools;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;

use mv_domain::error::{SessionError, StoreError};

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the bearer-token middleware).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health::health));

    let protected = Router::new()
        // Conversation
        .route("/v1/ask", post(chat::ask))
        // Sessions
        .route("/v1/sessions", post(sessions::create_session))
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/stats", get(sessions::session_stats))
        .route("/v1/sessions/:id", get(sessions::get_session))
        .route("/v1/sessions/:id", delete(sessions::destroy_session))
        .route("/v1/sessions/:id/clear", post(sessions::clear_session))
        // Tools
        .route("/v1/tools/execute", post(tools::execute))
        // Memory store
        .route("/v1/memory/view", post(memory::view))
        .route("/v1/memory/create", post(memory::create))
        .route("/v1/memory/files", get(memory::files))
        .route("/v1/memory/summary", get(memory::summary))
        .route("/v1/memory/search", post(memory::search))
        .route("/v1/memory/organize", post(memory::organize))
        .route("/v1/memory/backup", post(memory::backup))
        .route("/v1/memory/restore", post(memory::restore))
        .route("/v1/memory/*path", delete(memory::delete_path))
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

pub(crate) fn store_error(e: StoreError) -> Response {
    let status = match &e {
        StoreError::NotFound(_) | StoreError::NoMatch(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "store I/O failure");
    }
    (
        status,
        Json(serde_json::json!({ "error": e.to_string(), "kind": e.kind() })),
    )
        .into_response()
}

pub(crate) fn session_error(e: SessionError) -> Response {
    let status = match &e {
        SessionError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::SessionBusy(_) => StatusCode::CONFLICT,
    };
    api_error(status, e.to_string())
}
