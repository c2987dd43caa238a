use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::api::{api_error, session_error};
use crate::runtime::turn::{run_turn, TurnError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskBody {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /v1/ask`: run one turn and return the final answer.
///
/// The turn runs in its own task, so a client that disconnects mid-turn does
/// not cut it short.
pub async fn ask(State(state): State<AppState>, Json(body): Json<AskBody>) -> Response {
    if body.question.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "question must not be empty");
    }

    let handle = tokio::spawn(run_turn(state, body.session_id, body.question));
    match handle.await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(TurnError::Session(e))) => session_error(e),
        Ok(Err(e @ TurnError::ModelUnavailable)) => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Ok(Err(e @ TurnError::Model(_))) => {
            tracing::warn!(error = %e, "turn failed");
            api_error(StatusCode::BAD_GATEWAY, e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "turn task panicked");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "turn failed")
        }
    }
}
