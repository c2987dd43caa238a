//! Direct tool execution: runs memory tool calls against a session without
//! involving the model.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use mv_domain::tool::ToolCall;

use crate::api::{api_error, session_error};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    #[serde(default)]
    pub session_id: Option<String>,
    pub calls: Vec<CallBody>,
}

#[derive(Debug, Deserialize)]
pub struct CallBody {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

/// `POST /v1/tools/execute`
pub async fn execute(State(state): State<AppState>, Json(body): Json<ExecuteBody>) -> Response {
    if body.calls.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "calls must not be empty");
    }
    let id = match state.sessions.resolve(body.session_id.as_deref()) {
        Ok(id) => id,
        Err(e) => return session_error(e),
    };

    let handle = tokio::spawn(async move {
        let mut session = state.sessions.lease(&id).await?;
        let mut results = Vec::with_capacity(body.calls.len());
        for call in body.calls {
            let call = ToolCall {
                call_id: call
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                tool_name: call.name,
                arguments: call.input,
            };
            results.push(state.dispatcher.dispatch(&mut session, &call).await);
        }
        Ok::<_, mv_domain::error::SessionError>((id, results))
    });

    match handle.await {
        Ok(Ok((session_id, results))) => Json(serde_json::json!({
            "session_id": session_id,
            "results": results,
        }))
        .into_response(),
        Ok(Err(e)) => session_error(e),
        Err(e) => {
            tracing::error!(error = %e, "tool execution task panicked");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "tool execution failed")
        }
    }
}
