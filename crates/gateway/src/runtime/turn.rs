//! Turn execution loop: append the user message, call the model, dispatch
//! its memory tool calls, repeat until it answers in plain text.

use mv_domain::error::{Error, SessionError};
use mv_domain::tool::Message;
use mv_domain::trace::TraceEvent;
use mv_providers::ChatRequest;
use mv_sessions::{estimate_tokens, Session};
use serde::Serialize;
use tracing::Instrument;

use crate::state::AppState;

use super::tools::memory_tool_definition;

/// Maximum number of model calls per turn before we force-stop.
pub const MAX_TOOL_LOOPS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub answer: String,
    pub session_id: String,
    /// Every file in the store after the turn.
    pub memory_files: Vec<String>,
    /// Tool calls removed from the transcript by compaction.
    pub compacted: usize,
    pub tool_calls: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("no model client configured")]
    ModelUnavailable,

    #[error("model call failed: {0}")]
    Model(Error),
}

/// Run one turn.  The user message is recorded before the first model call,
/// so a model failure still leaves it in the transcript.
pub async fn run_turn(
    state: AppState,
    session_id: Option<String>,
    message: String,
) -> Result<TurnOutcome, TurnError> {
    let model = state.model.clone().ok_or(TurnError::ModelUnavailable)?;
    let id = state.sessions.resolve(session_id.as_deref())?;

    let span = tracing::info_span!("turn", session_id = %id, "otel.kind" = "SERVER");
    async move {
        let mut session = state.sessions.lease(&id).await?;
        session.push_user(message);

        let system_chars = state.config.model.system_prompt.chars().count();
        let system = Message::system(state.config.model.system_prompt.clone());
        let mut answer = String::new();
        let mut compacted = 0;
        let mut tool_calls = 0;

        for loop_idx in 0..MAX_TOOL_LOOPS {
            tracing::debug!(loop_idx, "tool loop iteration");
            compacted += compact_before_call(&state, &mut session, system_chars);

            let mut messages = vec![system.clone()];
            messages.extend(session.to_messages());
            let req = ChatRequest {
                messages,
                tools: vec![memory_tool_definition()],
                ..Default::default()
            };

            let resp = model.chat(req).await.map_err(TurnError::Model)?;
            session.last_input_tokens = resp.usage.map(|u| u64::from(u.prompt_tokens));

            if !resp.content.is_empty() {
                session.push_assistant(resp.content.clone());
            }
            answer = resp.content;

            if resp.tool_calls.is_empty() {
                break;
            }
            for call in &resp.tool_calls {
                state.dispatcher.dispatch(&mut session, call).await;
                tool_calls += 1;
            }

            if loop_idx == MAX_TOOL_LOOPS - 1 {
                tracing::warn!(max_loops = MAX_TOOL_LOOPS, "tool loop limit reached");
            }
        }
        drop(session);

        let memory_files = match state.store.files().await {
            Ok(files) => files.into_iter().map(|f| f.path.to_string()).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "listing memory files after turn failed");
                Vec::new()
            }
        };

        Ok::<_, TurnError>(TurnOutcome {
            answer,
            session_id: id.clone(),
            memory_files,
            compacted,
            tool_calls,
        })
    }
    .instrument(span)
    .await
}

/// Compact the transcript if it is over budget.  Returns the number of
/// removed tool calls; failures are logged and skipped.
fn compact_before_call(state: &AppState, session: &mut Session, system_chars: usize) -> usize {
    let heuristic = estimate_tokens(&session.transcript) + (system_chars as u64).div_ceil(4);
    let estimate = session
        .last_input_tokens
        .map_or(heuristic, |reported| reported.max(heuristic));

    match state.compactor.compact(&mut session.transcript, Some(estimate)) {
        Ok(report) if report.removed() > 0 => {
            session.last_input_tokens = None;
            TraceEvent::TranscriptCompacted {
                session_id: session.id.clone(),
                removed: report.removed(),
                tokens_before: report.tokens_before,
                tokens_after: report.tokens_after,
            }
            .emit();
            report.removed()
        }
        Ok(_) => 0,
        Err(e) => {
            tracing::warn!(error = %e, "compaction skipped");
            0
        }
    }
}
