use serde::Serialize;

/// Structured trace events emitted across all memvault crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
        active_sessions: usize,
    },
    SessionEvicted {
        session_id: String,
        idle_secs: i64,
    },
    SessionDestroyed {
        session_id: String,
        reason: String,
    },
    SessionCleared {
        session_id: String,
        entries_dropped: usize,
    },
    ToolDispatched {
        session_id: String,
        operation: String,
        seq: u64,
        ok: bool,
        duration_ms: u64,
    },
    TranscriptCompacted {
        session_id: String,
        removed: usize,
        tokens_before: u64,
        tokens_after: u64,
    },
    MemoryRestored {
        files: usize,
    },
    MemoryOrganized {
        moved: usize,
        skipped: usize,
        dry_run: bool,
    },
    LlmRequest {
        provider: String,
        model: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "mv_event");
    }
}
