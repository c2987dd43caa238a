use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use mv_domain::tool::{ContentPart, Message};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of one tool call as the model will see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { content: String },
    Error { kind: String, message: String },
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error { .. })
    }

    /// Text sent back in the `tool_result` block.
    pub fn as_text(&self) -> String {
        match self {
            ToolOutcome::Success { content } => content.clone(),
            ToolOutcome::Error { kind, message } => format!("Error ({kind}): {message}"),
        }
    }
}

impl From<mv_domain::error::StoreError> for ToolOutcome {
    fn from(e: mv_domain::error::StoreError) -> Self {
        ToolOutcome::Error {
            kind: e.kind().into(),
            message: e.to_string(),
        }
    }
}

/// A tool call and its result, stored as one transcript entry so compaction
/// can never separate them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Per-session, strictly increasing.
    pub seq: u64,
    pub call_id: String,
    pub tool_name: String,
    pub operation: String,
    pub arguments: serde_json::Value,
    pub outcome: ToolOutcome,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TranscriptEntry {
    User { text: String, at: DateTime<Utc> },
    Assistant { text: String, at: DateTime<Utc> },
    ToolUse(ToolCallRecord),
}

impl TranscriptEntry {
    /// Rough size in characters, used for token estimates.
    pub fn char_len(&self) -> usize {
        match self {
            TranscriptEntry::User { text, .. } | TranscriptEntry::Assistant { text, .. } => {
                text.chars().count()
            }
            TranscriptEntry::ToolUse(rec) => {
                rec.tool_name.len()
                    + rec.arguments.to_string().chars().count()
                    + rec.outcome.as_text().chars().count()
            }
        }
    }

    pub fn as_tool_use(&self) -> Option<&ToolCallRecord> {
        match self {
            TranscriptEntry::ToolUse(rec) => Some(rec),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub transcript: Vec<TranscriptEntry>,
    /// Virtual paths this session created or changed.
    pub touched: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    /// Input tokens the provider reported for the last model call.
    pub last_input_tokens: Option<u64>,
    #[serde(skip)]
    next_seq: u64,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            transcript: Vec::new(),
            touched: BTreeSet::new(),
            created_at: now,
            last_active_at: now,
            last_input_tokens: None,
            next_seq: 1,
        }
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.touch();
        self.transcript.push(TranscriptEntry::User {
            text: text.into(),
            at: self.last_active_at,
        });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.touch();
        self.transcript.push(TranscriptEntry::Assistant {
            text: text.into(),
            at: self.last_active_at,
        });
    }

    /// Append one tool call with its outcome and return its sequence number.
    pub fn record_tool_use(
        &mut self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        operation: impl Into<String>,
        arguments: serde_json::Value,
        outcome: ToolOutcome,
    ) -> u64 {
        self.touch();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.transcript.push(TranscriptEntry::ToolUse(ToolCallRecord {
            seq,
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            operation: operation.into(),
            arguments,
            outcome,
            at: self.last_active_at,
        }));
        seq
    }

    pub fn mark_touched(&mut self, path: impl Into<String>) {
        self.touched.insert(path.into());
    }

    /// Drop the transcript and touched set.  Sequence numbers keep counting.
    pub fn clear(&mut self) -> usize {
        let dropped = self.transcript.len();
        self.transcript.clear();
        self.touched.clear();
        self.last_input_tokens = None;
        self.touch();
        dropped
    }

    pub fn message_count(&self) -> usize {
        self.transcript
            .iter()
            .filter(|e| e.as_tool_use().is_none())
            .count()
    }

    pub fn tool_call_count(&self) -> usize {
        self.transcript
            .iter()
            .filter(|e| e.as_tool_use().is_some())
            .count()
    }

    /// Provider-agnostic message list for the next model call.
    ///
    /// An assistant text turn and the tool calls that follow it form one
    /// assistant message; their results go into the next message.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < self.transcript.len() {
            let mut parts = Vec::new();
            match &self.transcript[i] {
                TranscriptEntry::User { text, .. } => {
                    out.push(Message::user(text.clone()));
                    i += 1;
                    continue;
                }
                TranscriptEntry::Assistant { text, .. } => {
                    if !text.is_empty() {
                        parts.push(ContentPart::Text { text: text.clone() });
                    }
                    i += 1;
                }
                TranscriptEntry::ToolUse(_) => {}
            }

            let mut results = Vec::new();
            while let Some(TranscriptEntry::ToolUse(rec)) = self.transcript.get(i) {
                parts.push(ContentPart::ToolUse {
                    id: rec.call_id.clone(),
                    name: rec.tool_name.clone(),
                    input: rec.arguments.clone(),
                });
                results.push(ContentPart::ToolResult {
                    tool_use_id: rec.call_id.clone(),
                    content: rec.outcome.as_text(),
                    is_error: rec.outcome.is_error(),
                });
                i += 1;
            }

            if !parts.is_empty() {
                out.push(Message::assistant_parts(parts));
            }
            if !results.is_empty() {
                out.push(Message::tool_results(results));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mv_domain::tool::{MessageContent, Role};
    use serde_json::json;

    fn ok(content: &str) -> ToolOutcome {
        ToolOutcome::Success {
            content: content.into(),
        }
    }

    #[test]
    fn sequence_numbers_are_monotonic_across_clear() {
        let mut s = Session::new("s1");
        assert_eq!(s.record_tool_use("c1", "memory", "view", json!({}), ok("")), 1);
        assert_eq!(s.record_tool_use("c2", "memory", "view", json!({}), ok("")), 2);
        assert_eq!(s.clear(), 2);
        assert_eq!(s.record_tool_use("c3", "memory", "view", json!({}), ok("")), 3);
    }

    #[test]
    fn messages_pair_tool_uses_with_results() {
        let mut s = Session::new("s1");
        s.push_user("remember I like tea");
        s.push_assistant("Let me check memory.");
        s.record_tool_use("c1", "memory", "view", json!({"command": "view"}), ok("Directory: /memories"));
        s.record_tool_use(
            "c2",
            "memory",
            "create",
            json!({"command": "create"}),
            ToolOutcome::Error {
                kind: "conflict".into(),
                message: "is a directory".into(),
            },
        );
        s.push_assistant("Noted.");

        let msgs = s.to_messages();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[1].role, Role::Assistant);
        assert_eq!(msgs[2].role, Role::Tool);
        assert_eq!(msgs[3].role, Role::Assistant);

        let MessageContent::Parts(parts) = &msgs[1].content else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 3);

        let MessageContent::Parts(results) = &msgs[2].content else {
            panic!("expected parts");
        };
        assert!(matches!(
            &results[1],
            ContentPart::ToolResult { tool_use_id, is_error: true, .. } if tool_use_id == "c2"
        ));
    }

    #[test]
    fn tool_calls_without_assistant_text_still_form_a_round() {
        let mut s = Session::new("s1");
        s.record_tool_use("c1", "memory", "view", json!({}), ok("x"));
        let msgs = s.to_messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::Assistant);
        assert_eq!(msgs[1].role, Role::Tool);
    }

    #[test]
    fn transcript_entry_serializes_with_role_tag() {
        let mut s = Session::new("s1");
        s.push_user("hi");
        let v = serde_json::to_value(&s.transcript[0]).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["text"], "hi");
    }
}
