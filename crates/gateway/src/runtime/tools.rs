//! The `memory` tool: its definition, argument parsing and dispatch.
//!
//! Every call the model makes ends up as exactly one [`ToolCallRecord`] in
//! the session transcript.  Failures from the store become error outcomes
//! the model can read and react to; nothing here returns `Err`.

use std::sync::Arc;
use std::time::Instant;

use mv_domain::error::StoreError;
use mv_domain::tool::{ToolCall, ToolDefinition};
use mv_domain::trace::TraceEvent;
use mv_sessions::{Session, ToolCallRecord, ToolOutcome};
use mv_store::{MemoryBackend, ViewRange, VirtualPath};
use serde::Deserialize;
use serde_json::Value;

pub const MEMORY_TOOL: &str = "memory";

const COMMANDS: [&str; 6] = ["view", "create", "str_replace", "insert", "delete", "rename"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire arguments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MemoryCommand {
    View {
        path: String,
        #[serde(default)]
        view_range: Option<ViewRange>,
    },
    Create {
        path: String,
        file_text: String,
    },
    StrReplace {
        path: String,
        old_str: String,
        new_str: String,
    },
    Insert {
        path: String,
        insert_line: i64,
        insert_text: String,
    },
    Delete {
        path: String,
    },
    Rename {
        old_path: String,
        new_path: String,
    },
}

impl MemoryCommand {
    pub fn operation(&self) -> &'static str {
        match self {
            MemoryCommand::View { .. } => "view",
            MemoryCommand::Create { .. } => "create",
            MemoryCommand::StrReplace { .. } => "str_replace",
            MemoryCommand::Insert { .. } => "insert",
            MemoryCommand::Delete { .. } => "delete",
            MemoryCommand::Rename { .. } => "rename",
        }
    }

    /// Parse tool input, telling an unknown command apart from bad arguments.
    pub fn from_input(input: &Value) -> Result<Self, ToolOutcome> {
        let command = input
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| failure("invalid_arguments", "missing string field 'command'"))?;
        if !COMMANDS.contains(&command) {
            return Err(failure(
                "unknown_operation",
                format!(
                    "unknown command '{command}'; expected one of: {}",
                    COMMANDS.join(", ")
                ),
            ));
        }
        MemoryCommand::deserialize(input)
            .map_err(|e| failure("invalid_arguments", format!("{command}: {e}")))
    }
}

fn failure(kind: &str, message: impl Into<String>) -> ToolOutcome {
    ToolOutcome::Error {
        kind: kind.into(),
        message: message.into(),
    }
}

/// Definition handed to the model on every call.
pub fn memory_tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: MEMORY_TOOL.into(),
        description: "Read and edit files in your persistent memory directory /memories. \
                      Files persist across conversations. Commands: view (file or directory, \
                      optional view_range [start, end] with end -1 for end of file), create \
                      (write a whole file), str_replace (replace one unique occurrence), \
                      insert (insert text before a 1-based line), delete, rename."
            .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "enum": COMMANDS },
                "path": { "type": "string", "description": "Path under /memories" },
                "view_range": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "minItems": 2,
                    "maxItems": 2
                },
                "file_text": { "type": "string" },
                "old_str": { "type": "string" },
                "new_str": { "type": "string" },
                "insert_line": { "type": "integer", "minimum": 1 },
                "insert_text": { "type": "string" },
                "old_path": { "type": "string" },
                "new_path": { "type": "string" }
            },
            "required": ["command"]
        }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolDispatcher {
    backend: Arc<dyn MemoryBackend>,
}

impl ToolDispatcher {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Run one call against the store and record it on the session.
    pub async fn dispatch(&self, session: &mut Session, call: &ToolCall) -> ToolCallRecord {
        let started = Instant::now();
        let (operation, outcome, touched) = self.execute(call).await;

        for path in &touched {
            session.mark_touched(path.to_string());
        }
        let seq = session.record_tool_use(
            call.call_id.clone(),
            call.tool_name.clone(),
            operation.clone(),
            call.arguments.clone(),
            outcome.clone(),
        );

        TraceEvent::ToolDispatched {
            session_id: session.id.clone(),
            operation: operation.clone(),
            seq,
            ok: !outcome.is_error(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        ToolCallRecord {
            seq,
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            operation,
            arguments: call.arguments.clone(),
            outcome,
            at: session.last_active_at,
        }
    }

    async fn execute(&self, call: &ToolCall) -> (String, ToolOutcome, Vec<VirtualPath>) {
        if call.tool_name != MEMORY_TOOL {
            return (
                "unknown".into(),
                failure(
                    "unknown_tool",
                    format!("unknown tool '{}'; only '{MEMORY_TOOL}' is available", call.tool_name),
                ),
                Vec::new(),
            );
        }

        let command = match MemoryCommand::from_input(&call.arguments) {
            Ok(c) => c,
            Err(outcome) => {
                let op = call
                    .arguments
                    .get("command")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                return (op, outcome, Vec::new());
            }
        };
        let operation = command.operation().to_string();
        tracing::debug!(operation = %operation, call_id = %call.call_id, "memory tool call");

        match self.run(command).await {
            Ok((content, touched)) => (operation, ToolOutcome::Success { content }, touched),
            Err(e) => {
                tracing::debug!(operation = %operation, error = %e, "memory tool call failed");
                (operation, e.into(), Vec::new())
            }
        }
    }

    async fn run(&self, command: MemoryCommand) -> Result<(String, Vec<VirtualPath>), StoreError> {
        let store = &self.backend;
        match command {
            MemoryCommand::View { path, view_range } => {
                let out = store.view(&path, view_range).await?;
                Ok((out.render(), Vec::new()))
            }
            MemoryCommand::Create { path, file_text } => {
                let vp = store.create(&path, &file_text).await?;
                Ok((format!("File created successfully at {vp}"), vec![vp]))
            }
            MemoryCommand::StrReplace {
                path,
                old_str,
                new_str,
            } => {
                let vp = store.str_replace(&path, &old_str, &new_str).await?;
                Ok((format!("File {vp} has been edited"), vec![vp]))
            }
            MemoryCommand::Insert {
                path,
                insert_line,
                insert_text,
            } => {
                let vp = store.insert(&path, insert_line, &insert_text).await?;
                Ok((format!("Text inserted at line {insert_line} in {vp}"), vec![vp]))
            }
            MemoryCommand::Delete { path } => {
                let vp = store.delete(&path).await?;
                Ok((format!("Deleted {vp}"), vec![vp]))
            }
            MemoryCommand::Rename { old_path, new_path } => {
                let (from, to) = store.rename(&old_path, &new_path).await?;
                Ok((format!("Renamed {from} to {to}"), vec![from, to]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mv_store::InMemoryBackend;
    use serde_json::json;

    fn dispatcher() -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(InMemoryBackend::new()))
    }

    fn call(id: &str, args: Value) -> ToolCall {
        ToolCall {
            call_id: id.into(),
            tool_name: MEMORY_TOOL.into(),
            arguments: args,
        }
    }

    fn error_kind(rec: &ToolCallRecord) -> &str {
        match &rec.outcome {
            ToolOutcome::Error { kind, .. } => kind,
            ToolOutcome::Success { .. } => "",
        }
    }

    #[tokio::test]
    async fn create_then_view_records_both_calls() {
        let d = dispatcher();
        let mut s = Session::new("s");
        let rec = d
            .dispatch(
                &mut s,
                &call("c1", json!({"command": "create", "path": "/memories/prefs.txt", "file_text": "tea\n"})),
            )
            .await;
        assert!(!rec.outcome.is_error());
        assert_eq!(rec.seq, 1);
        assert!(s.touched.contains("/memories/prefs.txt"));

        let rec = d
            .dispatch(&mut s, &call("c2", json!({"command": "view", "path": "/memories/prefs.txt"})))
            .await;
        assert_eq!(rec.operation, "view");
        assert_eq!(rec.outcome.as_text(), "   1: tea");
        assert_eq!(s.tool_call_count(), 2);
    }

    #[tokio::test]
    async fn failures_become_error_records() {
        let d = dispatcher();
        let mut s = Session::new("s");

        let rec = d
            .dispatch(&mut s, &call("c1", json!({"command": "view", "path": "/memories/../../etc/passwd"})))
            .await;
        assert_eq!(error_kind(&rec), "outside_root");

        let rec = d
            .dispatch(&mut s, &call("c2", json!({"command": "teleport", "path": "/memories/a"})))
            .await;
        assert_eq!(error_kind(&rec), "unknown_operation");

        let rec = d
            .dispatch(&mut s, &call("c3", json!({"command": "insert", "path": "/memories/a", "insert_line": "two"})))
            .await;
        assert_eq!(error_kind(&rec), "invalid_arguments");

        let rec = d
            .dispatch(
                &mut s,
                &ToolCall {
                    call_id: "c4".into(),
                    tool_name: "web_search".into(),
                    arguments: json!({}),
                },
            )
            .await;
        assert_eq!(error_kind(&rec), "unknown_tool");

        assert_eq!(s.tool_call_count(), 4);
        assert!(s.touched.is_empty());
    }

    #[tokio::test]
    async fn rename_touches_both_paths() {
        let d = dispatcher();
        let mut s = Session::new("s");
        d.dispatch(&mut s, &call("c1", json!({"command": "create", "path": "/memories/a.txt", "file_text": "x"})))
            .await;
        let rec = d
            .dispatch(
                &mut s,
                &call("c2", json!({"command": "rename", "old_path": "/memories/a.txt", "new_path": "/memories/b/a.txt"})),
            )
            .await;
        assert!(!rec.outcome.is_error());
        assert!(s.touched.contains("/memories/b/a.txt"));
    }

    #[test]
    fn view_range_parses_from_pair() {
        let cmd = MemoryCommand::from_input(&json!({
            "command": "view", "path": "/memories/a", "view_range": [2, -1]
        }))
        .unwrap();
        match cmd {
            MemoryCommand::View { view_range: Some(r), .. } => {
                assert_eq!((r.start, r.end), (2, -1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn definition_lists_every_command() {
        let def = memory_tool_definition();
        assert_eq!(def.name, "memory");
        assert_eq!(def.parameters["properties"]["command"]["enum"].as_array().unwrap().len(), 6);
    }
}
