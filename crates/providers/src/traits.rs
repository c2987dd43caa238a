use mv_domain::error::Result;
use mv_domain::tool::{Message, ToolCall, ToolDefinition};
use serde::Serialize;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System prompt followed by the conversation.
    pub messages: Vec<Message>,
    /// Tools the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// `None` lets the client use its configured default.
    pub max_tokens: Option<u32>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub model: String,
    /// Normalized: `stop`, `tool_calls`, `max_tokens`, ...
    pub finish_reason: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model client trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The outbound model call used by the turn loop.
///
/// Retries and backoff are left to the implementation; the turn loop only
/// relies on tool results being safe to resend.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    fn provider_id(&self) -> &str;

    fn default_model(&self) -> &str;
}
