use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model (Anthropic Messages API)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Environment variable holding the API key.  Never stored in the file.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            model: d_model(),
            api_key_env: d_api_key_env(),
            max_tokens: d_max_tokens(),
            request_timeout_secs: d_timeout(),
            system_prompt: d_system_prompt(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn d_model() -> String {
    "claude-sonnet-4-5".into()
}
fn d_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn d_max_tokens() -> u32 {
    2048
}
fn d_timeout() -> u64 {
    60
}
fn d_system_prompt() -> String {
    "You are a helpful assistant with a persistent memory directory at /memories.\n\
     Check your memory before answering, store durable facts about the user and \
     the conversation in memory files, and keep them up to date. Do not mention \
     the memory tool unless asked about it."
        .into()
}
