use std::sync::Arc;

use mv_domain::config::Config;
use mv_providers::ModelClient;
use mv_sessions::{ContextCompactor, SessionManager};
use mv_store::{MemoryBackend, MemoryIndex};

use crate::runtime::tools::ToolDispatcher;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services**: config, store, index, model client
/// - **Session management**: sessions, compactor, tool dispatcher
/// - **Security**: token hash computed at startup
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<dyn MemoryBackend>,
    pub index: Arc<MemoryIndex>,
    /// `None` when no API key is configured; `/v1/ask` then answers 503
    /// while the memory and session endpoints keep working.
    pub model: Option<Arc<dyn ModelClient>>,

    // ── Session management ────────────────────────────────────────────
    pub sessions: Arc<SessionManager>,
    pub compactor: Arc<ContextCompactor>,
    pub dispatcher: Arc<ToolDispatcher>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
