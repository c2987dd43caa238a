//! AppState construction and background-task spawning extracted from `main.rs`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};

use mv_domain::config::{Config, ConfigSeverity};
use mv_providers::{AnthropicClient, ModelClient};
use mv_sessions::{ContextCompactor, SessionManager};
use mv_store::{MemoryBackend, MemoryIndex};

use crate::runtime::tools::ToolDispatcher;
use crate::state::AppState;

/// How often the idle-session sweeper runs.
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Validate config, open the store and the model client and return a
/// fully-wired [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Memory store ─────────────────────────────────────────────────
    let store = mv_store::open_backend(&config.memory).context("opening memory store")?;

    // ── Model client ─────────────────────────────────────────────────
    let model: Option<Arc<dyn ModelClient>> = match AnthropicClient::from_config(&config.model) {
        Ok(client) => {
            tracing::info!(model = %config.model.model, "model client ready");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "model client unavailable; /v1/ask disabled");
            None
        }
    };

    // ── API token ────────────────────────────────────────────────────
    let api_token = std::env::var(&config.server.api_token_env)
        .ok()
        .filter(|t| !t.is_empty());
    if api_token.is_none() {
        tracing::warn!(
            env = %config.server.api_token_env,
            "API token not set; protected endpoints are open (dev mode)"
        );
    }

    Ok(assemble_state(config, store, model, api_token.as_deref()))
}

/// Wire the services together.  Used by `build_app_state` and by tests that
/// bring their own store and model.
pub fn assemble_state(
    config: Arc<Config>,
    store: Arc<dyn MemoryBackend>,
    model: Option<Arc<dyn ModelClient>>,
    api_token: Option<&str>,
) -> AppState {
    AppState {
        index: Arc::new(MemoryIndex::new(store.clone())),
        dispatcher: Arc::new(ToolDispatcher::new(store.clone())),
        sessions: Arc::new(SessionManager::new(config.sessions.clone())),
        compactor: Arc::new(ContextCompactor::new(config.compaction.clone())),
        api_token_hash: api_token.map(|t| Sha256::digest(t.as_bytes()).to_vec()),
        store,
        model,
        config,
    }
}

/// Spawn the periodic idle-session sweeper.
pub fn spawn_background_tasks(state: &AppState) {
    if state.config.sessions.idle_timeout_minutes.is_none() {
        tracing::info!("idle session expiry disabled");
        return;
    }
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(IDLE_SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let pruned = sessions.prune_idle(chrono::Utc::now());
            if !pruned.is_empty() {
                tracing::info!(count = pruned.len(), "idle sessions pruned");
            }
        }
    });
}
