use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory conversation sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Upper bound on live sessions.  Creating one more evicts the least
    /// recently active session (its memory files are kept).
    #[serde(default = "d_1000")]
    pub max_sessions: usize,

    /// Sessions idle for longer than this are dropped by the background
    /// sweeper.  `None` disables idle expiry.
    #[serde(default = "d_idle")]
    pub idle_timeout_minutes: Option<u64>,

    /// How long a second turn on the same session waits for the first one
    /// before failing as busy.
    #[serde(default = "d_lock_timeout")]
    pub lock_timeout_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            idle_timeout_minutes: d_idle(),
            lock_timeout_secs: d_lock_timeout(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_1000() -> usize {
    1000
}
fn d_idle() -> Option<u64> {
    Some(60)
}
fn d_lock_timeout() -> u64 {
    30
}
