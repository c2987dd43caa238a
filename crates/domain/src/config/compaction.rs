use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compaction drops old tool-use turns from a session transcript once the
/// estimated input size crosses `trigger_input_tokens`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Estimated input tokens above which compaction runs.
    #[serde(default = "d_30000")]
    pub trigger_input_tokens: u64,
    /// Number of most recent tool-use turns that are never removed.
    #[serde(default = "d_3")]
    pub keep_tool_uses: usize,
    /// Keep removing until at least this many tokens were cleared, even if
    /// the estimate is already under the trigger.  0 stops at the trigger.
    #[serde(default)]
    pub clear_at_least_tokens: u64,
    /// Tool names whose turns are never removed, whatever their age.
    #[serde(default = "d_exclude")]
    pub exclude_tools: Vec<String>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_input_tokens: 30_000,
            keep_tool_uses: 3,
            clear_at_least_tokens: 0,
            exclude_tools: d_exclude(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_30000() -> u64 {
    30_000
}
fn d_3() -> usize {
    3
}
fn d_exclude() -> Vec<String> {
    vec!["memory".into()]
}
