use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Sandbox root.  Virtual path `/memories/x` lives at `<root>/x`.
    #[serde(default = "d_root")]
    pub root: PathBuf,
    /// Which storage backend serves the memory tool.
    #[serde(default)]
    pub backend: BackendKind,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            root: d_root(),
            backend: BackendKind::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Plain text files under `root`.
    #[default]
    Local,
    /// Process-local map; nothing survives a restart.
    InMemory,
}

fn d_root() -> PathBuf {
    PathBuf::from("./data/memories")
}
