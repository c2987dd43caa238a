//! Token-budget compaction of session transcripts.
//!
//! Once the estimated input size crosses the trigger, old tool-use entries
//! are dropped oldest-first.  User and assistant text is never touched, the
//! most recent `keep_tool_uses` tool calls always survive, and calls to any
//! tool in `exclude_tools` (the memory tool by default) survive regardless
//! of age.

use std::collections::BTreeSet;

use mv_domain::config::CompactionConfig;
use mv_domain::error::CompactionError;
use serde::Serialize;

use crate::session::TranscriptEntry;

/// Characters per token for the size heuristic.
const CHARS_PER_TOKEN: u64 = 4;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompactionReport {
    /// Sequence numbers of the removed tool calls.
    pub removed_seqs: Vec<u64>,
    pub tokens_before: u64,
    pub tokens_after: u64,
}

impl CompactionReport {
    pub fn removed(&self) -> usize {
        self.removed_seqs.len()
    }

    fn unchanged(tokens: u64) -> Self {
        Self {
            removed_seqs: Vec::new(),
            tokens_before: tokens,
            tokens_after: tokens,
        }
    }
}

pub fn entry_tokens(entry: &TranscriptEntry) -> u64 {
    (entry.char_len() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Heuristic estimate for callers without provider-reported usage.
pub fn estimate_tokens(entries: &[TranscriptEntry]) -> u64 {
    entries.iter().map(entry_tokens).sum()
}

pub struct ContextCompactor {
    config: CompactionConfig,
}

impl ContextCompactor {
    pub fn new(config: CompactionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub fn compact(
        &self,
        transcript: &mut Vec<TranscriptEntry>,
        estimated_input_tokens: Option<u64>,
    ) -> Result<CompactionReport, CompactionError> {
        if !self.config.enabled {
            return Ok(CompactionReport::unchanged(
                estimated_input_tokens.unwrap_or(0),
            ));
        }
        let estimate = estimated_input_tokens.ok_or(CompactionError::EstimateUnavailable)?;
        let trigger = self.config.trigger_input_tokens;
        if estimate <= trigger {
            return Ok(CompactionReport::unchanged(estimate));
        }

        let tool_positions: Vec<usize> = transcript
            .iter()
            .enumerate()
            .filter(|(_, e)| e.as_tool_use().is_some())
            .map(|(i, _)| i)
            .collect();
        let recent_start = tool_positions
            .len()
            .saturating_sub(self.config.keep_tool_uses);
        let protected: BTreeSet<usize> = tool_positions[recent_start..].iter().copied().collect();

        let candidates = tool_positions.iter().copied().filter(|i| {
            !protected.contains(i)
                && transcript[*i]
                    .as_tool_use()
                    .is_some_and(|rec| !self.config.exclude_tools.contains(&rec.tool_name))
        });

        let mut remaining = estimate;
        let mut cleared = 0u64;
        let mut drop_idx = BTreeSet::new();
        for idx in candidates {
            if remaining < trigger && cleared >= self.config.clear_at_least_tokens {
                break;
            }
            let cost = entry_tokens(&transcript[idx]);
            remaining = remaining.saturating_sub(cost);
            cleared += cost;
            drop_idx.insert(idx);
        }

        if drop_idx.is_empty() {
            tracing::debug!(estimate, trigger, "over budget but nothing is removable");
            return Ok(CompactionReport::unchanged(estimate));
        }

        let mut removed_seqs = Vec::with_capacity(drop_idx.len());
        let mut idx = 0;
        transcript.retain(|entry| {
            let keep = !drop_idx.contains(&idx);
            if !keep {
                if let Some(rec) = entry.as_tool_use() {
                    removed_seqs.push(rec.seq);
                }
            }
            idx += 1;
            keep
        });

        tracing::debug!(
            removed = removed_seqs.len(),
            tokens_before = estimate,
            tokens_after = remaining,
            "transcript compacted"
        );
        Ok(CompactionReport {
            removed_seqs,
            tokens_before: estimate,
            tokens_after: remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, ToolOutcome};
    use serde_json::json;

    fn config(trigger: u64, keep: usize, exclude: &[&str]) -> CompactionConfig {
        CompactionConfig {
            enabled: true,
            trigger_input_tokens: trigger,
            keep_tool_uses: keep,
            clear_at_least_tokens: 0,
            exclude_tools: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// user, then `n` tool calls alternating between `web` and `memory`,
    /// each with a 400-char result (~100 tokens).
    fn transcript(n: usize) -> Vec<TranscriptEntry> {
        let mut s = Session::new("t");
        s.push_user("question");
        for i in 0..n {
            let tool = if i % 2 == 0 { "web" } else { "memory" };
            s.record_tool_use(
                format!("c{i}"),
                tool,
                "op",
                json!({}),
                ToolOutcome::Success {
                    content: "x".repeat(400),
                },
            );
        }
        s.push_assistant("answer");
        s.transcript
    }

    fn call_ids(t: &[TranscriptEntry]) -> Vec<String> {
        t.iter()
            .filter_map(|e| e.as_tool_use().map(|r| r.call_id.clone()))
            .collect()
    }

    #[test]
    fn under_threshold_is_unchanged() {
        let c = ContextCompactor::new(config(10_000, 1, &[]));
        let mut t = transcript(6);
        let before = estimate_tokens(&t);
        let report = c.compact(&mut t, Some(before)).unwrap();
        assert_eq!(report.removed(), 0);
        assert_eq!(t.len(), 8);
    }

    #[test]
    fn missing_estimate_is_an_error() {
        let c = ContextCompactor::new(config(10, 1, &[]));
        let mut t = transcript(2);
        assert_eq!(
            c.compact(&mut t, None).unwrap_err(),
            CompactionError::EstimateUnavailable
        );
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn disabled_never_compacts() {
        let mut cfg = config(1, 0, &[]);
        cfg.enabled = false;
        let c = ContextCompactor::new(cfg);
        let mut t = transcript(4);
        c.compact(&mut t, Some(1_000_000)).unwrap();
        assert_eq!(t.len(), 6);
    }

    #[test]
    fn removes_oldest_until_under_trigger() {
        let c = ContextCompactor::new(config(450, 0, &[]));
        let mut t = transcript(6);
        let est = estimate_tokens(&t);
        let report = c.compact(&mut t, Some(est)).unwrap();

        assert!(report.tokens_after < 450);
        assert_eq!(report.removed_seqs, vec![1, 2]);
        assert_eq!(call_ids(&t), vec!["c2", "c3", "c4", "c5"]);
    }

    #[test]
    fn protects_recent_and_excluded_tools() {
        let c = ContextCompactor::new(config(1, 2, &["memory"]));
        let mut t = transcript(8);
        let est = estimate_tokens(&t);
        c.compact(&mut t, Some(est)).unwrap();

        // web calls c0, c2, c4 go; c6 and c7 are the two most recent.
        assert_eq!(call_ids(&t), vec!["c1", "c3", "c5", "c6", "c7"]);
        assert!(matches!(t.first(), Some(TranscriptEntry::User { .. })));
        assert!(matches!(t.last(), Some(TranscriptEntry::Assistant { .. })));
    }

    #[test]
    fn clear_at_least_keeps_removing_past_trigger() {
        let mut cfg = config(600, 0, &[]);
        cfg.clear_at_least_tokens = 300;
        let c = ContextCompactor::new(cfg);
        let mut t = transcript(6);
        let est = estimate_tokens(&t);
        let report = c.compact(&mut t, Some(est)).unwrap();
        assert_eq!(report.removed(), 3);
    }

    #[test]
    fn default_config_keeps_memory_history() {
        let c = ContextCompactor::new(CompactionConfig::default());
        let mut t = transcript(10);
        c.compact(&mut t, Some(1_000_000)).unwrap();
        let memory_calls = t
            .iter()
            .filter_map(|e| e.as_tool_use())
            .filter(|r| r.tool_name == "memory")
            .count();
        assert_eq!(memory_calls, 5);
    }
}
