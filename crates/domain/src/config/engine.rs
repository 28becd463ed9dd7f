use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ancestor turns replayed into the prompt of a continuation.
    #[serde(default = "d_3")]
    pub history_turns: usize,
    /// `max_tokens` sent when the agent's value is missing or non-positive.
    #[serde(default = "d_1500")]
    pub fallback_max_tokens: u32,
    /// Upper bound on one generation call, independent of the HTTP client's
    /// own timeout.
    #[serde(default = "d_10000u")]
    pub generation_timeout_ms: u64,
    #[serde(default)]
    pub fork_policy: ForkPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_turns: 3,
            fallback_max_tokens: 1500,
            generation_timeout_ms: 10_000,
            fork_policy: ForkPolicy::default(),
        }
    }
}

/// What happens when two turns continue the same conversation.
///
/// - `serialize` (default): continuations of one chain run one at a time,
///   guarded by a lock keyed on the chain's root execution. Two callers
///   supplying the same parent still produce two sibling children, but
///   never concurrently.
/// - `reject`: like `serialize`, and a parent that already has a child
///   cannot be continued again (the second caller gets a conflict).
/// - `allow`: no lock; concurrent siblings are an accepted branching
///   feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForkPolicy {
    #[default]
    Serialize,
    Reject,
    Allow,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_3() -> usize {
    3
}
fn d_1500() -> u32 {
    1500
}
fn d_10000u() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults() {
        let cfg: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.history_turns, 3);
        assert_eq!(cfg.fallback_max_tokens, 1500);
        assert_eq!(cfg.generation_timeout_ms, 10_000);
        assert_eq!(cfg.fork_policy, ForkPolicy::Serialize);
    }

    #[test]
    fn fork_policy_parses() {
        let cfg: EngineConfig = toml::from_str(r#"fork_policy = "reject""#).unwrap();
        assert_eq!(cfg.fork_policy, ForkPolicy::Reject);
    }
}
