//! Agent definitions: a system prompt plus model parameters, owned by a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type AgentId = i64;
pub type UserId = i64;

pub const DEFAULT_MODEL: &str = "qwen-turbo";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub owner_id: UserId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub system_prompt: String,
    /// Model identifier, optionally prefixed with a provider id
    /// (`"dashscope/qwen-plus"`).
    pub model: String,
    /// Intended range [0, 1]; out-of-range values are clamped at call time.
    pub temperature: f64,
    pub max_tokens: i64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDraft {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_temperature")]
    pub temperature: f64,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: i64,
    #[serde(default)]
    pub is_public: bool,
}

impl AgentDraft {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            description: None,
            model: d_model(),
            temperature: d_temperature(),
            max_tokens: d_max_tokens(),
            is_public: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("agent name must not be empty".into()));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(Error::Validation("system_prompt must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Validation("model must not be empty".into()));
        }
        if !self.temperature.is_finite() {
            return Err(Error::Validation("temperature must be a finite number".into()));
        }
        Ok(())
    }
}

/// Partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

impl AgentPatch {
    /// Apply the patch to `agent`, bumping `updated_at`. The agent is left
    /// unchanged when the patched result would not validate.
    pub fn apply(&self, agent: &mut Agent) -> Result<()> {
        let mut next = agent.clone();
        if let Some(ref v) = self.name {
            next.name = v.clone();
        }
        if let Some(ref v) = self.description {
            // An empty description clears it.
            next.description = Some(v.trim()).filter(|d| !d.is_empty()).map(str::to_owned);
        }
        if let Some(ref v) = self.system_prompt {
            next.system_prompt = v.clone();
        }
        if let Some(ref v) = self.model {
            next.model = v.clone();
        }
        if let Some(v) = self.temperature {
            next.temperature = v;
        }
        if let Some(v) = self.max_tokens {
            next.max_tokens = v;
        }
        if let Some(v) = self.is_public {
            next.is_public = v;
        }

        AgentDraft {
            name: next.name.clone(),
            system_prompt: next.system_prompt.clone(),
            description: next.description.clone(),
            model: next.model.clone(),
            temperature: next.temperature,
            max_tokens: next.max_tokens,
            is_public: next.is_public,
        }
        .validate()?;

        next.updated_at = Utc::now();
        *agent = next;
        Ok(())
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_model() -> String {
    DEFAULT_MODEL.into()
}
fn d_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}
fn d_max_tokens() -> i64 {
    DEFAULT_MAX_TOKENS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_agent() -> Agent {
        let now = Utc::now();
        Agent {
            id: 1,
            owner_id: 7,
            name: "terse".into(),
            description: None,
            system_prompt: "You are terse.".into(),
            model: DEFAULT_MODEL.into(),
            temperature: 0.7,
            max_tokens: 1000,
            is_public: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn draft_defaults_from_json() {
        let draft: AgentDraft =
            serde_json::from_str(r#"{"name":"a","system_prompt":"be nice"}"#).unwrap();
        assert_eq!(draft.model, "qwen-turbo");
        assert!((draft.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(draft.max_tokens, 1000);
        assert!(!draft.is_public);
    }

    #[test]
    fn draft_rejects_blank_prompt() {
        let draft = AgentDraft::new("a", "   ");
        assert!(matches!(draft.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn patch_applies_only_given_fields() {
        let mut agent = sample_agent();
        let patch = AgentPatch {
            temperature: Some(0.2),
            ..Default::default()
        };
        patch.apply(&mut agent).unwrap();
        assert!((agent.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(agent.system_prompt, "You are terse.");
    }

    #[test]
    fn invalid_patch_leaves_agent_untouched() {
        let mut agent = sample_agent();
        let patch = AgentPatch {
            name: Some(String::new()),
            temperature: Some(0.1),
            ..Default::default()
        };
        assert!(patch.apply(&mut agent).is_err());
        assert_eq!(agent.name, "terse");
        assert!((agent.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_description_clears_it() {
        let mut agent = sample_agent();
        AgentPatch {
            description: Some("drills vocabulary".into()),
            ..Default::default()
        }
        .apply(&mut agent)
        .unwrap();
        assert_eq!(agent.description.as_deref(), Some("drills vocabulary"));

        AgentPatch {
            description: Some("  ".into()),
            ..Default::default()
        }
        .apply(&mut agent)
        .unwrap();
        assert_eq!(agent.description, None);
    }
}
