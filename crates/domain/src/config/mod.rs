mod engine;
mod llm;
mod observability;
mod server;
mod store;

pub use engine::*;
pub use llm::*;
pub use observability::*;
pub use server::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.user_header.trim().is_empty() {
            errors.push(ConfigError::error(
                "server.user_header",
                "user_header must not be empty",
            ));
        }

        if self.llm.providers.is_empty() {
            errors.push(ConfigError::warning("llm.providers", "no LLM providers configured"));
        }
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].id"),
                    "provider id must not be empty",
                ));
            }
            if provider.id.contains('/') {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].id"),
                    "provider id must not contain '/'",
                ));
            }
            if provider.base_url.is_empty() && provider.kind != ProviderKind::Dashscope {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].base_url"),
                    "provider base_url must not be empty",
                ));
            }
        }
        if let Some(ref default) = self.llm.default_provider {
            if !self.llm.providers.iter().any(|p| &p.id == default) {
                errors.push(ConfigError::error(
                    "llm.default_provider",
                    format!("'{default}' does not match any configured provider"),
                ));
            }
        }

        if self.store.backend == StoreBackend::Sqlite
            && self.store.path.as_os_str().is_empty()
        {
            errors.push(ConfigError::error("store.path", "sqlite path must not be empty"));
        }
        if self.store.backend == StoreBackend::Memory {
            errors.push(ConfigError::warning(
                "store.backend",
                "memory backend loses every execution on restart",
            ));
        }

        if self.engine.generation_timeout_ms == 0 {
            errors.push(ConfigError::error(
                "engine.generation_timeout_ms",
                "generation timeout must be greater than 0",
            ));
        }
        if self.engine.fallback_max_tokens == 0 {
            errors.push(ConfigError::error(
                "engine.fallback_max_tokens",
                "fallback max_tokens must be greater than 0",
            ));
        }
        if self.engine.fork_policy == ForkPolicy::Allow {
            errors.push(ConfigError::warning(
                "engine.fork_policy",
                "concurrent continuations of one parent are not serialized",
            ));
        }

        if self.server.cors.allows_any() {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::warning(
                "observability.sample_rate",
                "sample rate outside [0, 1] is clamped",
            ));
        }

        errors
    }
}
