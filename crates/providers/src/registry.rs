//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances. At startup the
//! registry reads the [`LlmConfig`], resolves authentication (env vars,
//! keychain, direct keys), and instantiates an adapter for each configured
//! provider. Agents name their model either bare (`qwen-turbo`) or qualified
//! with a provider id (`openai/gpt-4o-mini`); [`ProviderRegistry::resolve`]
//! turns that spec into a provider plus the model to request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ac_domain::config::LlmConfig;
use ac_domain::error::{Error, Result};

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds all instantiated LLM providers and the default used for bare
/// model names.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_id: Option<String>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Every supported kind speaks the OpenAI chat-completions wire format,
    /// so all of them go through [`OpenAiCompatProvider`].
    ///
    /// Providers that fail to initialize are logged and skipped rather than
    /// aborting the entire startup.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.default_timeout_ms);
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut first_ok: Option<String> = None;

        for pc in &config.providers {
            match OpenAiCompatProvider::from_config(pc, timeout) {
                Ok(provider) => {
                    tracing::info!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        "registered LLM provider"
                    );
                    if first_ok.is_none() {
                        first_ok = Some(pc.id.clone());
                    }
                    providers.insert(pc.id.clone(), Arc::new(provider));
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            // Fail-fast in prod with AC_REQUIRE_LLM=1; otherwise boot so the
            // agent and history endpoints keep working.
            let require = std::env::var("AC_REQUIRE_LLM")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false);
            if require {
                return Err(Error::Config(
                    "all configured LLM providers failed to initialize".into(),
                ));
            }
            tracing::warn!(
                "no LLM providers initialized; executions will fail \
                 until auth is configured"
            );
        }

        let default_id = match config.default_provider {
            Some(ref id) if providers.contains_key(id) => Some(id.clone()),
            Some(ref id) => {
                tracing::warn!(
                    provider_id = %id,
                    "default provider is not registered, using first available"
                );
                first_ok
            }
            None => first_ok,
        };

        Ok(Self {
            providers,
            default_id,
        })
    }

    /// An empty registry. Providers are added with [`Self::with_provider`].
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
            default_id: None,
        }
    }

    /// Register an already-built provider. The first one registered becomes
    /// the default.
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        let id = provider.provider_id().to_string();
        if self.default_id.is_none() {
            self.default_id = Some(id.clone());
        }
        self.providers.insert(id, provider);
        self
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Provider used for bare model names.
    pub fn default_provider_id(&self) -> Option<&str> {
        self.default_id.as_deref()
    }

    /// Resolve a model spec into the provider to call and the model name to
    /// put on the request.
    ///
    /// `provider/model` selects a registered provider by id. Anything else,
    /// including names whose prefix is not a registered provider
    /// (`Qwen/Qwen2-7B`), goes to the default provider unchanged. An empty
    /// spec leaves the model to the provider's own default.
    pub fn resolve(&self, model_spec: &str) -> Result<(Arc<dyn LlmProvider>, Option<String>)> {
        if let Some((prefix, model)) = model_spec.split_once('/') {
            if let Some(p) = self.providers.get(prefix) {
                let model = (!model.is_empty()).then(|| model.to_string());
                return Ok((p.clone(), model));
            }
        }

        let provider = self
            .default_id
            .as_ref()
            .and_then(|id| self.providers.get(id))
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!("no LLM provider available for model '{model_spec}'"))
            })?;
        let model = (!model_spec.is_empty()).then(|| model_spec.to_string());
        Ok((provider, model))
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChatRequest, ChatResponse};
    use ac_domain::config::{AuthConfig, ProviderConfig, ProviderKind};

    struct Named(&'static str);

    #[async_trait::async_trait]
    impl LlmProvider for Named {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: String::new(),
                model: "m".into(),
                finish_reason: None,
            })
        }
        fn provider_id(&self) -> &str {
            self.0
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::empty()
            .with_provider(Arc::new(Named("qwen")))
            .with_provider(Arc::new(Named("openai")))
    }

    #[test]
    fn bare_model_goes_to_default() {
        let (p, model) = registry().resolve("qwen-turbo").unwrap();
        assert_eq!(p.provider_id(), "qwen");
        assert_eq!(model.as_deref(), Some("qwen-turbo"));
    }

    #[test]
    fn qualified_model_selects_provider() {
        let (p, model) = registry().resolve("openai/gpt-4o-mini").unwrap();
        assert_eq!(p.provider_id(), "openai");
        assert_eq!(model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn unknown_prefix_is_a_plain_model_name() {
        let (p, model) = registry().resolve("Qwen/Qwen2-7B").unwrap();
        assert_eq!(p.provider_id(), "qwen");
        assert_eq!(model.as_deref(), Some("Qwen/Qwen2-7B"));
    }

    #[test]
    fn empty_registry_cannot_resolve() {
        let err = ProviderRegistry::empty().resolve("qwen-turbo").err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn from_config_honours_default_provider() {
        let cfg = LlmConfig {
            default_timeout_ms: 1_000,
            default_provider: Some("b".into()),
            providers: ["a", "b"]
                .iter()
                .map(|id| ProviderConfig {
                    id: (*id).into(),
                    kind: ProviderKind::OpenaiCompat,
                    base_url: "http://127.0.0.1:1/v1".into(),
                    auth: AuthConfig::default(),
                    default_model: None,
                })
                .collect(),
        };
        let reg = ProviderRegistry::from_config(&cfg).unwrap();
        assert_eq!(reg.list_providers(), vec!["a", "b"]);
        assert_eq!(reg.default_provider_id(), Some("b"));
    }
}
