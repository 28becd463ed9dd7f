//! Text generation front door used by the execution engine.
//!
//! Wraps the [`ProviderRegistry`] with the engine's request policy: parameter
//! normalization, a hard deadline, and a single error shape. Whatever goes
//! wrong below (routing, transport, HTTP status, malformed body, deadline)
//! reaches the caller as exactly one [`Error::Upstream`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use ac_domain::error::{Error, Result};
use ac_domain::message::Message;

use crate::registry::ProviderRegistry;
use crate::traits::ChatRequest;

/// Used when an agent carries no usable `max_tokens`.
pub const DEFAULT_FALLBACK_MAX_TOKENS: u32 = 1500;

#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    /// Deadline for one whole generation call.
    pub timeout: Duration,
    pub fallback_max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            fallback_max_tokens: DEFAULT_FALLBACK_MAX_TOKENS,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parameter normalization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Clamp a stored temperature into `[0, 1]`. NaN becomes 0.
pub fn effective_temperature(raw: f64) -> f32 {
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, 1.0) as f32
}

/// Positive values pass through (saturating at `u32::MAX`); zero, negative
/// or missing values use `fallback`.
pub fn effective_max_tokens(raw: Option<i64>, fallback: u32) -> u32 {
    match raw {
        Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => fallback,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GenerationClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct GenerationClient {
    registry: Arc<ProviderRegistry>,
    settings: GenerationSettings,
}

impl GenerationClient {
    pub fn new(registry: Arc<ProviderRegistry>, settings: GenerationSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> GenerationSettings {
        self.settings
    }

    /// Send `messages` to the provider selected by `model` and return the
    /// generated text. Never returns partial output.
    pub async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f64,
        max_tokens: Option<i64>,
    ) -> Result<String> {
        let (provider, model_name) = self.registry.resolve(model).map_err(into_upstream)?;

        let req = ChatRequest {
            messages: messages.to_vec(),
            temperature: Some(effective_temperature(temperature)),
            max_tokens: Some(effective_max_tokens(
                max_tokens,
                self.settings.fallback_max_tokens,
            )),
            model: model_name,
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.settings.timeout, provider.chat(&req)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(resp)) => {
                tracing::debug!(
                    provider = provider.provider_id(),
                    model = %resp.model,
                    finish_reason = ?resp.finish_reason,
                    elapsed_ms,
                    "generation completed"
                );
                Ok(resp.content)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    provider = provider.provider_id(),
                    error = %e,
                    elapsed_ms,
                    "generation failed"
                );
                Err(into_upstream(e))
            }
            Err(_) => {
                tracing::warn!(
                    provider = provider.provider_id(),
                    timeout_ms = self.settings.timeout.as_millis() as u64,
                    "generation timed out"
                );
                Err(Error::Upstream {
                    status: None,
                    detail: format!(
                        "generation timed out after {}ms",
                        self.settings.timeout.as_millis()
                    ),
                })
            }
        }
    }
}

fn into_upstream(e: Error) -> Error {
    match e {
        Error::Upstream { .. } => e,
        other => Error::Upstream {
            status: None,
            detail: other.to_string(),
        },
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
