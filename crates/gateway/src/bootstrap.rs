//! AppState construction shared by `serve` and the one-shot CLI commands.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};

use ac_domain::config::{Config, ConfigSeverity};
use ac_providers::{GenerationClient, GenerationSettings, ProviderRegistry};

use crate::runtime::ExecutionOrchestrator;
use crate::state::AppState;

/// Validate config, open the store, build the provider registry and the
/// orchestrator, and return a fully-wired [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
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

    // ── Store ────────────────────────────────────────────────────────
    let store = ac_store::open(&config.store).context("opening execution store")?;
    tracing::info!(
        backend = ?config.store.backend,
        path = %config.store.path.display(),
        "execution store ready"
    );

    // ── LLM providers ────────────────────────────────────────────────
    let llm = Arc::new(
        ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?,
    );
    if llm.is_empty() {
        tracing::info!("no LLM providers initialized; configure API keys to enable executions");
    } else {
        tracing::info!(
            providers = llm.len(),
            default = ?llm.default_provider_id(),
            "LLM provider registry ready"
        );
    }

    // ── Orchestrator ─────────────────────────────────────────────────
    let generator = GenerationClient::new(
        llm.clone(),
        GenerationSettings {
            timeout: Duration::from_millis(config.engine.generation_timeout_ms),
            fallback_max_tokens: config.engine.fallback_max_tokens,
        },
    );
    let orchestrator = Arc::new(ExecutionOrchestrator::new(
        store.clone(),
        generator,
        config.engine.clone(),
    ));
    tracing::info!(
        history_turns = config.engine.history_turns,
        fork_policy = ?config.engine.fork_policy,
        "execution orchestrator ready"
    );

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
            Some(t) => {
                tracing::info!(source = %format!("env:{env_var}"), "API bearer-token auth enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!("API bearer-token auth DISABLED; set the {env_var} env var");
                None
            }
        }
    };

    Ok(AppState {
        config,
        store,
        llm,
        orchestrator,
        api_token_hash,
    })
}

/// Periodically drop chain locks nobody holds.
pub fn spawn_background_tasks(state: &AppState) {
    let locks = state.orchestrator.locks().clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(300));
        loop {
            tick.tick().await;
            locks.prune_idle();
            tracing::debug!(chains = locks.chain_count(), "chain locks pruned");
        }
    });
}
