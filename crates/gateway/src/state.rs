use std::sync::Arc;

use ac_domain::config::Config;
use ac_providers::ProviderRegistry;
use ac_store::Store;

use crate::runtime::ExecutionOrchestrator;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub llm: Arc<ProviderRegistry>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub orchestrator: Arc<ExecutionOrchestrator>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
