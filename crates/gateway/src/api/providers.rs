use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    let providers = state.llm.list_providers();
    Json(serde_json::json!({
        "providers": providers,
        "count": providers.len(),
        "default_provider": state.llm.default_provider_id(),
    }))
}

/// Liveness plus LLM readiness. Responds 503 while no provider is
/// registered, since every execution would fail.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let ready = !state.llm.is_empty();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if ready { "ok" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "providers": state.llm.len(),
            "store": format!("{:?}", state.config.store.backend).to_lowercase(),
        })),
    )
}
