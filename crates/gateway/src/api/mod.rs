pub mod agents;
pub mod auth;
pub mod error;
pub mod executions;
pub mod providers;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the `AC_API_TOKEN` bearer-token middleware).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(providers::health));

    let protected = Router::new()
        // Agents
        .route(
            "/v1/agents",
            get(agents::list_agents).post(agents::create_agent),
        )
        .route(
            "/v1/agents/:id",
            get(agents::get_agent)
                .put(agents::update_agent)
                .delete(agents::delete_agent),
        )
        .route("/v1/agents/:id/executions", get(agents::list_executions))
        .route("/v1/agents/:id/execute", post(agents::execute))
        // Executions
        .route("/v1/executions/:id", get(executions::get_execution))
        .route("/v1/executions/:id/chain", get(executions::get_chain))
        // Providers / Models
        .route("/v1/models", get(providers::list_providers))
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected).layer(TraceLayer::new_for_http())
}
