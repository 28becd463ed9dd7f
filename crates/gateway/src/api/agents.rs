//! Agent CRUD and execution endpoints.
//!
//! - `POST   /v1/agents`  create an agent
//! - `GET    /v1/agents`  list own agents (`?public=true` for shared ones)
//! - `GET    /v1/agents/:id`  get one agent
//! - `PUT    /v1/agents/:id`  partial update
//! - `DELETE /v1/agents/:id`  delete agent and its executions
//! - `GET    /v1/agents/:id/executions`  the caller's executions, newest first
//! - `POST   /v1/agents/:id/execute`  run one turn

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use ac_domain::agent::{AgentDraft, AgentId, AgentPatch};
use ac_domain::execution::ExecutionId;
use ac_store::{AgentDirectory, ExecutionStore};

use super::error::{caller, ApiJson, ApiResult};
use crate::runtime::RunRequest;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CRUD
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(draft): ApiJson<AgentDraft>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller(&state, &headers)?;
    let agent = state.store.create_agent(user_id, draft).await?;
    tracing::info!(agent_id = agent.id, owner_id = user_id, "agent created");
    Ok((StatusCode::CREATED, Json(agent)))
}

#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    #[serde(default)]
    pub public: bool,
}

pub async fn list_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListAgentsQuery>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller(&state, &headers)?;
    let agents = if q.public {
        state.store.list_public_agents().await?
    } else {
        state.store.list_agents(user_id).await?
    };
    Ok(Json(agents))
}

pub async fn get_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AgentId>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller(&state, &headers)?;
    Ok(Json(state.store.get_agent(id, user_id).await?))
}

pub async fn update_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AgentId>,
    ApiJson(patch): ApiJson<AgentPatch>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller(&state, &headers)?;
    Ok(Json(state.store.update_agent(id, user_id, patch).await?))
}

pub async fn delete_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AgentId>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller(&state, &headers)?;
    state.store.delete_agent(id, user_id).await?;
    tracing::info!(agent_id = id, owner_id = user_id, "agent deleted");
    Ok(Json(serde_json::json!({ "deleted": true, "agent_id": id })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_executions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AgentId>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller(&state, &headers)?;
    // Unknown or foreign agents are a 404, not an empty list.
    state.store.get_agent(id, user_id).await?;
    Ok(Json(state.store.list_for_agent(id, user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// Missing input is the orchestrator's validation error, not a parse error.
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub parent_execution_id: Option<ExecutionId>,
}

pub async fn execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AgentId>,
    ApiJson(body): ApiJson<ExecuteRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller(&state, &headers)?;
    let outcome = state
        .orchestrator
        .run(
            user_id,
            RunRequest {
                agent_id: id,
                input: body.input,
                parent_execution_id: body.parent_execution_id,
            },
        )
        .await?;

    Ok(Json(serde_json::json!({
        "execution_id": outcome.execution.id,
        "output": outcome.output,
        "status": outcome.execution.status,
    })))
}
