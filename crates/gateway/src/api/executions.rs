//! Execution read endpoints.
//!
//! - `GET /v1/executions/:id`  one execution
//! - `GET /v1/executions/:id/chain`  root-to-leaf chain ending at `:id`

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json};

use ac_domain::execution::ExecutionId;

use super::error::{caller, ApiResult};
use crate::state::AppState;

pub async fn get_execution(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ExecutionId>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller(&state, &headers)?;
    Ok(Json(state.orchestrator.get_execution(id, user_id).await?))
}

pub async fn get_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ExecutionId>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller(&state, &headers)?;
    let chain = state.orchestrator.get_chain(id, user_id).await?;
    Ok(Json(serde_json::json!({
        "execution_id": id,
        "length": chain.len(),
        "chain": chain,
    })))
}
