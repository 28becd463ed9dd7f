//! Router-level checks: status mapping, caller identity and bearer auth.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use ac_domain::config::Config;
use ac_domain::error::Result;
use ac_gateway::api;
use ac_gateway::runtime::ExecutionOrchestrator;
use ac_gateway::state::AppState;
use ac_providers::{
    ChatRequest, ChatResponse, GenerationClient, GenerationSettings, LlmProvider, ProviderRegistry,
};
use ac_store::{MemoryStore, Store};

struct Echo;

#[async_trait::async_trait]
impl LlmProvider for Echo {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let last = req.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(ChatResponse {
            content: format!("echo: {last}"),
            model: "echo".into(),
            finish_reason: Some("stop".into()),
        })
    }

    fn provider_id(&self) -> &str {
        "echo"
    }
}

fn app(token: Option<&str>) -> Router {
    let config = Arc::new(Config::default());
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let llm = Arc::new(ProviderRegistry::empty().with_provider(Arc::new(Echo)));
    let generator = GenerationClient::new(
        llm.clone(),
        GenerationSettings {
            timeout: Duration::from_secs(5),
            fallback_max_tokens: 1500,
        },
    );
    let orchestrator = Arc::new(ExecutionOrchestrator::new(
        store.clone(),
        generator,
        config.engine.clone(),
    ));
    let state = AppState {
        config,
        store,
        llm,
        orchestrator,
        api_token_hash: token.map(|t| Sha256::digest(t.as_bytes()).to_vec()),
    };
    api::router(state.clone()).with_state(state)
}

async fn call(app: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(u) = user {
        req = req.header("x-user-id", u);
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn conversation_round_trip_over_http() {
    let app = app(None);

    let (status, agent) = call(
        &app,
        "POST",
        "/v1/agents",
        Some("7"),
        Some(json!({"name": "echo", "system_prompt": "Repeat."})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let agent_id = agent["id"].as_i64().unwrap();
    assert_eq!(agent["model"], "qwen-turbo");

    let (status, first) = call(
        &app,
        "POST",
        &format!("/v1/agents/{agent_id}/execute"),
        Some("7"),
        Some(json!({"input": "ping"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["output"], "echo: ping");
    assert_eq!(first["status"], "completed");
    let first_id = first["execution_id"].as_i64().unwrap();

    let (status, second) = call(
        &app,
        "POST",
        &format!("/v1/agents/{agent_id}/execute"),
        Some("7"),
        Some(json!({"input": "pong", "parent_execution_id": first_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second_id = second["execution_id"].as_i64().unwrap();

    let (status, chain) = call(
        &app,
        "GET",
        &format!("/v1/executions/{second_id}/chain"),
        Some("7"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chain["length"], 2);
    assert_eq!(chain["chain"][0]["id"], first_id);

    let (status, list) = call(
        &app,
        "GET",
        &format!("/v1/agents/{agent_id}/executions"),
        Some("7"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn errors_map_to_statuses() {
    let app = app(None);

    // No caller header.
    let (status, body) = call(&app, "GET", "/v1/agents", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    // Unknown agent.
    let (status, _) = call(
        &app,
        "POST",
        "/v1/agents/42/execute",
        Some("7"),
        Some(json!({"input": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Blank input on a real agent.
    let (_, agent) = call(
        &app,
        "POST",
        "/v1/agents",
        Some("7"),
        Some(json!({"name": "a", "system_prompt": "b"})),
    )
    .await;
    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/agents/{}/execute", agent["id"]),
        Some("7"),
        Some(json!({"input": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Someone else's agent looks absent.
    let (status, _) = call(&app, "GET", &format!("/v1/agents/{}", agent["id"]), Some("8"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bearer_token_guards_everything_but_health() {
    let app = app(Some("s3cret"));

    let (status, health) = call(&app, "GET", "/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["providers"], 1);

    let (status, _) = call(&app, "GET", "/v1/agents", Some("7"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/v1/models")
        .header("authorization", "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn bad_request_bodies_get_a_json_400() {
    let app = app(None);
    let (_, agent) = call(
        &app,
        "POST",
        "/v1/agents",
        Some("7"),
        Some(json!({"name": "a", "system_prompt": "b"})),
    )
    .await;

    // No input at all.
    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/agents/{}/execute", agent["id"]),
        Some("7"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("input"));

    // Draft missing its required fields.
    let (status, body) = call(&app, "POST", "/v1/agents", Some("7"), Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // Not JSON.
    let req = Request::builder()
        .method("POST")
        .uri("/v1/agents")
        .header("x-user-id", "7")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}
