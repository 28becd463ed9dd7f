//! OpenAI-compatible adapter against a local axum server standing in for
//! the chat-completions endpoint.

use std::sync::Arc;
use std::time::Duration;

use ac_domain::config::{AuthConfig, LlmConfig, ProviderConfig, ProviderKind};
use ac_domain::error::Error;
use ac_domain::message::Message;
use ac_providers::{GenerationClient, GenerationSettings, ProviderRegistry};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Seen {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1")
}

fn llm_config(base_url: String, auth: AuthConfig, timeout_ms: u64) -> LlmConfig {
    LlmConfig {
        default_timeout_ms: timeout_ms,
        default_provider: Some("local".into()),
        providers: vec![ProviderConfig {
            id: "local".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url,
            auth,
            default_model: Some("qwen-turbo".into()),
        }],
    }
}

fn client(cfg: &LlmConfig, timeout: Duration) -> GenerationClient {
    let registry = ProviderRegistry::from_config(cfg).unwrap();
    GenerationClient::new(
        Arc::new(registry),
        GenerationSettings {
            timeout,
            fallback_max_tokens: 1500,
        },
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Success path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn sends_openai_body_and_returns_text() {
    let seen = Seen::default();
    let router = Router::new()
        .route(
            "/v1/chat/completions",
            post(|State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                seen.bodies.lock().push(body);
                seen.auth.lock().push(
                    headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from),
                );
                Json(json!({
                    "model": "qwen-turbo",
                    "choices": [{
                        "message": {"role": "assistant", "content": "Hi there!"},
                        "finish_reason": "stop"
                    }]
                }))
            }),
        )
        .with_state(seen.clone());
    let base = serve(router).await;

    let auth = AuthConfig {
        key: Some("sk-local".into()),
        ..Default::default()
    };
    let c = client(&llm_config(base, auth, 5_000), Duration::from_secs(5));
    let out = c
        .generate(
            "qwen-turbo",
            &[Message::system("You are helpful."), Message::user("Hello")],
            0.7,
            Some(1000),
        )
        .await
        .unwrap();
    assert_eq!(out, "Hi there!");

    let bodies = seen.bodies.lock();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["model"], "qwen-turbo");
    assert_eq!(body["max_tokens"], 1000);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "You are helpful.");
    assert_eq!(body["messages"][1]["role"], "user");
    let temp = body["temperature"].as_f64().unwrap();
    assert!((temp - 0.7).abs() < 1e-6);

    assert_eq!(seen.auth.lock()[0].as_deref(), Some("Bearer sk-local"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failure paths
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn non_success_status_is_upstream_with_status() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": {"message": "overloaded"}})),
            )
        }),
    );
    let base = serve(router).await;
    let c = client(
        &llm_config(base, AuthConfig::default(), 5_000),
        Duration::from_secs(5),
    );

    let err = c
        .generate("qwen-turbo", &[Message::user("Hello")], 0.7, None)
        .await
        .unwrap_err();
    match err {
        Error::Upstream { status, detail } => {
            assert_eq!(status, Some(503));
            assert!(detail.contains("overloaded"));
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_upstream() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(json!({"choices": []})) }),
    );
    let base = serve(router).await;
    let c = client(
        &llm_config(base, AuthConfig::default(), 5_000),
        Duration::from_secs(5),
    );

    let err = c
        .generate("qwen-turbo", &[Message::user("Hello")], 0.7, None)
        .await
        .unwrap_err();
    match err {
        Error::Upstream { status, detail } => {
            assert_eq!(status, None);
            assert!(detail.contains("no choices"));
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_service_hits_the_deadline() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({"choices": []}))
        }),
    );
    let base = serve(router).await;
    let c = client(
        &llm_config(base, AuthConfig::default(), 60_000),
        Duration::from_millis(200),
    );

    let err = c
        .generate("qwen-turbo", &[Message::user("Hello")], 0.7, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Upstream { status: None, .. }));
}
