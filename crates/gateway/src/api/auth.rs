//! Bearer-token gate for the protected API.
//!
//! The token named by `config.server.api_token_env` (default `AC_API_TOKEN`)
//! is hashed once at startup (see `bootstrap`). When it is absent the gate is
//! open and only the caller header identifies users.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::error::ApiError;
use crate::state::AppState;

/// Compare the bearer token in `headers` against the expected SHA-256
/// digest. Hashing first keeps the comparison fixed-length, so it leaks
/// neither content nor length.
pub fn bearer_matches(headers: &HeaderMap, expected_hash: &[u8]) -> bool {
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    let provided_hash = Sha256::digest(provided.as_bytes());
    bool::from(provided_hash.ct_eq(expected_hash))
}

/// Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token_hash.as_deref() else {
        return next.run(req).await;
    };
    if !bearer_matches(req.headers(), expected) {
        return ApiError::new(StatusCode::UNAUTHORIZED, "invalid or missing API token")
            .into_response();
    }
    next.run(req).await
}
