#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use emtprep_api::{
    config::{Config, KvBackend},
    create_router,
    kv::MemoryKv,
    middlewares::auth::{JwtClaims, JwtService},
    services::AppState,
};
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test-secret-for-integration-tests";

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        kv_backend: KvBackend::Memory,
        redis_uri: "redis://127.0.0.1:6379/0".to_string(),
        kv_namespace: "emtprep-test".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        lookback_days: 30,
        commit_retries: 3,
    }
}

/// Router over a fresh in-memory store.
pub fn create_test_app() -> Router {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let state = AppState::with_kv(test_config(), Arc::new(MemoryKv::new()));
    create_router(Arc::new(state))
}

pub fn token_for(user_id: &str, role: &str) -> String {
    JwtService::new(TEST_JWT_SECRET)
        .generate_token(&JwtClaims::new(user_id, role, 3600))
        .expect("token generation")
}

/// Sends one request and returns the status with the body parsed as JSON
/// (`Value::Null` for empty bodies).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            panic!(
                "non-JSON body for {} {}: {}",
                method,
                uri,
                String::from_utf8_lossy(&bytes)
            )
        })
    };
    (status, json)
}
