// ===================================
// tests/integration/http_flow_tests.rs
// ===================================
//! Full HTTP round trips against `create_router`
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use keyward_lib::config::WindowLimit;
use keyward_lib::router::create_router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::test_utils::{setup_test_env, setup_test_env_with, test_settings, TestEnv};

const PEER: &str = "192.0.2.10:51000";

struct Call<'a> {
    method: Method,
    uri: &'a str,
    body: Option<Value>,
    bearer: Option<&'a str>,
    api_key: Option<&'a str>,
}

impl<'a> Call<'a> {
    fn get(uri: &'a str) -> Self {
        Self {
            method: Method::GET,
            uri,
            body: None,
            bearer: None,
            api_key: None,
        }
    }

    fn post(uri: &'a str, body: Value) -> Self {
        Self {
            method: Method::POST,
            uri,
            body: Some(body),
            bearer: None,
            api_key: None,
        }
    }

    fn bearer(mut self, token: &'a str) -> Self {
        self.bearer = Some(token);
        self
    }

    fn api_key(mut self, key: &'a str) -> Self {
        self.api_key = Some(key);
        self
    }
}

async fn send(app: &Router, call: Call<'_>) -> (StatusCode, Value) {
    let peer: SocketAddr = PEER.parse().unwrap();
    let mut builder = Request::builder()
        .method(call.method)
        .uri(call.uri)
        .extension(ConnectInfo(peer));
    if let Some(token) = call.bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(key) = call.api_key {
        builder = builder.header("x-api-key", key);
    }
    let request = match call.body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn register_body() -> Value {
    json!({
        "email": "grace@example.com",
        "name": "Grace Hopper",
        "password": "secret123",
        "confirm_password": "secret123",
    })
}

fn login_body(password: &str) -> Value {
    json!({ "email": "grace@example.com", "password": password })
}

fn app(env: &TestEnv) -> Router {
    create_router(env.state.clone())
}

#[tokio::test]
async fn test_health() {
    let env = setup_test_env();
    let (status, body) = send(&app(&env), Call::get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_account_lifecycle_over_http() {
    let env = setup_test_env();
    let app = app(&env);

    let (status, body) = send(&app, Call::post("/auth/register", register_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "unverified");
    assert!(body.get("password_hash").is_none());

    let token = env.mailer.last_token().unwrap();
    let uri = format!("/auth/verify-email?token={token}");
    let (status, _) = send(&app, Call::get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Call::get(&uri)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Call::post("/auth/login", login_body("wrong-password"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_001");

    let (status, login) = send(&app, Call::post("/auth/login", login_body("secret123"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["token_type"], "Bearer");
    assert_eq!(login["user"]["status"], "active");
    let access = login["access_token"].as_str().unwrap().to_string();
    let refresh = login["refresh_token"].as_str().unwrap().to_string();

    let (status, me) = send(&app, Call::get("/auth/me").bearer(&access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "grace@example.com");

    let (status, _) = send(&app, Call::get("/auth/me")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, Call::get("/auth/me").bearer(&refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, pair) = send(
        &app,
        Call::post("/auth/refresh", json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rotated = pair["access_token"].as_str().unwrap();
    let (status, _) = send(&app, Call::get("/auth/me").bearer(rotated)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_forgot_password_does_not_leak_accounts() {
    let env = setup_test_env();
    let app = app(&env);

    let (status, unknown) = send(
        &app,
        Call::post("/auth/forgot-password", json!({ "email": "nobody@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    send(&app, Call::post("/auth/register", register_body())).await;
    let (status, known) = send(
        &app,
        Call::post("/auth/forgot-password", json!({ "email": "grace@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unknown, known);

    let token = env.mailer.last_token().unwrap();
    let (status, _) = send(
        &app,
        Call::post(
            "/auth/reset-password",
            json!({ "token": token, "new_password": "another-pass", "confirm_password": "another-pass" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Call::post("/auth/login", login_body("another-pass"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_endpoint_rate_limit_override() {
    let mut settings = test_settings();
    settings
        .rate_limit
        .endpoints
        .insert("post.auth_login".to_string(), WindowLimit { max: 2, window_secs: 60 });
    let env = setup_test_env_with(&settings);
    let app = app(&env);

    for _ in 0..2 {
        let (status, _) = send(&app, Call::post("/auth/login", login_body("secret123"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = send(&app, Call::post("/auth/login", login_body("secret123"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_001");

    // Other endpoints keep the default limit
    let (status, _) = send(
        &app,
        Call::post("/auth/forgot-password", json!({ "email": "grace@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Health checks are never limited
    for _ in 0..5 {
        let (status, _) = send(&app, Call::get("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_required_api_key() {
    let mut settings = test_settings();
    settings.api_keys.required = true;
    settings.api_keys.master_key = Some("ops-master-key".to_string());
    let env = setup_test_env_with(&settings);
    let app = app(&env);

    let (status, body) = send(&app, Call::post("/auth/register", register_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "KEY_001");

    let (status, _) = send(
        &app,
        Call::post("/auth/register", register_body()).api_key("wrong"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Call::post("/auth/register", register_body()).api_key("ops-master-key"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, Call::get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}
