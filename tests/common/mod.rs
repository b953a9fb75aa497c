// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use std::sync::Arc;
use tower::ServiceExt;
use tracklog::config::Config;
use tracklog::db::Db;
use tracklog::routes::create_router;
use tracklog::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a Firestore-backed store against the emulator.
#[allow(dead_code)]
pub async fn test_db() -> Db {
    Db::firestore("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app over a fresh in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_frontend_url(frontend_url: &str) -> (axum::Router, Arc<AppState>) {
    let mut config = Config::test_default();
    config.frontend_url = frontend_url.to_string();
    create_test_app_with_config(config)
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::with_db(config, Db::memory()));
    (create_router(state.clone()), state)
}

/// Send a request with an optional JSON body and session cookie.
#[allow(dead_code)]
pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    session: Option<&str>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = session {
        builder = builder.header(header::COOKIE, format!("session_token={token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// All Set-Cookie header values of a response.
#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// Session token value from a login/exchange response.
#[allow(dead_code)]
pub fn session_from(response: &Response) -> String {
    set_cookie_headers(response)
        .iter()
        .find_map(|value| value.strip_prefix("session_token="))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_string)
        .expect("missing session cookie")
}

/// Register and log in, returning the session token.
#[allow(dead_code)]
pub async fn register_and_login(
    app: &axum::Router,
    email: &str,
    password: &str,
    name: &str,
) -> String {
    let response = send(
        app,
        "POST",
        "/api/auth/register",
        Some(serde_json::json!({ "email": email, "password": password, "name": name })),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(
        app,
        "POST",
        "/api/auth/login",
        Some(serde_json::json!({ "email": email, "password": password })),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    session_from(&response)
}

/// A minimal valid sighting body.
#[allow(dead_code)]
pub fn sighting_json(train_number: &str, date: &str) -> serde_json::Value {
    serde_json::json!({
        "train_number": train_number,
        "train_type": "Freight",
        "operator": "DB",
        "location": "Crewe",
        "date": date,
        "time": "10:00",
    })
}
