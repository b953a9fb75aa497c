// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session cookie attribute tests.
//!
//! These tests verify the cookie set at login and the removal cookie set at
//! logout carry matching attributes for localhost and production-style
//! frontends.

use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::{send, set_cookie_headers};

fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

async fn login_cookie(app: &axum::Router) -> String {
    send(
        app,
        "POST",
        "/api/auth/register",
        Some(json!({ "email": "bob@x.com", "password": "secret1", "name": "Bob" })),
        None,
    )
    .await;
    let response = send(
        app,
        "POST",
        "/api/auth/login",
        Some(json!({ "email": "bob@x.com", "password": "secret1" })),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    find_cookie(&set_cookie_headers(&response), "session_token")
}

#[tokio::test]
async fn test_login_cookie_localhost_attributes() {
    let (app, _) = common::create_test_app_with_frontend_url("http://localhost:5173");
    let cookie = login_cookie(&app).await;

    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains(&format!("Max-Age={}", 7 * 24 * 60 * 60)));
    assert!(!cookie.contains("Secure"));
    assert!(!cookie.contains("Domain="));
}

#[tokio::test]
async fn test_login_cookie_production_is_secure() {
    let (app, _) = common::create_test_app_with_frontend_url("https://tracklog.example.com");
    let cookie = login_cookie(&app).await;

    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("SameSite=Lax"));
}

#[tokio::test]
async fn test_logout_cookie_removal_matches_creation() {
    for frontend in ["http://localhost:5173", "https://tracklog.example.com"] {
        let (app, _) = common::create_test_app_with_frontend_url(frontend);
        let created = login_cookie(&app).await;

        let response = send(&app, "POST", "/api/auth/logout", None, Some("whatever")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let removal = find_cookie(&set_cookie_headers(&response), "session_token");

        assert!(removal.starts_with("session_token=;"));
        assert!(removal.contains("Max-Age=0"));
        for attribute in ["Path=/", "HttpOnly", "SameSite=Lax", "Secure"] {
            assert_eq!(
                created.contains(attribute),
                removal.contains(attribute),
                "{attribute} mismatch for {frontend}"
            );
        }
    }
}
