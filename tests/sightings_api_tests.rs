// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sighting CRUD, ownership, photos and stats over the HTTP API.

use axum::http::{header, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

mod common;
use common::{body_json, register_and_login, send, sighting_json};

fn photo(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

fn with_photos(mut body: Value, photos: Vec<String>) -> Value {
    body["photos"] = json!(photos);
    body
}

async fn create(app: &axum::Router, token: &str, body: Value) -> Value {
    let response = send(app, "POST", "/api/sightings", Some(body), Some(token)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn test_stats_scenario() {
    let (app, _) = common::create_test_app();
    let token = register_and_login(&app, "bob@x.com", "secret1", "Bob").await;

    create(&app, &token, sighting_json("66057", "2025-01-01")).await;

    let response = send(&app, "GET", "/api/sightings/stats", None, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["total_sightings"], 1);
    assert_eq!(stats["unique_locations"], 1);
    assert_eq!(stats["unique_trains"], 1);
    assert_eq!(stats["last_sighting"], "2025-01-01");
    assert_eq!(stats["top_train_types"], json!([{ "name": "Freight", "count": 1 }]));
}

#[tokio::test]
async fn test_sightings_require_session() {
    let (app, _) = common::create_test_app();
    for (method, uri) in [
        ("GET", "/api/sightings"),
        ("POST", "/api/sightings"),
        ("GET", "/api/sightings/stats"),
        ("GET", "/api/sightings/sighting_x"),
        ("DELETE", "/api/sightings/sighting_x"),
    ] {
        let response = send(&app, method, uri, None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_create_validates_required_fields() {
    let (app, _) = common::create_test_app();
    let token = register_and_login(&app, "bob@x.com", "secret1", "Bob").await;

    let mut body = sighting_json("66057", "2025-01-01");
    body["operator"] = json!("   ");
    let response = send(&app, "POST", "/api/sightings", Some(body), Some(&token)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["details"], "operator is required");

    let body = sighting_json("66057", "2025-02-30");
    let response = send(&app, "POST", "/api/sightings", Some(body), Some(&token)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_owner_is_taken_from_session() {
    let (app, _) = common::create_test_app();
    let token = register_and_login(&app, "bob@x.com", "secret1", "Bob").await;
    let me = body_json(send(&app, "GET", "/api/auth/me", None, Some(&token)).await).await;

    let mut body = sighting_json("66057", "2025-01-01");
    body["user_id"] = json!("user_somebody_else");
    let created = create(&app, &token, body).await;
    assert_eq!(created["user_id"], me["user"]["user_id"]);
}

#[tokio::test]
async fn test_list_is_scoped_and_ordered() {
    let (app, _) = common::create_test_app();
    let alice = register_and_login(&app, "alice@x.com", "secret1", "Alice").await;
    let bob = register_and_login(&app, "bob@x.com", "secret1", "Bob").await;

    create(&app, &alice, sighting_json("1", "2024-12-31")).await;
    create(&app, &alice, sighting_json("2", "2025-03-01")).await;
    create(&app, &alice, sighting_json("3", "2025-03-01")).await;
    create(&app, &bob, sighting_json("99", "2025-06-01")).await;

    let response = send(&app, "GET", "/api/sightings", None, Some(&alice)).await;
    let listed = body_json(response).await;
    let numbers: Vec<_> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["train_number"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(numbers, vec!["3", "2", "1"]);

    // Paging and search apply after ordering
    let response = send(&app, "GET", "/api/sightings?skip=1&limit=1", None, Some(&alice)).await;
    assert_eq!(body_json(response).await[0]["train_number"], "2");

    let response = send(&app, "GET", "/api/sightings?q=99", None, Some(&alice)).await;
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn test_photo_limit() {
    let (app, _) = common::create_test_app();
    let token = register_and_login(&app, "bob@x.com", "secret1", "Bob").await;

    let six = vec![photo(b"img"); 6];
    let response = send(
        &app,
        "POST",
        "/api/sightings",
        Some(with_photos(sighting_json("1", "2025-01-01"), six)),
        Some(&token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["error"], "too_many_photos");

    let five = vec![photo(b"img"); 5];
    let created = create(
        &app,
        &token,
        with_photos(sighting_json("1", "2025-01-01"), five),
    )
    .await;
    assert_eq!(created["photos"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_uploaded_photo_is_served() {
    let (app, _) = common::create_test_app();
    let token = register_and_login(&app, "bob@x.com", "secret1", "Bob").await;

    let created = create(
        &app,
        &token,
        with_photos(
            sighting_json("1", "2025-01-01"),
            vec![photo(b"\x89PNG fake"), "https://cdn.example.com/a.jpg".to_string()],
        ),
    )
    .await;
    let local = created["photos"][0].as_str().unwrap().to_string();
    assert!(local.starts_with("/api/uploads/"));
    assert_eq!(created["photos"][1], "https://cdn.example.com/a.jpg");

    let response = send(&app, "GET", &local, None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"\x89PNG fake");
}

#[tokio::test]
async fn test_delete_and_ownership() {
    let (app, _) = common::create_test_app();
    let owner = register_and_login(&app, "owner@x.com", "secret1", "Owner").await;
    let intruder = register_and_login(&app, "intruder@x.com", "secret1", "Intruder").await;

    let created = create(
        &app,
        &owner,
        with_photos(sighting_json("1", "2025-01-01"), vec![photo(b"img")]),
    )
    .await;
    let id = created["sighting_id"].as_str().unwrap();
    let uri = format!("/api/sightings/{id}");
    let photo_uri = created["photos"][0].as_str().unwrap().to_string();

    // Another user's sighting looks exactly like a missing one
    let foreign = send(&app, "DELETE", &uri, None, Some(&intruder)).await;
    let missing = send(&app, "DELETE", "/api/sightings/sighting_nope", None, Some(&intruder)).await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(foreign).await["error"],
        body_json(missing).await["error"]
    );
    let response = send(&app, "GET", &uri, None, Some(&intruder)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Still there for the owner
    let response = send(&app, "GET", &uri, None, Some(&owner)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, "DELETE", &uri, None, Some(&owner)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let listed = body_json(send(&app, "GET", "/api/sightings", None, Some(&owner)).await).await;
    assert_eq!(listed, json!([]));
    let response = send(&app, "GET", &photo_uri, None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "DELETE", &uri, None, Some(&owner)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deletes_single_success() {
    let (app, _) = common::create_test_app();
    let token = register_and_login(&app, "bob@x.com", "secret1", "Bob").await;
    let created = create(&app, &token, sighting_json("1", "2025-01-01")).await;
    let uri = format!("/api/sightings/{}", created["sighting_id"].as_str().unwrap());

    let (a, b) = tokio::join!(
        send(&app, "DELETE", &uri, None, Some(&token)),
        send(&app, "DELETE", &uri, None, Some(&token))
    );
    let mut statuses = [a.status(), b.status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::NOT_FOUND]);
}

#[tokio::test]
async fn test_upload_path_traversal_is_rejected() {
    let (app, _) = common::create_test_app();
    let response = send(&app, "GET", "/api/uploads/..%2Fsecret", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
