// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sighting routes. All require a session.

use crate::error::Result;
use crate::middleware::auth::AuthContext;
use crate::models::{Sighting, SightingFields, SightingStats, MAX_PHOTOS};
use crate::services::photos::MAX_PHOTO_BYTES;
use crate::services::sightings::filter;
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Room for the largest legal upload: every photo at the size cap, base64
/// encoded, plus data URL prefixes and the sighting fields.
const MAX_BODY_BYTES: usize = MAX_PHOTOS * (MAX_PHOTO_BYTES / 3 * 4 + 4 + 256) + 64 * 1024;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sightings", get(list_sightings).post(create_sighting))
        .route("/api/sightings/stats", get(get_stats))
        .route(
            "/api/sightings/{id}",
            get(get_sighting).delete(delete_sighting),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

#[derive(Deserialize)]
struct CreateSightingRequest {
    #[serde(flatten)]
    fields: SightingFields,
    /// Data URLs or external image URLs
    #[serde(default)]
    photos: Vec<String>,
}

async fn create_sighting(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<CreateSightingRequest>,
) -> Result<(StatusCode, Json<Sighting>)> {
    let sighting = state
        .sightings
        .create(&auth.user.user_id, &body.fields, &body.photos)
        .await?;
    Ok((StatusCode::CREATED, Json(sighting)))
}

#[derive(Deserialize)]
struct ListQuery {
    /// Search term over train number, operator, location and type
    q: Option<String>,
    limit: Option<usize>,
    skip: Option<usize>,
}

async fn list_sightings(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Sighting>>> {
    let sightings = state.sightings.list(&auth.user.user_id).await?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let page = filter(&sightings, params.q.as_deref())
        .into_iter()
        .skip(params.skip.unwrap_or(0))
        .take(limit)
        .collect();
    Ok(Json(page))
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<SightingStats>> {
    let stats = state
        .sightings
        .stats(&auth.user.user_id, chrono::Utc::now())
        .await?;
    Ok(Json(stats))
}

async fn get_sighting(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Sighting>> {
    Ok(Json(state.sightings.get(&auth.user.user_id, &id).await?))
}

async fn delete_sighting(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<super::auth::SuccessResponse>> {
    state.sightings.delete(&auth.user.user_id, &id).await?;
    Ok(Json(super::auth::SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::json;

    #[test]
    fn test_body_limit_admits_largest_legal_upload() {
        let photo = format!(
            "data:image/jpeg;base64,{}",
            STANDARD.encode(vec![0u8; MAX_PHOTO_BYTES])
        );
        let body = json!({
            "train_number": "66057",
            "train_type": "Freight",
            "operator": "DB",
            "location": "Crewe",
            "sighting_date": "2025-01-01",
            "sighting_time": "10:00",
            "notes": "n".repeat(2000),
            "photos": vec![photo; MAX_PHOTOS],
        });

        let size = serde_json::to_vec(&body).unwrap().len();
        assert!(size <= MAX_BODY_BYTES, "{size} > {MAX_BODY_BYTES}");
    }
}
