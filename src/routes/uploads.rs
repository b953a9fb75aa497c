//! Serves stored photo blobs.

use crate::error::{AppError, Result};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/uploads/{file}", get(get_upload))
}

async fn get_upload(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse> {
    let (bytes, content_type) = state
        .photos
        .read(&file)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Upload {file}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=86400, immutable"),
        ],
        bytes,
    ))
}
