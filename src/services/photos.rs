// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Photo blob storage on the local filesystem.
//!
//! The service never looks at pixels: an inline photo is a base64 data URL
//! that gets written as-is under the upload directory and referenced as
//! `/api/uploads/<file>`. External `http(s)` URLs are kept verbatim.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;

use crate::error::AppError;

/// Path prefix of references to blobs this service owns.
pub const UPLOAD_PREFIX: &str = "/api/uploads/";

/// Largest accepted decoded photo.
pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

/// Filesystem-backed photo store.
#[derive(Clone)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist one inbound photo and return its reference.
    pub async fn store(
        &self,
        sighting_id: &str,
        index: usize,
        photo: &str,
    ) -> Result<String, AppError> {
        if photo.starts_with("https://") || photo.starts_with("http://") {
            return Ok(photo.to_string());
        }

        let (ext, bytes) = decode_data_url(photo)
            .ok_or_else(|| AppError::Validation(format!("photos[{index}]: unsupported format")))?;
        if bytes.len() > MAX_PHOTO_BYTES {
            return Err(AppError::Validation(format!(
                "photos[{index}]: larger than {} bytes",
                MAX_PHOTO_BYTES
            )));
        }

        let filename = format!("{sighting_id}_{index}.{ext}");
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Upload dir unavailable: {}", e)))?;
        tokio::fs::write(self.dir.join(&filename), &bytes)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to write photo: {}", e)))?;

        tracing::debug!(sighting_id, index, size = bytes.len(), "Stored photo");
        Ok(format!("{UPLOAD_PREFIX}{filename}"))
    }

    /// Remove the blobs behind owned references; external URLs are skipped.
    ///
    /// Failures are logged rather than returned so a missing file never
    /// blocks deleting the record that pointed at it.
    pub async fn delete_refs(&self, refs: &[String]) {
        for reference in refs {
            let Some(filename) = owned_filename(reference) else {
                continue;
            };
            match tokio::fs::remove_file(self.dir.join(filename)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(error = %e, file = filename, "Failed to delete photo"),
            }
        }
    }

    /// Read a stored blob by file name, with its content type.
    pub async fn read(&self, filename: &str) -> Result<Option<(Vec<u8>, &'static str)>, AppError> {
        if !is_safe_filename(filename) {
            return Ok(None);
        }
        match tokio::fs::read(self.dir.join(filename)).await {
            Ok(bytes) => Ok(Some((bytes, content_type(filename)))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Internal(anyhow::anyhow!(
                "Failed to read photo: {}",
                e
            ))),
        }
    }
}

/// Split `data:image/<type>;base64,<payload>` into extension and bytes.
fn decode_data_url(photo: &str) -> Option<(&'static str, Vec<u8>)> {
    let rest = photo.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let ext = match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => return None,
    };
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    Some((ext, bytes))
}

fn owned_filename(reference: &str) -> Option<&str> {
    reference
        .strip_prefix(UPLOAD_PREFIX)
        .filter(|name| is_safe_filename(name))
}

fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("jpg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
