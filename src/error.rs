// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid field: {0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("Account uses federated sign-in and has no password")]
    FederatedAccount,

    #[error("Login code expired")]
    ExpiredCode,

    #[error("Login code already used")]
    CodeAlreadyUsed,

    #[error("Unknown login code")]
    InvalidCode,

    #[error("Too many photos: {0} (max {max})", max = crate::models::MAX_PHOTOS)]
    TooManyPhotos(usize),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                Some(msg.clone()),
            ),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated", None),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                Some(self.to_string()),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::DuplicateEmail => (
                StatusCode::CONFLICT,
                "duplicate_email",
                Some(self.to_string()),
            ),
            AppError::WeakPassword(_) => (
                StatusCode::BAD_REQUEST,
                "weak_password",
                Some(self.to_string()),
            ),
            AppError::FederatedAccount => (
                StatusCode::FORBIDDEN,
                "federated_account",
                Some(self.to_string()),
            ),
            AppError::ExpiredCode => (StatusCode::BAD_REQUEST, "expired_code", None),
            AppError::CodeAlreadyUsed => (StatusCode::BAD_REQUEST, "code_already_used", None),
            AppError::InvalidCode => (StatusCode::BAD_REQUEST, "invalid_code", None),
            AppError::TooManyPhotos(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "too_many_photos",
                Some(self.to_string()),
            ),
            AppError::Provider(msg) => {
                tracing::warn!(error = %msg, "Identity provider error");
                (StatusCode::BAD_GATEWAY, "provider_error", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Request DTO validation failures name the first offending field.
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let message = fields
            .first()
            .map(|(field, errs)| match errs.first().and_then(|e| e.message.as_ref()) {
                Some(msg) => format!("{field}: {msg}"),
                None => format!("{field} is invalid"),
            })
            .unwrap_or_else(|| "request is invalid".to_string());
        AppError::Validation(message)
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
