// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes: password accounts, sessions and federated login.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::middleware::auth::{removal_cookie, session_cookie, session_token, AuthContext};
use crate::models::{ProfileUpdate, UserResponse};
use crate::services::IssuedSession;
use crate::AppState;

/// Routes reachable without a session.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session/exchange", get(exchange))
        .route("/api/auth/federated/start", get(federated_start))
        .route("/api/auth/federated/callback", get(federated_callback))
}

/// Routes requiring a session; the auth layer is applied in routes/mod.rs.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/profile", put(update_profile))
        .route("/api/auth/password", put(update_password))
        .route("/api/auth/account", delete(delete_account))
}

/// Body of every response that returns a user.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthResponse {
    pub user: UserResponse,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SuccessResponse {
    pub success: bool,
}

// ─── Password Accounts ───────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(email(message = "not a valid email address"))]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    name: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    body.validate()?;
    let user = state
        .credentials
        .register(&body.email, &body.password, &body.name)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserResponse::from(&user),
        }),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let issued = state.sessions.login(&body.email, &body.password).await?;
    Ok(with_session(&state, jar, issued))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Json<SuccessResponse>)> {
    let token = session_token(&jar, &headers);
    state.sessions.logout(token.as_deref()).await?;
    let jar = jar.add(removal_cookie(&state.config));
    Ok((jar, Json(SuccessResponse { success: true })))
}

// ─── Federated Login ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct ExchangeParams {
    #[serde(default)]
    code: String,
}

/// Trade the one-time code from the federated redirect for a session.
async fn exchange(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<ExchangeParams>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let issued = state.sessions.complete_federated_login(&params.code).await?;
    Ok(with_session(&state, jar, issued))
}

#[derive(Deserialize)]
pub struct FederatedStartParams {
    /// Frontend URL to return to; must be the configured frontend or localhost
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Start federated login - redirect to the identity provider.
async fn federated_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FederatedStartParams>,
    headers: HeaderMap,
) -> Result<Redirect> {
    let frontend_url = params
        .redirect_uri
        .filter(|uri| super::is_allowed_origin(uri, &state.config.frontend_url))
        .unwrap_or_else(|| state.config.frontend_url.clone());

    let callback_url = format!("{}/api/auth/federated/callback", request_base_url(&headers));
    let auth_url = state
        .sessions
        .begin_federated_login(&frontend_url, &callback_url)?;

    tracing::info!(frontend_url = %frontend_url, "Starting federated login");
    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct FederatedCallbackParams {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    state: String,
}

/// Provider callback - resolve the identity, hand the browser a one-time code.
async fn federated_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FederatedCallbackParams>,
) -> Result<Redirect> {
    let outcome = state
        .sessions
        .finish_provider_callback(&params.session_id, &params.state)
        .await?;

    let redirect = match outcome {
        Some((frontend_url, code)) => format!(
            "{}/auth/callback?code={}",
            frontend_url,
            urlencoding::encode(&code)
        ),
        None => {
            tracing::warn!("Invalid or tampered federated state");
            format!("{}/login?error=invalid_state", state.config.frontend_url)
        }
    };
    Ok(Redirect::temporary(&redirect))
}

// ─── Profile & Account ───────────────────────────────────────

async fn me(Extension(auth): Extension<AuthContext>) -> Json<AuthResponse> {
    Json(AuthResponse {
        user: UserResponse::from(&auth.user),
    })
}

#[derive(Deserialize, Validate)]
pub struct ProfileRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    name: Option<String>,
    #[validate(length(max = 2048, message = "too long"))]
    picture: Option<String>,
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<ProfileRequest>,
) -> Result<Json<AuthResponse>> {
    body.validate()?;
    let user = state
        .credentials
        .update_profile(
            &auth.user.user_id,
            ProfileUpdate {
                name: body.name,
                picture: body.picture,
            },
        )
        .await?;
    Ok(Json(AuthResponse {
        user: UserResponse::from(&user),
    }))
}

#[derive(Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    current_password: String,
    #[serde(default)]
    new_password: String,
}

async fn update_password(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<PasswordRequest>,
) -> Result<Json<SuccessResponse>> {
    state
        .credentials
        .update_password(&auth.user.user_id, &body.current_password, &body.new_password)
        .await
        .map_err(|e| match e {
            // A 401 here would read as "session gone" to the frontend
            AppError::InvalidCredentials => {
                AppError::Validation("current_password: does not match".to_string())
            }
            other => other,
        })?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Delete the account with all sessions, sightings and photos.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SuccessResponse>)> {
    tracing::info!(user_id = %auth.user.user_id, "User-initiated account deletion");
    state.credentials.delete_user(&auth.user.user_id).await?;
    let jar = jar.add(removal_cookie(&state.config));
    Ok((jar, Json(SuccessResponse { success: true })))
}

// ─── Helpers ─────────────────────────────────────────────────

fn with_session(
    state: &AppState,
    jar: CookieJar,
    issued: IssuedSession,
) -> (CookieJar, Json<AuthResponse>) {
    let jar = jar.add(session_cookie(&state.config, issued.token));
    (
        jar,
        Json(AuthResponse {
            user: UserResponse::from(&issued.user),
        }),
    )
}

/// Scheme and host this request arrived on.
fn request_base_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };
    format!("{}://{}", scheme, host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_base_url() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::HOST, HeaderValue::from_static("localhost:8080"));
        assert_eq!(request_base_url(&headers), "http://localhost:8080");

        headers.insert(axum::http::header::HOST, HeaderValue::from_static("api.tracklog.app"));
        assert_eq!(request_base_url(&headers), "https://api.tracklog.app");
    }
}
