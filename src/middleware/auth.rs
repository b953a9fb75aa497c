// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session authentication middleware and cookie helpers.

use crate::config::Config;
use crate::error::AppError;
use crate::models::User;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session_token";

/// Identity of the caller, attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    /// Raw bearer token, needed for logout
    pub token: String,
}

/// Pull the session token from the cookie, falling back to a Bearer header.
pub fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

/// Middleware that requires a valid session.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(&jar, request.headers()).ok_or(AppError::Unauthenticated)?;

    let user = state
        .sessions
        .validate(Some(&token))
        .await?
        .ok_or(AppError::Unauthenticated)?;

    request.extensions_mut().insert(AuthContext { user, token });

    Ok(next.run(request).await)
}

/// Session cookie carrying `token` for the configured lifetime.
pub fn session_cookie(config: &Config, token: String) -> Cookie<'static> {
    let max_age = time::Duration::seconds(config.session_ttl.num_seconds());
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies())
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

/// Cookie that clears the session cookie with matching attributes.
pub fn removal_cookie(config: &Config) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies())
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .build()
}
