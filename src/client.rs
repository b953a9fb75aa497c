// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed HTTP client for the Tracklog API.
//!
//! Holds the session token it receives from login/exchange and sends it
//! back as a Bearer header. The federated callback is guarded by an
//! [`ExchangeLatch`] so a callback delivered twice only exchanges once.

use axum_extra::extract::cookie::Cookie;
use reqwest::{header, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::middleware::auth::SESSION_COOKIE;
use crate::models::{Sighting, SightingFields, SightingStats, UserResponse};
use crate::services::ExchangeLatch;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {error}")]
    Api {
        status: StatusCode,
        error: String,
        details: Option<String>,
    },

    #[error("Server did not return a session cookie")]
    MissingSession,
}

impl ClientError {
    /// Machine-readable error code from the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: UserResponse,
}

#[derive(Serialize)]
struct CreateSightingBody<'a> {
    #[serde(flatten)]
    fields: &'a SightingFields,
    photos: &'a [String],
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
    latch: ExchangeLatch,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
            latch: ExchangeLatch::new(),
        }
    }

    pub async fn is_logged_in(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<UserResponse, ClientError> {
        let body = serde_json::json!({ "email": email, "password": password, "name": name });
        let response = self
            .request(Method::POST, "/api/auth/register")
            .await
            .json(&body)
            .send()
            .await?;
        Ok(parse::<UserEnvelope>(response).await?.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserResponse, ClientError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self
            .request(Method::POST, "/api/auth/login")
            .await
            .json(&body)
            .send()
            .await?;
        self.adopt_session(response).await
    }

    /// Exchange a one-time code from the federated redirect.
    ///
    /// Returns `Ok(None)` without contacting the server when this code has
    /// already been handled by this client.
    pub async fn complete_federated_login(
        &self,
        code: &str,
    ) -> Result<Option<UserResponse>, ClientError> {
        if !self.latch.try_claim(code) {
            tracing::debug!("Ignoring repeated federated callback");
            return Ok(None);
        }
        let response = self
            .request(Method::GET, "/api/auth/session/exchange")
            .await
            .query(&[("code", code)])
            .send()
            .await?;
        self.adopt_session(response).await.map(Some)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, "/api/auth/logout")
            .await
            .send()
            .await?;
        check(response).await?;
        *self.token.write().await = None;
        Ok(())
    }

    pub async fn me(&self) -> Result<UserResponse, ClientError> {
        let response = self.request(Method::GET, "/api/auth/me").await.send().await?;
        Ok(parse::<UserEnvelope>(response).await?.user)
    }

    pub async fn create_sighting(
        &self,
        fields: &SightingFields,
        photos: &[String],
    ) -> Result<Sighting, ClientError> {
        let response = self
            .request(Method::POST, "/api/sightings")
            .await
            .json(&CreateSightingBody { fields, photos })
            .send()
            .await?;
        parse(response).await
    }

    pub async fn list_sightings(&self, search: Option<&str>) -> Result<Vec<Sighting>, ClientError> {
        let mut request = self.request(Method::GET, "/api/sightings").await;
        if let Some(q) = search {
            request = request.query(&[("q", q)]);
        }
        parse(request.send().await?).await
    }

    pub async fn delete_sighting(&self, sighting_id: &str) -> Result<(), ClientError> {
        let path = format!("/api/sightings/{}", urlencoding::encode(sighting_id));
        let response = self.request(Method::DELETE, &path).await.send().await?;
        check(response).await.map(|_| ())
    }

    pub async fn stats(&self) -> Result<SightingStats, ClientError> {
        let response = self
            .request(Method::GET, "/api/sightings/stats")
            .await
            .send()
            .await?;
        parse(response).await
    }

    async fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match self.token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn adopt_session(&self, response: reqwest::Response) -> Result<UserResponse, ClientError> {
        let response = check(response).await?;
        let token = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| Cookie::parse(value.to_string()).ok())
            .find(|cookie| cookie.name() == SESSION_COOKIE && !cookie.value().is_empty())
            .map(|cookie| cookie.value().to_string())
            .ok_or(ClientError::MissingSession)?;

        let user = response.json::<UserEnvelope>().await?.user;
        *self.token.write().await = Some(token);
        Ok(user)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.json::<ErrorBody>().await.ok();
    Err(ClientError::Api {
        status,
        error: body
            .as_ref()
            .map(|b| b.error.clone())
            .unwrap_or_else(|| status.to_string()),
        details: body.and_then(|b| b.details),
    })
}

async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    Ok(check(response).await?.json::<T>().await?)
}
