// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! External identity provider client.
//!
//! The provider owns the login page. We send the browser there with a signed
//! state, and the provider comes back with a short-lived session id that we
//! resolve server-side into a [`FederatedIdentity`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::Config;
use crate::error::AppError;
use crate::models::FederatedIdentity;

type HmacSha256 = Hmac<Sha256>;

/// Signed state older than this is refused.
const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

/// Session payload returned by the provider.
#[derive(Debug, Deserialize)]
struct ProviderSession {
    id: String,
    email: String,
    name: String,
    #[serde(default)]
    picture: Option<String>,
}

#[derive(Clone)]
pub struct FederatedProvider {
    http: reqwest::Client,
    auth_url: String,
    session_url: String,
    state_key: Vec<u8>,
}

impl FederatedProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: config.federated_auth_url.clone(),
            session_url: config.federated_session_url.clone(),
            state_key: config.oauth_state_key.clone(),
        }
    }

    /// Provider login URL that returns to `callback_url` with signed state.
    pub fn authorization_url(
        &self,
        frontend_url: &str,
        callback_url: &str,
    ) -> Result<String, AppError> {
        let state = self.sign_state(frontend_url, now_millis()?)?;
        let separator = if self.auth_url.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{}{}redirect={}&state={}",
            self.auth_url,
            separator,
            urlencoding::encode(callback_url),
            state
        ))
    }

    /// Encode `frontend_url|timestamp_hex|signature_hex` as base64url.
    pub fn sign_state(&self, frontend_url: &str, timestamp_ms: u128) -> Result<String, AppError> {
        let payload = format!("{}|{:x}", frontend_url, timestamp_ms);
        let signature = self.mac(&payload)?;
        let signed = format!("{}|{}", payload, hex::encode(signature));
        Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
    }

    /// Verify a state value and return the frontend URL it carries.
    pub fn verify_state(&self, state: &str) -> Option<String> {
        self.verify_state_at(state, now_millis().ok()?)
    }

    fn verify_state_at(&self, state: &str, now_ms: u128) -> Option<String> {
        let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
        let state_str = String::from_utf8(bytes).ok()?;

        // Split from the right: the URL itself may not contain '|' but be strict anyway
        let mut parts = state_str.rsplitn(3, '|');
        let signature_hex = parts.next()?;
        let timestamp_hex = parts.next()?;
        let frontend_url = parts.next()?;

        let payload = format!("{}|{}", frontend_url, timestamp_hex);
        let expected = self.mac(&payload).ok()?;
        let provided = hex::decode(signature_hex).ok()?;
        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            tracing::warn!("Federated state signature mismatch");
            return None;
        }

        let issued_ms = u128::from_str_radix(timestamp_hex, 16).ok()?;
        if now_ms.saturating_sub(issued_ms) > STATE_MAX_AGE_MS {
            tracing::warn!("Federated state expired");
            return None;
        }

        Some(frontend_url.to_string())
    }

    /// Resolve a provider session id into the identity it represents.
    pub async fn resolve_session(&self, session_id: &str) -> Result<FederatedIdentity, AppError> {
        let response = self
            .http
            .get(&self.session_url)
            .header("X-Session-ID", session_id)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Session lookup failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(status = %status, "Identity provider rejected session");
            return Err(AppError::Provider(format!("HTTP {}", status)));
        }

        let session: ProviderSession = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Malformed session payload: {}", e)))?;

        if session.id.is_empty() || session.email.trim().is_empty() {
            return Err(AppError::Provider("Session payload missing identity".to_string()));
        }

        Ok(FederatedIdentity {
            id: session.id,
            email: session.email.trim().to_string(),
            name: session.name,
            picture: session.picture,
        })
    }

    fn mac(&self, payload: &str) -> Result<Vec<u8>, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.state_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn now_millis() -> Result<u128, AppError> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}
