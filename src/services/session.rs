// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager.
//!
//! Issues opaque bearer tokens, validates them with a sliding expiry,
//! revokes them on logout, and bridges federated logins through one-time
//! exchange codes. Only digests of tokens and codes reach the store.

use chrono::{DateTime, Duration, Utc};

use crate::db::Db;
use crate::error::AppError;
use crate::models::{CodeConsumption, PendingExchangeCode, Session, SessionState, User};
use crate::services::tokens;
use crate::services::{CredentialStore, FederatedProvider};

/// Sessions are re-extended at most this often.
fn extend_granularity() -> Duration {
    Duration::hours(1)
}

/// A freshly issued session. `token` is the only copy of the secret.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: Session,
    pub user: User,
}

#[derive(Clone)]
pub struct SessionManager {
    db: Db,
    credentials: CredentialStore,
    provider: FederatedProvider,
    ttl: Duration,
    code_ttl: Duration,
}

impl SessionManager {
    pub fn new(
        db: Db,
        credentials: CredentialStore,
        provider: FederatedProvider,
        ttl: Duration,
        code_ttl: Duration,
    ) -> Self {
        Self {
            db,
            credentials,
            provider,
            ttl,
            code_ttl,
        }
    }

    /// Password login.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, AppError> {
        let user = self.credentials.verify_password(email, password).await?;
        self.issue(user).await
    }

    /// Provider URL that starts a federated login.
    pub fn begin_federated_login(
        &self,
        frontend_url: &str,
        callback_url: &str,
    ) -> Result<String, AppError> {
        self.provider.authorization_url(frontend_url, callback_url)
    }

    /// Handle the provider's redirect back to us.
    ///
    /// Returns the frontend URL carried in the state and a fresh one-time
    /// code for the browser to exchange. `Ok(None)` means the state did
    /// not verify.
    pub async fn finish_provider_callback(
        &self,
        provider_session_id: &str,
        state: &str,
    ) -> Result<Option<(String, String)>, AppError> {
        let Some(frontend_url) = self.provider.verify_state(state) else {
            return Ok(None);
        };

        let identity = self.provider.resolve_session(provider_session_id).await?;

        let code = tokens::generate_secret()?;
        let now = Utc::now();
        self.db
            .insert_exchange_code(&PendingExchangeCode {
                code_hash: tokens::digest(&code),
                identity,
                created_at: now,
                expires_at: now + self.code_ttl,
                consumed: false,
            })
            .await?;

        tracing::debug!("Issued federated exchange code");
        Ok(Some((frontend_url, code)))
    }

    /// Trade a one-time code for a session. At most one caller wins per code.
    pub async fn complete_federated_login(&self, code: &str) -> Result<IssuedSession, AppError> {
        let consumption = self
            .db
            .consume_exchange_code(&tokens::digest(code), Utc::now())
            .await?;

        let identity = match consumption {
            CodeConsumption::Consumed(identity) => identity,
            CodeConsumption::AlreadyUsed => {
                tracing::warn!("Replayed federated exchange code");
                return Err(AppError::CodeAlreadyUsed);
            }
            CodeConsumption::Expired => return Err(AppError::ExpiredCode),
            CodeConsumption::Unknown => return Err(AppError::InvalidCode),
        };

        let user = self.credentials.upsert_federated_user(&identity).await?;
        self.issue(user).await
    }

    /// Resolve a bearer token to its user.
    ///
    /// Missing, unknown, expired and revoked tokens all yield `Ok(None)`, as
    /// does a session whose user no longer exists.
    pub async fn validate(&self, token: Option<&str>) -> Result<Option<User>, AppError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let now = Utc::now();
        let Some(session) = self.db.get_session(&tokens::digest(token)).await? else {
            return Ok(None);
        };
        match session.state(now) {
            SessionState::Active => {}
            SessionState::Expired => {
                if let Err(e) = self.db.delete_session(&session.token_hash).await {
                    tracing::warn!(error = %e, "Failed to delete expired session");
                }
                return Ok(None);
            }
            SessionState::Revoked => return Ok(None),
        }

        let Some(user) = self.db.get_user(&session.user_id).await? else {
            tracing::warn!(user_id = %session.user_id, "Session refers to missing user");
            return Ok(None);
        };

        if self.needs_extension(&session, now) {
            // Losing an extension only shortens the session; don't fail the request
            if let Err(e) = self.db.extend_session(&session.token_hash, now + self.ttl).await {
                tracing::warn!(error = %e, "Failed to extend session");
            }
        }

        Ok(Some(user))
    }

    /// Revoke a session. Unknown or already revoked tokens are fine.
    pub async fn logout(&self, token: Option<&str>) -> Result<(), AppError> {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.db.revoke_session(&tokens::digest(token)).await?;
        }
        Ok(())
    }

    /// Remove expired sessions and exchange codes from the store.
    pub async fn purge_expired(&self) -> Result<(), AppError> {
        let (sessions, codes) = self.db.purge_expired(Utc::now()).await?;
        if sessions > 0 || codes > 0 {
            tracing::info!(sessions, codes, "Purged expired credentials");
        }
        Ok(())
    }

    /// Session lifetime, used for cookie `Max-Age`.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn needs_extension(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session.expires_at < now + self.ttl - extend_granularity()
    }

    async fn issue(&self, user: User) -> Result<IssuedSession, AppError> {
        let token = tokens::generate_secret()?;
        let now = Utc::now();
        let session = Session {
            token_hash: tokens::digest(&token),
            user_id: user.user_id.clone(),
            created_at: now,
            expires_at: now + self.ttl,
            revoked: false,
        };
        self.db.insert_session(&session).await?;

        tracing::info!(user_id = %user.user_id, "Session issued");
        Ok(IssuedSession {
            token,
            session,
            user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::FederatedIdentity;
    use crate::services::PhotoStore;

    fn manager_with_db() -> (SessionManager, Db) {
        let config = Config::test_default();
        let db = Db::memory();
        let credentials = CredentialStore::new(db.clone(), PhotoStore::new(&config.upload_dir));
        let manager = SessionManager::new(
            db.clone(),
            credentials,
            FederatedProvider::new(&config),
            config.session_ttl,
            config.exchange_code_ttl,
        );
        (manager, db)
    }

    async fn seed_code(db: &Db, code: &str, expires_in: Duration) {
        let now = Utc::now();
        db.insert_exchange_code(&PendingExchangeCode {
            code_hash: tokens::digest(code),
            identity: FederatedIdentity {
                id: "g-42".to_string(),
                email: "fed@x.com".to_string(),
                name: "Fed".to_string(),
                picture: None,
            },
            created_at: now,
            expires_at: now + expires_in,
            consumed: false,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_login_validate_logout() {
        let (manager, _db) = manager_with_db();
        manager
            .credentials
            .register("bob@x.com", "secret1", "Bob")
            .await
            .unwrap();

        let issued = manager.login("bob@x.com", "secret1").await.unwrap();
        assert_ne!(issued.token, issued.session.token_hash);

        let user = manager.validate(Some(&issued.token)).await.unwrap().unwrap();
        assert_eq!(user.email, "bob@x.com");

        manager.logout(Some(&issued.token)).await.unwrap();
        assert!(manager.validate(Some(&issued.token)).await.unwrap().is_none());

        // Idempotent
        manager.logout(Some(&issued.token)).await.unwrap();
        manager.logout(Some("never-issued")).await.unwrap();
        manager.logout(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_validate_rejects_missing_unknown_and_expired() {
        let (manager, db) = manager_with_db();
        assert!(manager.validate(None).await.unwrap().is_none());
        assert!(manager.validate(Some("")).await.unwrap().is_none());
        assert!(manager.validate(Some("bogus")).await.unwrap().is_none());

        let user = manager
            .credentials
            .register("bob@x.com", "secret1", "Bob")
            .await
            .unwrap();
        let now = Utc::now();
        db.insert_session(&Session {
            token_hash: tokens::digest("stale"),
            user_id: user.user_id,
            created_at: now - Duration::days(10),
            expires_at: now - Duration::days(3),
            revoked: false,
        })
        .await
        .unwrap();
        assert!(manager.validate(Some("stale")).await.unwrap().is_none());
        // Expired sessions are dropped once seen
        assert!(db.get_session(&tokens::digest("stale")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoked_session_is_not_revived_by_extension() {
        let (manager, db) = manager_with_db();
        let user = manager
            .credentials
            .register("bob@x.com", "secret1", "Bob")
            .await
            .unwrap();
        let now = Utc::now();
        let session = Session {
            token_hash: tokens::digest("aging"),
            user_id: user.user_id,
            created_at: now - Duration::days(6),
            expires_at: now + Duration::days(1),
            revoked: false,
        };
        db.insert_session(&session).await.unwrap();

        // A logout lands between a request's session read and its extension
        manager.logout(Some("aging")).await.unwrap();
        db.extend_session(&session.token_hash, now + Duration::days(7))
            .await
            .unwrap();

        let stored = db.get_session(&session.token_hash).await.unwrap().unwrap();
        assert!(stored.revoked);
        assert!(manager.validate(Some("aging")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired_removes_stale_codes_and_sessions() {
        let (manager, db) = manager_with_db();
        let now = Utc::now();
        seed_code(&db, "fresh", Duration::minutes(5)).await;
        seed_code(&db, "stale", Duration::seconds(-1)).await;
        db.insert_session(&Session {
            token_hash: tokens::digest("old"),
            user_id: "user_x".to_string(),
            created_at: now - Duration::days(10),
            expires_at: now - Duration::days(3),
            revoked: true,
        })
        .await
        .unwrap();

        manager.purge_expired().await.unwrap();

        assert!(db.get_session(&tokens::digest("old")).await.unwrap().is_none());
        assert!(matches!(
            manager.complete_federated_login("stale").await,
            Err(AppError::InvalidCode)
        ));
        assert!(manager.complete_federated_login("fresh").await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_extends_sliding_expiry() {
        let (manager, db) = manager_with_db();
        let user = manager
            .credentials
            .register("bob@x.com", "secret1", "Bob")
            .await
            .unwrap();
        let now = Utc::now();
        db.insert_session(&Session {
            token_hash: tokens::digest("aging"),
            user_id: user.user_id,
            created_at: now - Duration::days(6),
            expires_at: now + Duration::days(1),
            revoked: false,
        })
        .await
        .unwrap();

        assert!(manager.validate(Some("aging")).await.unwrap().is_some());
        let session = db.get_session(&tokens::digest("aging")).await.unwrap().unwrap();
        assert!(session.expires_at > now + Duration::days(6));
    }

    #[tokio::test]
    async fn test_session_of_deleted_user_is_invalid() {
        let (manager, _db) = manager_with_db();
        manager
            .credentials
            .register("bob@x.com", "secret1", "Bob")
            .await
            .unwrap();
        let issued = manager.login("bob@x.com", "secret1").await.unwrap();

        manager.credentials.delete_user(&issued.user.user_id).await.unwrap();
        assert!(manager.validate(Some(&issued.token)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exchange_code_is_single_use() {
        let (manager, db) = manager_with_db();
        seed_code(&db, "code-1", Duration::minutes(5)).await;

        let issued = manager.complete_federated_login("code-1").await.unwrap();
        assert_eq!(issued.user.email, "fed@x.com");

        assert!(matches!(
            manager.complete_federated_login("code-1").await,
            Err(AppError::CodeAlreadyUsed)
        ));
        assert!(matches!(
            manager.complete_federated_login("code-unknown").await,
            Err(AppError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn test_expired_exchange_code() {
        let (manager, db) = manager_with_db();
        seed_code(&db, "late", Duration::seconds(-1)).await;
        assert!(matches!(
            manager.complete_federated_login("late").await,
            Err(AppError::ExpiredCode)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_exchange_yields_one_session() {
        let (manager, db) = manager_with_db();
        seed_code(&db, "race", Duration::minutes(5)).await;

        let a = tokio::spawn({
            let manager = manager.clone();
            async move { manager.complete_federated_login("race").await }
        });
        let b = tokio::spawn({
            let manager = manager.clone();
            async move { manager.complete_federated_login("race").await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        let sessions = results.iter().filter(|r| r.is_ok()).count();
        let replays = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::CodeAlreadyUsed)))
            .count();
        assert_eq!((sessions, replays), (1, 1));
    }

    #[tokio::test]
    async fn test_callback_with_bad_state_issues_nothing() {
        let (manager, _db) = manager_with_db();
        let result = manager
            .finish_provider_callback("provider-session", "tampered")
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
