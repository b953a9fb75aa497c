// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential store: registration, password checks, federated linking,
//! profile updates and account deletion.

use chrono::Utc;
use validator::ValidateEmail;

use crate::db::Db;
use crate::error::AppError;
use crate::models::{FederatedIdentity, ProfileUpdate, User};
use crate::services::password::{self, MIN_PASSWORD_LEN};
use crate::services::PhotoStore;

/// Longest accepted display name.
const MAX_NAME_LEN: usize = 100;

#[derive(Clone)]
pub struct CredentialStore {
    db: Db,
    photos: PhotoStore,
}

impl CredentialStore {
    pub fn new(db: Db, photos: PhotoStore) -> Self {
        Self { db, photos }
    }

    /// Register a password account.
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User, AppError> {
        let email = email.trim();
        if !email.validate_email() {
            return Err(AppError::Validation("email is not a valid address".to_string()));
        }
        let name = validate_name(name)?;
        if !password::is_strong_enough(password) {
            return Err(AppError::WeakPassword(MIN_PASSWORD_LEN));
        }

        let password_hash = hash_blocking(password.to_string()).await?;
        let user = User {
            user_id: new_user_id(),
            email: email.to_string(),
            email_key: User::email_key(email),
            name,
            password_hash: Some(password_hash),
            federated_id: None,
            picture: None,
            created_at: Utc::now(),
        };

        self.db.create_user(&user).await?;
        tracing::info!(user_id = %user.user_id, "User registered");
        Ok(user)
    }

    /// Check an email/password pair.
    ///
    /// Unknown email, federated-only account and wrong password all produce
    /// the same `InvalidCredentials` after comparable work.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<User, AppError> {
        let user = self.db.find_user_by_email(&User::email_key(email)).await?;
        let candidate = password.to_string();

        let stored_hash = user.as_ref().and_then(|u| u.password_hash.clone());
        let verified = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => password::verify_password(&candidate, &hash),
            None => {
                password::verify_dummy(&candidate);
                false
            }
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password check panicked: {}", e)))?;

        match user {
            Some(user) if verified => Ok(user),
            _ => Err(AppError::InvalidCredentials),
        }
    }

    /// Resolve the user for a federated identity, creating or linking as needed.
    pub async fn upsert_federated_user(&self, identity: &FederatedIdentity) -> Result<User, AppError> {
        if let Some(user) = self.db.find_user_by_federated_id(&identity.id).await? {
            return Ok(user);
        }

        let email_key = User::email_key(&identity.email);
        if let Some(user) = self.db.find_user_by_email(&email_key).await? {
            return self.link_identity(user, identity).await;
        }

        let user = User {
            user_id: new_user_id(),
            email: identity.email.trim().to_string(),
            email_key,
            name: identity.name.clone(),
            password_hash: None,
            federated_id: Some(identity.id.clone()),
            picture: identity.picture.clone(),
            created_at: Utc::now(),
        };

        match self.db.create_user(&user).await {
            Ok(()) => {
                tracing::info!(user_id = %user.user_id, "User created from federated login");
                Ok(user)
            }
            // Lost a race with a concurrent first login or registration.
            Err(AppError::DuplicateEmail) => {
                let existing = self
                    .db
                    .find_user_by_email(&user.email_key)
                    .await?
                    .ok_or_else(|| AppError::Database("Email claim without user".to_string()))?;
                self.link_identity(existing, identity).await
            }
            Err(e) => Err(e),
        }
    }

    async fn link_identity(&self, mut user: User, identity: &FederatedIdentity) -> Result<User, AppError> {
        if user.federated_id.as_deref() == Some(identity.id.as_str()) {
            return Ok(user);
        }
        user.federated_id = Some(identity.id.clone());
        if user.picture.is_none() {
            user.picture = identity.picture.clone();
        }
        self.db.update_user(&user).await?;
        tracing::info!(user_id = %user.user_id, "Linked federated identity to existing user");
        Ok(user)
    }

    /// Change the password of a password account.
    pub async fn update_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let mut user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        let Some(stored_hash) = user.password_hash.clone() else {
            return Err(AppError::FederatedAccount);
        };

        let candidate = current_password.to_string();
        let matches =
            tokio::task::spawn_blocking(move || password::verify_password(&candidate, &stored_hash))
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Password check panicked: {}", e)))?;
        if !matches {
            return Err(AppError::InvalidCredentials);
        }

        if !password::is_strong_enough(new_password) {
            return Err(AppError::WeakPassword(MIN_PASSWORD_LEN));
        }

        user.password_hash = Some(hash_blocking(new_password.to_string()).await?);
        self.db.update_user(&user).await?;
        tracing::info!(user_id, "Password updated");
        Ok(())
    }

    /// Update display name and/or picture. Email never changes.
    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<User, AppError> {
        let mut user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        if let Some(name) = update.name {
            user.name = validate_name(&name)?;
        }
        if let Some(picture) = update.picture {
            let picture = picture.trim();
            user.picture = (!picture.is_empty()).then(|| picture.to_string());
        }

        self.db.update_user(&user).await?;
        Ok(user)
    }

    /// Delete the account with its sessions, sightings and photo blobs.
    pub async fn delete_user(&self, user_id: &str) -> Result<(), AppError> {
        let sightings = self.db.delete_user_data(user_id).await?;
        for sighting in &sightings {
            self.photos.delete_refs(&sighting.photos).await;
        }
        tracing::info!(user_id, sightings = sightings.len(), "Account deleted");
        Ok(())
    }
}

fn new_user_id() -> String {
    format!("user_{}", uuid::Uuid::new_v4().simple())
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

async fn hash_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing panicked: {}", e)))?
}
