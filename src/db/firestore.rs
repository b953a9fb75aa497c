// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile storage + email uniqueness claims)
//! - Sessions (hashed bearer tokens)
//! - Exchange codes (one-time federated login codes)
//! - Sightings
//!
//! Every read-then-write invariant runs inside a Firestore transaction so
//! concurrent requests on different instances resolve to a single winner.

use crate::db::{collections, SightingDeletion};
use crate::error::AppError;
use crate::models::{CodeConsumption, PendingExchangeCode, Session, Sighting, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Document in `user_emails`, claiming an email key for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmailClaim {
    user_id: String,
}

/// Firestore-backed store.
#[derive(Clone)]
pub struct FirestoreStore {
    client: firestore::FirestoreDb,
}

fn db_err(e: firestore::errors::FirestoreError) -> AppError {
    AppError::Database(e.to_string())
}

/// Document ID for an email claim; emails may contain characters Firestore
/// reserves in IDs.
fn email_doc_id(email_key: &str) -> String {
    urlencoding::encode(email_key).into_owned()
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(db_err)
    }

    pub async fn find_user_by_email(&self, email_key: &str) -> Result<Option<User>, AppError> {
        let claim: Option<EmailClaim> = self
            .client
            .fluent()
            .select()
            .by_id_in(collections::USER_EMAILS)
            .obj()
            .one(&email_doc_id(email_key))
            .await
            .map_err(db_err)?;

        match claim {
            Some(claim) => self.get_user(&claim.user_id).await,
            None => Ok(None),
        }
    }

    pub async fn find_user_by_federated_id(
        &self,
        federated_id: &str,
    ) -> Result<Option<User>, AppError> {
        let users: Vec<User> = self
            .client
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.for_all([q.field("federated_id").eq(federated_id)]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(db_err)?;
        Ok(users.into_iter().next())
    }

    /// Claim the email and write the user in one transaction.
    pub async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let user = user.clone();
        let created = self
            .client
            .run_transaction(move |db, transaction| {
                let user = user.clone();
                Box::pin(async move {
                    let email_doc = email_doc_id(&user.email_key);
                    let existing: Option<EmailClaim> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USER_EMAILS)
                        .obj()
                        .one(&email_doc)
                        .await?;
                    if existing.is_some() {
                        return Ok(false);
                    }

                    let claim = EmailClaim {
                        user_id: user.user_id.clone(),
                    };
                    db.fluent()
                        .update()
                        .in_col(collections::USER_EMAILS)
                        .document_id(&email_doc)
                        .object(&claim)
                        .add_to_transaction(transaction)?;
                    db.fluent()
                        .update()
                        .in_col(collections::USERS)
                        .document_id(&user.user_id)
                        .object(&user)
                        .add_to_transaction(transaction)?;
                    Ok(true)
                })
            })
            .await
            .map_err(db_err)?;

        if created {
            Ok(())
        } else {
            Err(AppError::DuplicateEmail)
        }
    }

    /// Overwrite the user only if the document still exists.
    pub async fn update_user(&self, user: &User) -> Result<(), AppError> {
        let user = user.clone();
        let updated = self
            .client
            .run_transaction(move |db, transaction| {
                let user = user.clone();
                Box::pin(async move {
                    let existing: Option<User> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USERS)
                        .obj()
                        .one(&user.user_id)
                        .await?;
                    if existing.is_none() {
                        return Ok(false);
                    }

                    db.fluent()
                        .update()
                        .in_col(collections::USERS)
                        .document_id(&user.user_id)
                        .object(&user)
                        .add_to_transaction(transaction)?;
                    Ok(true)
                })
            })
            .await
            .map_err(db_err)?;

        if updated {
            Ok(())
        } else {
            Err(AppError::Unauthenticated)
        }
    }

    // ─── Session Operations ──────────────────────────────────────

    pub async fn put_session(&self, session: &Session) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::SESSIONS)
            .document_id(&session.token_hash)
            .object(session)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_session(&self, token_hash: &str) -> Result<Option<Session>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::SESSIONS)
            .obj()
            .one(token_hash)
            .await
            .map_err(db_err)
    }

    /// Move `expires_at` forward unless the session was revoked or removed
    /// since the caller read it.
    pub async fn extend_session(
        &self,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let token_hash = token_hash.to_string();
        self.client
            .run_transaction(move |db, transaction| {
                let token_hash = token_hash.clone();
                Box::pin(async move {
                    let session: Option<Session> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::SESSIONS)
                        .obj()
                        .one(&token_hash)
                        .await?;
                    if let Some(mut session) = session.filter(|s| !s.revoked) {
                        session.expires_at = expires_at;
                        db.fluent()
                            .update()
                            .in_col(collections::SESSIONS)
                            .document_id(&token_hash)
                            .object(&session)
                            .add_to_transaction(transaction)?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(db_err)
    }

    pub async fn delete_session(&self, token_hash: &str) -> Result<(), AppError> {
        self.client
            .fluent()
            .delete()
            .from(collections::SESSIONS)
            .document_id(token_hash)
            .execute()
            .await
            .map_err(db_err)
    }

    /// Delete expired sessions and exchange codes.
    ///
    /// Timestamps are stored as RFC 3339 strings, which order the same as
    /// the instants they encode.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<(usize, usize), AppError> {
        let sessions: Vec<Session> = self
            .client
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .filter(|q| q.for_all([q.field("expires_at").less_than_or_equal(now)]))
            .obj()
            .query()
            .await
            .map_err(db_err)?;
        let hashes: Vec<String> = sessions.into_iter().map(|s| s.token_hash).collect();
        self.batch_delete(&hashes, collections::SESSIONS).await?;

        let codes: Vec<PendingExchangeCode> = self
            .client
            .fluent()
            .select()
            .from(collections::EXCHANGE_CODES)
            .filter(|q| q.for_all([q.field("expires_at").less_than_or_equal(now)]))
            .obj()
            .query()
            .await
            .map_err(db_err)?;
        let code_hashes: Vec<String> = codes.into_iter().map(|c| c.code_hash).collect();
        self.batch_delete(&code_hashes, collections::EXCHANGE_CODES).await?;

        Ok((hashes.len(), code_hashes.len()))
    }

    pub async fn revoke_session(&self, token_hash: &str) -> Result<(), AppError> {
        let token_hash = token_hash.to_string();
        self.client
            .run_transaction(move |db, transaction| {
                let token_hash = token_hash.clone();
                Box::pin(async move {
                    let session: Option<Session> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::SESSIONS)
                        .obj()
                        .one(&token_hash)
                        .await?;
                    if let Some(mut session) = session.filter(|s| !s.revoked) {
                        session.revoked = true;
                        db.fluent()
                            .update()
                            .in_col(collections::SESSIONS)
                            .document_id(&token_hash)
                            .object(&session)
                            .add_to_transaction(transaction)?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(db_err)
    }

    // ─── Exchange Code Operations ────────────────────────────────

    pub async fn insert_exchange_code(&self, code: &PendingExchangeCode) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::EXCHANGE_CODES)
            .document_id(&code.code_hash)
            .object(code)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Read the code and flip `consumed` in the same transaction.
    ///
    /// A concurrent consumer either conflicts and retries (then sees
    /// `consumed == true`) or commits first and makes this one retry.
    pub async fn consume_exchange_code(
        &self,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<CodeConsumption, AppError> {
        let code_hash = code_hash.to_string();
        self.client
            .run_transaction(move |db, transaction| {
                let code_hash = code_hash.clone();
                Box::pin(async move {
                    let code: Option<PendingExchangeCode> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::EXCHANGE_CODES)
                        .obj()
                        .one(&code_hash)
                        .await?;
                    let Some(mut code) = code else {
                        return Ok(CodeConsumption::Unknown);
                    };

                    let outcome = code.consumption(now);
                    if matches!(outcome, CodeConsumption::Consumed(_)) {
                        code.consumed = true;
                        db.fluent()
                            .update()
                            .in_col(collections::EXCHANGE_CODES)
                            .document_id(&code_hash)
                            .object(&code)
                            .add_to_transaction(transaction)?;
                    }
                    Ok(outcome)
                })
            })
            .await
            .map_err(db_err)
    }

    // ─── Sighting Operations ─────────────────────────────────────

    /// Write the sighting in a transaction that reads its owner, so it
    /// cannot land after the owner's account is deleted.
    pub async fn insert_sighting(&self, sighting: &Sighting) -> Result<(), AppError> {
        let sighting = sighting.clone();
        let inserted = self
            .client
            .run_transaction(move |db, transaction| {
                let sighting = sighting.clone();
                Box::pin(async move {
                    let owner: Option<User> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USERS)
                        .obj()
                        .one(&sighting.user_id)
                        .await?;
                    if owner.is_none() {
                        return Ok(false);
                    }

                    db.fluent()
                        .update()
                        .in_col(collections::SIGHTINGS)
                        .document_id(&sighting.sighting_id)
                        .object(&sighting)
                        .add_to_transaction(transaction)?;
                    Ok(true)
                })
            })
            .await
            .map_err(db_err)?;

        if inserted {
            Ok(())
        } else {
            Err(AppError::Unauthenticated)
        }
    }

    pub async fn get_sighting(&self, sighting_id: &str) -> Result<Option<Sighting>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::SIGHTINGS)
            .obj()
            .one(sighting_id)
            .await
            .map_err(db_err)
    }

    pub async fn sightings_for_user(&self, user_id: &str) -> Result<Vec<Sighting>, AppError> {
        self.client
            .fluent()
            .select()
            .from(collections::SIGHTINGS)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    pub async fn delete_sighting(
        &self,
        user_id: &str,
        sighting_id: &str,
    ) -> Result<SightingDeletion, AppError> {
        let user_id = user_id.to_string();
        let sighting_id = sighting_id.to_string();
        self.client
            .run_transaction(move |db, transaction| {
                let user_id = user_id.clone();
                let sighting_id = sighting_id.clone();
                Box::pin(async move {
                    let sighting: Option<Sighting> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::SIGHTINGS)
                        .obj()
                        .one(&sighting_id)
                        .await?;

                    match sighting {
                        None => Ok(SightingDeletion::NotFound),
                        Some(s) if s.user_id != user_id => Ok(SightingDeletion::NotOwner),
                        Some(s) => {
                            db.fluent()
                                .delete()
                                .from(collections::SIGHTINGS)
                                .document_id(&sighting_id)
                                .add_to_transaction(transaction)?;
                            Ok(SightingDeletion::Deleted(s))
                        }
                    }
                })
            })
            .await
            .map_err(db_err)
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// Helper to batch delete documents using transactions.
    async fn batch_delete(&self, doc_ids: &[String], collection: &str) -> Result<(), AppError> {
        for chunk in doc_ids.chunks(BATCH_SIZE) {
            let mut transaction = self
                .client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for doc_id in chunk {
                self.client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }

    // ─── Account Deletion ──────────────────────────────────────────

    /// Delete ALL data for a user.
    ///
    /// The profile and email claim go first, in one transaction. From then
    /// on `update_user` and `insert_sighting` refuse to write for this user,
    /// so the sweeps below see every row that will ever exist:
    /// - `users/{user_id}` + `user_emails/{email}`
    /// - `sightings` (query by user_id)
    /// - `sessions` (query by user_id)
    pub async fn delete_user_data(&self, user_id: &str) -> Result<Vec<Sighting>, AppError> {
        // 1. Email claim + profile
        let owned_id = user_id.to_string();
        self.client
            .run_transaction(move |db, transaction| {
                let user_id = owned_id.clone();
                Box::pin(async move {
                    let user: Option<User> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USERS)
                        .obj()
                        .one(&user_id)
                        .await?;
                    if let Some(user) = user {
                        db.fluent()
                            .delete()
                            .from(collections::USER_EMAILS)
                            .document_id(email_doc_id(&user.email_key))
                            .add_to_transaction(transaction)?;
                    }
                    db.fluent()
                        .delete()
                        .from(collections::USERS)
                        .document_id(&user_id)
                        .add_to_transaction(transaction)?;
                    Ok(())
                })
            })
            .await
            .map_err(db_err)?;

        // 2. Sightings
        let sightings = self.sightings_for_user(user_id).await?;
        let ids: Vec<String> = sightings.iter().map(|s| s.sighting_id.clone()).collect();
        self.batch_delete(&ids, collections::SIGHTINGS).await?;
        tracing::debug!(user_id, count = ids.len(), "Deleted sightings");

        // 3. Sessions
        let sessions: Vec<Session> = self
            .client
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(db_err)?;
        let hashes: Vec<String> = sessions.into_iter().map(|s| s.token_hash).collect();
        self.batch_delete(&hashes, collections::SESSIONS).await?;
        tracing::debug!(user_id, count = hashes.len(), "Deleted sessions");

        tracing::info!(user_id, sightings = sightings.len(), "User data deletion complete");

        Ok(sightings)
    }
}
