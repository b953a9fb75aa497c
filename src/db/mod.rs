//! Database layer.
//!
//! [`Db`] is the single handle the services hold. It dispatches to Firestore
//! in production or to an in-process store for local runs and tests; both
//! backends make the same atomicity promises for email claims, exchange
//! code consumption and sighting deletion.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{CodeConsumption, PendingExchangeCode, Session, Sighting, User};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Email uniqueness claims (keyed by encoded lowercase email)
    pub const USER_EMAILS: &str = "user_emails";
    pub const SESSIONS: &str = "sessions";
    pub const EXCHANGE_CODES: &str = "exchange_codes";
    pub const SIGHTINGS: &str = "sightings";
}

/// Outcome of an owner-scoped sighting delete.
#[derive(Debug, Clone, PartialEq)]
pub enum SightingDeletion {
    Deleted(Sighting),
    NotFound,
    NotOwner,
}

#[derive(Clone)]
enum Backend {
    Firestore(FirestoreStore),
    Memory(Arc<MemoryStore>),
}

/// Storage handle shared by all services.
#[derive(Clone)]
pub struct Db {
    backend: Backend,
}

impl Db {
    /// Connect to Firestore for the given project.
    pub async fn firestore(project_id: &str) -> Result<Self, AppError> {
        Ok(Self {
            backend: Backend::Firestore(FirestoreStore::new(project_id).await?),
        })
    }

    /// Create an empty in-process store.
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryStore::default())),
        }
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.get_user(user_id).await,
            Backend::Memory(mem) => Ok(mem.get_user(user_id)),
        }
    }

    pub async fn find_user_by_email(&self, email_key: &str) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.find_user_by_email(email_key).await,
            Backend::Memory(mem) => Ok(mem.find_user_by_email(email_key)),
        }
    }

    pub async fn find_user_by_federated_id(
        &self,
        federated_id: &str,
    ) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.find_user_by_federated_id(federated_id).await,
            Backend::Memory(mem) => Ok(mem.find_user_by_federated_id(federated_id)),
        }
    }

    /// Insert a new user, claiming its email atomically.
    ///
    /// Fails with `DuplicateEmail` if the email key is already claimed.
    pub async fn create_user(&self, user: &User) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.create_user(user).await,
            Backend::Memory(mem) => mem.create_user(user),
        }
    }

    /// Overwrite an existing user document. The email key must not change.
    ///
    /// Fails with `Unauthenticated` if the account was deleted since it was
    /// read, rather than recreating it.
    pub async fn update_user(&self, user: &User) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.update_user(user).await,
            Backend::Memory(mem) => mem.update_user(user),
        }
    }

    /// Delete a user with its email claim, sessions and sightings.
    ///
    /// Returns the removed sightings so their photos can be released.
    pub async fn delete_user_data(&self, user_id: &str) -> Result<Vec<Sighting>, AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.delete_user_data(user_id).await,
            Backend::Memory(mem) => Ok(mem.delete_user_data(user_id)),
        }
    }

    // ─── Session Operations ──────────────────────────────────────

    pub async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.put_session(session).await,
            Backend::Memory(mem) => {
                mem.put_session(session);
                Ok(())
            }
        }
    }

    pub async fn get_session(&self, token_hash: &str) -> Result<Option<Session>, AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.get_session(token_hash).await,
            Backend::Memory(mem) => Ok(mem.get_session(token_hash)),
        }
    }

    /// Push a session's sliding expiry forward.
    ///
    /// Revoked or missing sessions are left alone, so a logout racing with
    /// an extension stays in effect.
    pub async fn extend_session(
        &self,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.extend_session(token_hash, expires_at).await,
            Backend::Memory(mem) => {
                mem.extend_session(token_hash, expires_at);
                Ok(())
            }
        }
    }

    /// Mark a session revoked. Unknown hashes are ignored.
    pub async fn revoke_session(&self, token_hash: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.revoke_session(token_hash).await,
            Backend::Memory(mem) => {
                mem.revoke_session(token_hash);
                Ok(())
            }
        }
    }

    pub async fn delete_session(&self, token_hash: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.delete_session(token_hash).await,
            Backend::Memory(mem) => {
                mem.delete_session(token_hash);
                Ok(())
            }
        }
    }

    /// Remove sessions and exchange codes that expired at or before `now`.
    ///
    /// Returns how many sessions and codes were removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<(usize, usize), AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.purge_expired(now).await,
            Backend::Memory(mem) => Ok(mem.purge_expired(now)),
        }
    }

    // ─── Exchange Code Operations ────────────────────────────────

    pub async fn insert_exchange_code(&self, code: &PendingExchangeCode) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.insert_exchange_code(code).await,
            Backend::Memory(mem) => {
                mem.insert_exchange_code(code);
                Ok(())
            }
        }
    }

    /// Atomically check and set the consumed flag of an exchange code.
    pub async fn consume_exchange_code(
        &self,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<CodeConsumption, AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.consume_exchange_code(code_hash, now).await,
            Backend::Memory(mem) => Ok(mem.consume_exchange_code(code_hash, now)),
        }
    }

    // ─── Sighting Operations ─────────────────────────────────────

    /// Store a new sighting. Fails with `Unauthenticated` if its owner no
    /// longer exists.
    pub async fn insert_sighting(&self, sighting: &Sighting) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.insert_sighting(sighting).await,
            Backend::Memory(mem) => mem.insert_sighting(sighting),
        }
    }

    pub async fn get_sighting(&self, sighting_id: &str) -> Result<Option<Sighting>, AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.get_sighting(sighting_id).await,
            Backend::Memory(mem) => Ok(mem.get_sighting(sighting_id)),
        }
    }

    /// All sightings owned by `user_id`, in no particular order.
    pub async fn sightings_for_user(&self, user_id: &str) -> Result<Vec<Sighting>, AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.sightings_for_user(user_id).await,
            Backend::Memory(mem) => Ok(mem.sightings_for_user(user_id)),
        }
    }

    /// Delete a sighting if and only if `user_id` owns it.
    pub async fn delete_sighting(
        &self,
        user_id: &str,
        sighting_id: &str,
    ) -> Result<SightingDeletion, AppError> {
        match &self.backend {
            Backend::Firestore(fs) => fs.delete_sighting(user_id, sighting_id).await,
            Backend::Memory(mem) => Ok(mem.delete_sighting(user_id, sighting_id)),
        }
    }
}
