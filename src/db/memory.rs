// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store backed by `DashMap`.
//!
//! Check-and-set operations run under the shard lock of the key they touch,
//! which gives the same single-winner behaviour as the Firestore transactions.

use crate::db::SightingDeletion;
use crate::error::AppError;
use crate::models::{CodeConsumption, PendingExchangeCode, Session, Sighting, User};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    /// email_key -> user_id
    emails: DashMap<String, String>,
    sessions: DashMap<String, Session>,
    exchange_codes: DashMap<String, PendingExchangeCode>,
    sightings: DashMap<String, Sighting>,
}

impl MemoryStore {
    pub fn get_user(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|u| u.clone())
    }

    pub fn find_user_by_email(&self, email_key: &str) -> Option<User> {
        let user_id = self.emails.get(email_key)?.clone();
        self.get_user(&user_id)
    }

    pub fn find_user_by_federated_id(&self, federated_id: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.federated_id.as_deref() == Some(federated_id))
            .map(|u| u.clone())
    }

    pub fn create_user(&self, user: &User) -> Result<(), AppError> {
        match self.emails.entry(user.email_key.clone()) {
            Entry::Occupied(_) => Err(AppError::DuplicateEmail),
            Entry::Vacant(claim) => {
                self.users.insert(user.user_id.clone(), user.clone());
                claim.insert(user.user_id.clone());
                Ok(())
            }
        }
    }

    /// Overwrite a user that still exists. Never recreates a deleted account.
    pub fn update_user(&self, user: &User) -> Result<(), AppError> {
        match self.users.get_mut(&user.user_id) {
            Some(mut stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(AppError::Unauthenticated),
        }
    }

    pub fn delete_user_data(&self, user_id: &str) -> Vec<Sighting> {
        if let Some((_, user)) = self.users.remove(user_id) {
            self.emails.remove(&user.email_key);
        }
        self.sessions.retain(|_, s| s.user_id != user_id);

        // Collect first: removing while iterating would deadlock on the shard.
        let owned: Vec<String> = self
            .sightings
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.key().clone())
            .collect();

        owned
            .into_iter()
            .filter_map(|id| self.sightings.remove(&id).map(|(_, s)| s))
            .collect()
    }

    pub fn put_session(&self, session: &Session) {
        self.sessions
            .insert(session.token_hash.clone(), session.clone());
    }

    pub fn get_session(&self, token_hash: &str) -> Option<Session> {
        self.sessions.get(token_hash).map(|s| s.clone())
    }

    pub fn extend_session(&self, token_hash: &str, expires_at: DateTime<Utc>) {
        if let Some(mut session) = self.sessions.get_mut(token_hash) {
            // A concurrent logout must not be undone by a late extension.
            if !session.revoked {
                session.expires_at = expires_at;
            }
        }
    }

    pub fn revoke_session(&self, token_hash: &str) {
        if let Some(mut session) = self.sessions.get_mut(token_hash) {
            session.revoked = true;
        }
    }

    pub fn delete_session(&self, token_hash: &str) {
        self.sessions.remove(token_hash);
    }

    pub fn insert_exchange_code(&self, code: &PendingExchangeCode) {
        self.exchange_codes
            .insert(code.code_hash.clone(), code.clone());
    }

    /// Drop sessions and exchange codes whose expiry is at or before `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> (usize, usize) {
        let sessions_before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        let codes_before = self.exchange_codes.len();
        self.exchange_codes.retain(|_, c| c.expires_at > now);
        (
            sessions_before.saturating_sub(self.sessions.len()),
            codes_before.saturating_sub(self.exchange_codes.len()),
        )
    }

    pub fn consume_exchange_code(&self, code_hash: &str, now: DateTime<Utc>) -> CodeConsumption {
        let Some(mut code) = self.exchange_codes.get_mut(code_hash) else {
            return CodeConsumption::Unknown;
        };
        let outcome = code.consumption(now);
        if matches!(outcome, CodeConsumption::Consumed(_)) {
            code.consumed = true;
        }
        outcome
    }

    pub fn insert_sighting(&self, sighting: &Sighting) -> Result<(), AppError> {
        // Holding the owner's entry orders this insert against account
        // deletion: either the cascade sees the row or the owner is gone.
        let Some(_owner) = self.users.get(&sighting.user_id) else {
            return Err(AppError::Unauthenticated);
        };
        self.sightings
            .insert(sighting.sighting_id.clone(), sighting.clone());
        Ok(())
    }

    pub fn get_sighting(&self, sighting_id: &str) -> Option<Sighting> {
        self.sightings.get(sighting_id).map(|s| s.clone())
    }

    pub fn sightings_for_user(&self, user_id: &str) -> Vec<Sighting> {
        self.sightings
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.clone())
            .collect()
    }

    pub fn delete_sighting(&self, user_id: &str, sighting_id: &str) -> SightingDeletion {
        match self
            .sightings
            .remove_if(sighting_id, |_, s| s.user_id == user_id)
        {
            Some((_, sighting)) => SightingDeletion::Deleted(sighting),
            None if self.sightings.contains_key(sighting_id) => SightingDeletion::NotOwner,
            None => SightingDeletion::NotFound,
        }
    }
}
