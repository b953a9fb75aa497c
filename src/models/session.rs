// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session and one-time exchange code records.
//!
//! Neither record stores the secret itself: documents are keyed by the
//! SHA-256 digest of the token or code handed to the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FederatedIdentity;

/// Lifecycle state of a session at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
    Revoked,
}

/// Session record stored in the `sessions` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Hex SHA-256 of the bearer token (document ID)
    pub token_hash: String,
    /// Owning user
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// Sliding expiry, pushed forward on use
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
}

impl Session {
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.revoked {
            SessionState::Revoked
        } else if now >= self.expires_at {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }
}

/// One-time code bridging a federated redirect into a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingExchangeCode {
    /// Hex SHA-256 of the code (document ID)
    pub code_hash: String,
    pub identity: FederatedIdentity,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub consumed: bool,
}

/// Result of an atomic consume attempt on an exchange code.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeConsumption {
    Consumed(FederatedIdentity),
    AlreadyUsed,
    Expired,
    Unknown,
}

impl PendingExchangeCode {
    /// Decide the outcome of consuming this code at `now`.
    ///
    /// Used codes win over expired ones so a replay is always reported as such.
    pub fn consumption(&self, now: DateTime<Utc>) -> CodeConsumption {
        if self.consumed {
            CodeConsumption::AlreadyUsed
        } else if now >= self.expires_at {
            CodeConsumption::Expired
        } else {
            CodeConsumption::Consumed(self.identity.clone())
        }
    }
}
