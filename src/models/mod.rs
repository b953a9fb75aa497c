// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod session;
pub mod sighting;
pub mod stats;
pub mod user;

pub use session::{CodeConsumption, PendingExchangeCode, Session, SessionState};
pub use sighting::{Sighting, SightingFields, ValidSightingFields, MAX_PHOTOS};
pub use stats::{NameCount, SightingStats};
pub use user::{AuthMethod, FederatedIdentity, ProfileUpdate, User, UserResponse};
