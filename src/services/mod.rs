// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod credentials;
pub mod federated;
pub mod latch;
pub mod password;
pub mod photos;
pub mod session;
pub mod sightings;
pub mod tokens;

pub use credentials::CredentialStore;
pub use federated::FederatedProvider;
pub use latch::ExchangeLatch;
pub use photos::PhotoStore;
pub use session::{IssuedSession, SessionManager};
pub use sightings::SightingService;
