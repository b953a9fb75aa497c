// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Tracklog: a personal train-sighting log.
//!
//! This crate provides the backend API (accounts, sessions, federated
//! login, sightings with photos and per-user stats) and a small client
//! library for talking to it.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::{Config, StorageBackend};
use db::Db;
use error::AppError;
use services::{CredentialStore, FederatedProvider, PhotoStore, SessionManager, SightingService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub photos: PhotoStore,
    pub credentials: CredentialStore,
    pub sessions: SessionManager,
    pub sightings: SightingService,
}

impl AppState {
    /// Connect the configured storage backend and wire up services.
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let db = match config.storage_backend {
            StorageBackend::Firestore => Db::firestore(&config.gcp_project_id).await?,
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Db::memory()
            }
        };
        Ok(Self::with_db(config, db))
    }

    /// Wire up services over an existing store.
    pub fn with_db(config: Config, db: Db) -> Self {
        let photos = PhotoStore::new(config.upload_dir.clone());
        let credentials = CredentialStore::new(db.clone(), photos.clone());
        let sessions = SessionManager::new(
            db.clone(),
            credentials.clone(),
            FederatedProvider::new(&config),
            config.session_ttl,
            config.exchange_code_ttl,
        );
        let sightings = SightingService::new(db.clone(), photos.clone());

        Self {
            config,
            db,
            photos,
            credentials,
            sessions,
            sightings,
        }
    }
}
