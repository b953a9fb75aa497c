// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Owner-scoped sighting store and stats.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;

use crate::db::{Db, SightingDeletion};
use crate::error::AppError;
use crate::models::{Sighting, SightingFields, SightingStats, MAX_PHOTOS};
use crate::services::PhotoStore;

#[derive(Clone)]
pub struct SightingService {
    db: Db,
    photos: PhotoStore,
}

impl SightingService {
    pub fn new(db: Db, photos: PhotoStore) -> Self {
        Self { db, photos }
    }

    /// Record a new sighting owned by `user_id`.
    ///
    /// Photos are persisted before the row; if the row cannot be written the
    /// blobs are released again.
    pub async fn create(
        &self,
        user_id: &str,
        fields: &SightingFields,
        photos: &[String],
    ) -> Result<Sighting, AppError> {
        let valid = fields.validate()?;
        if photos.len() > MAX_PHOTOS {
            return Err(AppError::TooManyPhotos(photos.len()));
        }

        let sighting_id = format!("sighting_{}", uuid::Uuid::now_v7().simple());

        let mut refs = Vec::with_capacity(photos.len());
        for (index, photo) in photos.iter().enumerate() {
            match self.photos.store(&sighting_id, index, photo).await {
                Ok(reference) => refs.push(reference),
                Err(e) => {
                    self.photos.delete_refs(&refs).await;
                    return Err(e);
                }
            }
        }

        let sighting = Sighting {
            sighting_id,
            user_id: user_id.to_string(),
            train_number: valid.train_number,
            train_type: valid.train_type,
            traction_type: valid.traction_type,
            operator: valid.operator,
            route: valid.route,
            location: valid.location,
            sighting_date: valid.sighting_date,
            sighting_time: valid.sighting_time,
            notes: valid.notes,
            photos: refs,
            created_at: Utc::now(),
        };

        if let Err(e) = self.db.insert_sighting(&sighting).await {
            self.photos.delete_refs(&sighting.photos).await;
            return Err(e);
        }

        tracing::info!(
            user_id,
            sighting_id = %sighting.sighting_id,
            photos = sighting.photos.len(),
            "Sighting created"
        );
        Ok(sighting)
    }

    /// All sightings of `user_id`, newest sighting date first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Sighting>, AppError> {
        let mut sightings = self.db.sightings_for_user(user_id).await?;
        sort_newest_first(&mut sightings);
        Ok(sightings)
    }

    /// Fetch one sighting. Another user's sighting is reported as absent.
    pub async fn get(&self, user_id: &str, sighting_id: &str) -> Result<Sighting, AppError> {
        match self.db.get_sighting(sighting_id).await? {
            Some(sighting) if sighting.user_id == user_id => Ok(sighting),
            Some(_) => {
                tracing::warn!(user_id, sighting_id, "Read of sighting owned by another user");
                Err(not_found(sighting_id))
            }
            None => Err(not_found(sighting_id)),
        }
    }

    /// Delete a sighting and its photo blobs.
    pub async fn delete(&self, user_id: &str, sighting_id: &str) -> Result<(), AppError> {
        match self.db.delete_sighting(user_id, sighting_id).await? {
            SightingDeletion::Deleted(sighting) => {
                self.photos.delete_refs(&sighting.photos).await;
                tracing::info!(user_id, sighting_id, "Sighting deleted");
                Ok(())
            }
            SightingDeletion::NotOwner => {
                tracing::warn!(user_id, sighting_id, "Delete of sighting owned by another user");
                Err(not_found(sighting_id))
            }
            SightingDeletion::NotFound => Err(not_found(sighting_id)),
        }
    }

    /// Aggregate stats over the user's current sightings.
    pub async fn stats(&self, user_id: &str, now: DateTime<Utc>) -> Result<SightingStats, AppError> {
        let sightings = self.list(user_id).await?;
        Ok(SightingStats::compute(&sightings, now))
    }
}

/// Case-insensitive search over train number, operator, location and type.
///
/// A blank term keeps everything.
pub fn filter(sightings: &[Sighting], term: Option<&str>) -> Vec<Sighting> {
    match term.map(str::trim).filter(|t| !t.is_empty()) {
        None => sightings.to_vec(),
        Some(term) => {
            let needle = term.to_lowercase();
            sightings
                .iter()
                .filter(|s| s.matches(&needle))
                .cloned()
                .collect()
        }
    }
}

/// Date desc, then creation time desc. The id is a v7 UUID so it breaks
/// any remaining tie in creation order too.
fn sort_newest_first(sightings: &mut [Sighting]) {
    sightings.sort_by(|a, b| {
        (Reverse(a.sighting_date), Reverse(a.created_at), Reverse(&a.sighting_id)).cmp(&(
            Reverse(b.sighting_date),
            Reverse(b.created_at),
            Reverse(&b.sighting_id),
        ))
    });
}

fn not_found(sighting_id: &str) -> AppError {
    AppError::NotFound(format!("Sighting {sighting_id}"))
}
