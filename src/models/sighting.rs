// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Train sighting model for storage and API.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::AppError;

/// Maximum number of photos attached to one sighting.
pub const MAX_PHOTOS: usize = 5;

/// Stored sighting record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Sighting {
    /// Sighting ID (also used as document ID)
    pub sighting_id: String,
    /// Owning user; set from the session, never from the request body
    pub user_id: String,
    pub train_number: String,
    /// Freight, Passenger, Metro, ... (open set)
    pub train_type: String,
    /// Electric, Diesel, Steam, ... (open set)
    pub traction_type: Option<String>,
    pub operator: String,
    pub route: Option<String>,
    pub location: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub sighting_date: NaiveDate,
    /// "HH:MM"
    pub sighting_time: String,
    pub notes: Option<String>,
    /// Photo references, at most [`MAX_PHOTOS`]
    pub photos: Vec<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
}

/// Client-supplied sighting fields.
///
/// There is intentionally no `user_id` here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SightingFields {
    #[serde(default)]
    pub train_number: String,
    #[serde(default)]
    pub train_type: String,
    #[serde(default)]
    pub traction_type: Option<String>,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, alias = "date")]
    pub sighting_date: String,
    #[serde(default, alias = "time")]
    pub sighting_time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Sighting fields after validation, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSightingFields {
    pub train_number: String,
    pub train_type: String,
    pub traction_type: Option<String>,
    pub operator: String,
    pub route: Option<String>,
    pub location: String,
    pub sighting_date: NaiveDate,
    pub sighting_time: String,
    pub notes: Option<String>,
}

impl SightingFields {
    /// Check required fields and parse the date/time.
    pub fn validate(&self) -> Result<ValidSightingFields, AppError> {
        let train_number = required("train_number", &self.train_number)?;
        let train_type = required("train_type", &self.train_type)?;
        let operator = required("operator", &self.operator)?;
        let location = required("location", &self.location)?;
        let date = required("sighting_date", &self.sighting_date)?;
        let time = required("sighting_time", &self.sighting_time)?;

        let sighting_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
            AppError::Validation("sighting_date: expected YYYY-MM-DD".to_string())
        })?;
        let sighting_time = NaiveTime::parse_from_str(&time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&time, "%H:%M:%S"))
            .map_err(|_| AppError::Validation("sighting_time: expected HH:MM".to_string()))?
            .format("%H:%M")
            .to_string();

        Ok(ValidSightingFields {
            train_number,
            train_type,
            traction_type: optional(&self.traction_type),
            operator,
            route: optional(&self.route),
            location,
            sighting_date,
            sighting_time,
            notes: optional(&self.notes),
        })
    }
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl Sighting {
    /// Whether any searchable field contains `needle` (already lowercased).
    pub fn matches(&self, needle: &str) -> bool {
        [
            &self.train_number,
            &self.operator,
            &self.location,
            &self.train_type,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }
}
