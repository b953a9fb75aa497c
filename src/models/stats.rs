//! Sighting statistics derived on demand from a user's sightings.
//!
//! Every function here is pure over the slice it is given; nothing is
//! persisted, so the numbers always reflect the store at request time.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::Sighting;

/// Default length of the "top" lists.
pub const TOP_N: usize = 5;

/// A grouped value with its occurrence count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct NameCount {
    pub name: String,
    pub count: u32,
}

/// Summary returned by `GET /api/sightings/stats`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SightingStats {
    pub total_sightings: u32,
    pub this_month: u32,
    pub unique_locations: u32,
    pub unique_trains: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub last_sighting: Option<NaiveDate>,
    pub top_train_types: Vec<NameCount>,
    pub top_operators: Vec<NameCount>,
    pub top_locations: Vec<NameCount>,
}

impl SightingStats {
    /// Aggregate all statistics for `sightings` as seen at `now`.
    pub fn compute(sightings: &[Sighting], now: DateTime<Utc>) -> Self {
        Self {
            total_sightings: total_count(sightings),
            this_month: count_this_calendar_month(sightings, now),
            unique_locations: unique_location_count(sightings),
            unique_trains: unique_count(sightings, |s| &s.train_number),
            last_sighting: most_recent_date(sightings),
            top_train_types: top_n(sightings, |s| &s.train_type, TOP_N),
            top_operators: top_n(sightings, |s| &s.operator, TOP_N),
            top_locations: top_n(sightings, |s| &s.location, TOP_N),
        }
    }
}

pub fn total_count(sightings: &[Sighting]) -> u32 {
    sightings.len() as u32
}

/// Sightings dated within the calendar month and year of `now` (UTC).
pub fn count_this_calendar_month(sightings: &[Sighting], now: DateTime<Utc>) -> u32 {
    sightings
        .iter()
        .filter(|s| s.sighting_date.year() == now.year() && s.sighting_date.month() == now.month())
        .count() as u32
}

/// Distinct `location` values, compared exactly.
pub fn unique_location_count(sightings: &[Sighting]) -> u32 {
    unique_count(sightings, |s| &s.location)
}

fn unique_count<F>(sightings: &[Sighting], key: F) -> u32
where
    F: Fn(&Sighting) -> &String,
{
    sightings.iter().map(key).collect::<HashSet<_>>().len() as u32
}

pub fn most_recent_date(sightings: &[Sighting]) -> Option<NaiveDate> {
    sightings.iter().map(|s| s.sighting_date).max()
}

/// Group by `key`, order by count descending, ties by first appearance.
pub fn top_n<F>(sightings: &[Sighting], key: F, n: usize) -> Vec<NameCount>
where
    F: Fn(&Sighting) -> &String,
{
    // (first_seen, count) per name
    let mut groups: HashMap<&str, (usize, u32)> = HashMap::new();
    for (index, sighting) in sightings.iter().enumerate() {
        groups.entry(key(sighting).as_str()).or_insert((index, 0)).1 += 1;
    }

    let mut ranked: Vec<(&str, usize, u32)> = groups
        .into_iter()
        .map(|(name, (first_seen, count))| (name, first_seen, count))
        .collect();
    ranked.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.1.cmp(&b.1)));

    ranked
        .into_iter()
        .take(n)
        .map(|(name, _, count)| NameCount {
            name: name.to_string(),
            count,
        })
        .collect()
}
