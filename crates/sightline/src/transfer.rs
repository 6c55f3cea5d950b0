//! JSON import and export of sighting collections.
//!
//! The interchange shape is the flat array older browser builds kept in local
//! storage: `{id, lat, lng, species, observations, photo, timestamp, source}`.
//! Exports use the same shape plus a `synced` flag, so an export can be
//! imported again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sighting::{NewSighting, Position, SightingRecord, SightingSource};

/// One sighting in interchange form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SightingEntry {
    /// Id in the originating collection. Not reused on import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Species name.
    pub species: String,
    /// Observation notes.
    #[serde(default)]
    pub observations: Option<String>,
    /// Photo as a data URI.
    #[serde(default)]
    pub photo: Option<String>,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Where it was logged from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SightingSource>,
    /// Sync state at export time. Ignored on import.
    #[serde(default)]
    pub synced: bool,
}

impl SightingEntry {
    /// Convert to store input, keeping the original capture time.
    ///
    /// Blank notes and photos are dropped.
    #[must_use]
    pub fn into_new_sighting(self) -> NewSighting {
        NewSighting {
            position: Position::new(self.lat, self.lng),
            species: self.species,
            notes: self.observations.filter(|s| !s.trim().is_empty()),
            photo: self.photo.filter(|s| !s.is_empty()),
            source: self.source,
            captured_at: Some(self.timestamp),
        }
    }
}

impl From<&SightingRecord> for SightingEntry {
    fn from(record: &SightingRecord) -> Self {
        Self {
            id: Some(record.id.to_string()),
            lat: record.position.lat,
            lng: record.position.lng,
            species: record.species.clone(),
            observations: record.notes.clone(),
            photo: record.photo.clone(),
            timestamp: record.captured_at,
            source: record.source,
            synced: record.synced,
        }
    }
}

/// Parse a JSON array of entries.
///
/// # Errors
///
/// Returns an error if the input is not a JSON array of entries.
pub fn parse_entries(json: &str) -> Result<Vec<SightingEntry>> {
    Ok(serde_json::from_str(json)?)
}

/// Render records as a pretty-printed JSON array of entries.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_json(records: &[SightingRecord]) -> Result<String> {
    let entries: Vec<SightingEntry> = records.iter().map(SightingEntry::from).collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}
