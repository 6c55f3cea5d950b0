//! Core sighting types for sightline.
//!
//! This module defines the fundamental data structures for representing
//! field observations: the persisted [`SightingRecord`], the caller-supplied
//! [`NewSighting`], and the partial [`SightingPatch`] used by edits.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of random base36 characters appended to a generated id.
const ID_SUFFIX_LEN: usize = 9;

/// Accepted shape of an embedded photo payload.
const PHOTO_DATA_URI_PATTERN: &str = r"^data:image/[A-Za-z0-9.+-]+;base64,";

fn photo_data_uri() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(PHOTO_DATA_URI_PATTERN).expect("Invalid regex pattern"))
}

/// Opaque identifier of a sighting.
///
/// Generated ids have the form `<unix-millis>-<9 base36 chars>`. Ids read back
/// from storage or imported from older exports are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SightingId(String);

impl SightingId {
    /// Generate a fresh id stamped with the current time.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generate a fresh id stamped with the given time.
    #[must_use]
    pub fn generate_at(now: DateTime<Utc>) -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .filter_map(|_| std::char::from_digit(rng.random_range(0..36), 36))
            .collect();
        Self(format!("{}-{suffix}", now.timestamp_millis()))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SightingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SightingId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SightingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for SightingId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A latitude/longitude pair in floating point degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude, -90 to 90.
    pub lat: f64,
    /// Longitude, -180 to 180.
    pub lng: f64,
}

impl Position {
    /// Create a new position.
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check that both coordinates are finite and within range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSighting`] if a coordinate is out of range.
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::invalid_sighting(format!(
                "latitude {} is outside [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::invalid_sighting(format!(
                "longitude {} is outside [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

/// Where a sighting was logged from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SightingSource {
    /// A tap on the map.
    Map,
    /// A camera capture.
    Camera,
}

impl fmt::Display for SightingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map => write!(f, "map"),
            Self::Camera => write!(f, "camera"),
        }
    }
}

impl std::str::FromStr for SightingSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "map" => Ok(Self::Map),
            "camera" => Ok(Self::Camera),
            other => Err(Error::invalid_sighting(format!(
                "unknown sighting source: {other}"
            ))),
        }
    }
}

/// The caller-supplied part of a sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSighting {
    /// Where the animal was seen.
    pub position: Position,
    /// Free-text species name.
    pub species: String,
    /// Observation notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Embedded image as a data URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    /// Where the sighting was logged from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SightingSource>,
    /// Capture time override; defaults to now. Used by imports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl NewSighting {
    /// Start a new sighting of `species` at `position`.
    #[must_use]
    pub fn new(species: impl Into<String>, position: Position) -> Self {
        Self {
            position,
            species: species.into(),
            notes: None,
            photo: None,
            source: None,
            captured_at: None,
        }
    }

    /// Attach observation notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Attach a photo data URI.
    #[must_use]
    pub fn with_photo(mut self, photo: impl Into<String>) -> Self {
        self.photo = Some(photo.into());
        self
    }

    /// Record where the sighting was logged from.
    #[must_use]
    pub fn with_source(mut self, source: SightingSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Override the capture time.
    #[must_use]
    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    /// Validate the fields a record cannot exist without.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSighting`] for a blank species, an out of range
    /// position, or a photo that is not an image data URI.
    pub fn validate(&self) -> Result<()> {
        validate_species(&self.species)?;
        self.position.validate()?;
        if let Some(photo) = &self.photo {
            validate_photo(photo)?;
        }
        Ok(())
    }
}

/// A partial update to a sighting.
///
/// `None` leaves a field alone. For the optional fields, `Some(None)` clears
/// the value and `Some(Some(_))` replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SightingPatch {
    /// New species name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    /// New notes, or `Some(None)` to clear them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    /// New photo, or `Some(None)` to clear it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Option<String>>,
}

impl SightingPatch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename the species.
    #[must_use]
    pub fn species(mut self, species: impl Into<String>) -> Self {
        self.species = Some(species.into());
        self
    }

    /// Replace the notes.
    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(Some(notes.into()));
        self
    }

    /// Remove the notes.
    #[must_use]
    pub fn clear_notes(mut self) -> Self {
        self.notes = Some(None);
        self
    }

    /// Replace the photo.
    #[must_use]
    pub fn photo(mut self, photo: impl Into<String>) -> Self {
        self.photo = Some(Some(photo.into()));
        self
    }

    /// Remove the photo.
    #[must_use]
    pub fn clear_photo(mut self) -> Self {
        self.photo = Some(None);
        self
    }

    /// Whether the patch touches no field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.species.is_none() && self.notes.is_none() && self.photo.is_none()
    }

    /// Validate the fields the patch sets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSighting`] for a blank species or a malformed photo.
    pub fn validate(&self) -> Result<()> {
        if let Some(species) = &self.species {
            validate_species(species)?;
        }
        if let Some(Some(photo)) = &self.photo {
            validate_photo(photo)?;
        }
        Ok(())
    }
}

/// A persisted field observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SightingRecord {
    /// Unique identifier assigned by the store.
    pub id: SightingId,
    /// Where the animal was seen.
    pub position: Position,
    /// Free-text species name.
    pub species: String,
    /// Observation notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Embedded image as a data URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    /// When the sighting was recorded.
    pub captured_at: DateTime<Utc>,
    /// Where the sighting was logged from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SightingSource>,
    /// Whether a remote authority has acknowledged this exact content.
    pub synced: bool,
}

impl SightingRecord {
    /// Build an unsynced record from caller input.
    #[must_use]
    pub fn create(id: SightingId, new: NewSighting) -> Self {
        Self {
            id,
            position: new.position,
            species: new.species,
            notes: new.notes,
            photo: new.photo,
            captured_at: new.captured_at.unwrap_or_else(Utc::now),
            source: new.source,
            synced: false,
        }
    }

    /// Return a copy with `patch` merged in and the sync flag cleared.
    #[must_use]
    pub fn patched(&self, patch: &SightingPatch) -> Self {
        let mut updated = self.clone();
        if let Some(species) = &patch.species {
            updated.species.clone_from(species);
        }
        if let Some(notes) = &patch.notes {
            updated.notes.clone_from(notes);
        }
        if let Some(photo) = &patch.photo {
            updated.photo.clone_from(photo);
        }
        updated.synced = false;
        updated
    }

    /// BLAKE3 hash over the content a remote authority would receive.
    ///
    /// The sync flag is excluded so a record's fingerprint is stable across
    /// acknowledgement.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.id.as_str().as_bytes());
        hasher.update(&self.position.lat.to_le_bytes());
        hasher.update(&self.position.lng.to_le_bytes());
        hasher.update(self.species.as_bytes());
        for field in [&self.notes, &self.photo] {
            match field {
                Some(value) => {
                    hasher.update(&[1]);
                    hasher.update(&(value.len() as u64).to_le_bytes());
                    hasher.update(value.as_bytes());
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Whether the record carries a photo.
    #[must_use]
    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }
}

fn validate_species(species: &str) -> Result<()> {
    if species.trim().is_empty() {
        return Err(Error::invalid_sighting("species is required"));
    }
    Ok(())
}

fn validate_photo(photo: &str) -> Result<()> {
    if !photo_data_uri().is_match(photo) {
        return Err(Error::invalid_sighting(
            "photo must be a base64 image data URI",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHOTO: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRg==";

    fn capivara() -> NewSighting {
        NewSighting::new("Capivara", Position::new(-14.235, -51.9253))
    }

    #[test]
    fn test_generated_id_shape() {
        let id = SightingId::generate();
        let (millis, suffix) = id.as_str().split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), ID_SUFFIX_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_generated_ids_differ() {
        let now = Utc::now();
        assert_ne!(SightingId::generate_at(now), SightingId::generate_at(now));
    }

    #[test]
    fn test_position_validate() {
        assert!(Position::new(-14.235, -51.9253).validate().is_ok());
        assert!(Position::new(90.0, 180.0).validate().is_ok());
        assert!(Position::new(90.5, 0.0).validate().is_err());
        assert!(Position::new(0.0, -180.1).validate().is_err());
        assert!(Position::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_source_round_trip_through_str() {
        assert_eq!("map".parse::<SightingSource>().unwrap(), SightingSource::Map);
        assert_eq!(SightingSource::Camera.to_string(), "camera");
        assert!("drone".parse::<SightingSource>().is_err());
    }

    #[test]
    fn test_new_sighting_validate() {
        assert!(capivara().validate().is_ok());
        assert!(capivara().with_photo(PHOTO).validate().is_ok());
        assert!(NewSighting::new("  ", Position::new(0.0, 0.0))
            .validate()
            .is_err());

        let err = capivara().with_photo("not-a-photo").validate().unwrap_err();
        assert!(err.to_string().contains("data URI"));
    }

    #[test]
    fn test_create_is_unsynced_and_keeps_input() {
        let record = SightingRecord::create(
            SightingId::from("1-abc"),
            NewSighting::new(" Capivara ", Position::new(1.0, 2.0)),
        );
        assert_eq!(record.species, " Capivara ");
        assert!(!record.synced);
        assert!(record.notes.is_none());
    }

    #[test]
    fn test_create_respects_captured_at_override() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = SightingRecord::create(SightingId::from("x"), capivara().captured_at(at));
        assert_eq!(record.captured_at, at);
    }

    #[test]
    fn test_patched_clears_sync_flag() {
        let mut record = SightingRecord::create(SightingId::from("x"), capivara());
        record.synced = true;

        let updated = record.patched(&SightingPatch::new().notes("near the river"));
        assert!(!updated.synced);
        assert_eq!(updated.notes.as_deref(), Some("near the river"));
        assert_eq!(updated.species, "Capivara");
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.captured_at, record.captured_at);
    }

    #[test]
    fn test_patched_clears_optional_fields() {
        let record = SightingRecord::create(
            SightingId::from("x"),
            capivara().with_notes("n").with_photo(PHOTO),
        );
        let updated = record.patched(&SightingPatch::new().clear_notes().clear_photo());
        assert!(updated.notes.is_none());
        assert!(!updated.has_photo());
    }

    #[test]
    fn test_patch_is_empty_and_validate() {
        assert!(SightingPatch::new().is_empty());
        assert!(!SightingPatch::new().species("Anta").is_empty());
        assert!(SightingPatch::new().species("").validate().is_err());
        assert!(SightingPatch::new().photo("nope").validate().is_err());
        assert!(SightingPatch::new().clear_photo().validate().is_ok());
    }

    #[test]
    fn test_fingerprint_tracks_content_not_sync_flag() {
        let record = SightingRecord::create(SightingId::from("x"), capivara());
        let mut synced = record.clone();
        synced.synced = true;
        assert_eq!(record.fingerprint(), synced.fingerprint());

        let renamed = record.patched(&SightingPatch::new().species("Anta"));
        assert_ne!(record.fingerprint(), renamed.fingerprint());

        let with_notes = record.patched(&SightingPatch::new().notes(""));
        assert_ne!(record.fingerprint(), with_notes.fingerprint());
    }

    #[test]
    fn test_record_serialization() {
        let record = SightingRecord::create(
            SightingId::from("1700000000000-abcdefghi"),
            capivara().with_source(SightingSource::Camera),
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"id\":\"1700000000000-abcdefghi\""));
        assert!(json.contains("\"source\":\"camera\""));
        assert!(!json.contains("photo"));

        let back: SightingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
