//! Storage layer for sightline.
//!
//! This module provides `SQLite`-based durable storage for sightings: one
//! table keyed by id, indexed on `captured_at` for newest-first listing and on
//! `synced` for pending lookups.

mod backend;
pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::sighting::{Position, SightingId, SightingRecord, SightingSource};

pub use backend::{SightingBackend, SqliteBackend};

/// Columns selected for every sighting query, in `row_to_sighting` order.
const SIGHTING_COLUMNS: &str =
    "id, lat, lng, species, notes, photo, captured_at, source, synced";

/// Storage engine for sightings.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Upserts keyed by sighting id
/// - Newest-first listing
/// - Pending (unsynced) lookups and bulk acknowledgement
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist
    /// and migrates the schema to the current version.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migration fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace a sighting, keyed by its id.
    ///
    /// Replacing keeps the row's insertion position, so edits never reorder
    /// records that share a capture time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn put(&self, record: &SightingRecord) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO sightings (id, lat, lng, species, notes, photo, captured_at, source, synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                lat = excluded.lat,
                lng = excluded.lng,
                species = excluded.species,
                notes = excluded.notes,
                photo = excluded.photo,
                source = excluded.source,
                synced = excluded.synced,
                updated_at = datetime('now')
            ",
            params![
                record.id.as_str(),
                record.position.lat,
                record.position.lng,
                record.species,
                record.notes,
                record.photo,
                format_timestamp(record.captured_at),
                record.source.map(|s| s.to_string()),
                record.synced,
            ],
        )?;

        debug!(id = %record.id, synced = record.synced, "Stored sighting");
        Ok(())
    }

    /// Get a sighting by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, id: &SightingId) -> Result<Option<SightingRecord>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {SIGHTING_COLUMNS} FROM sightings WHERE id = ?1"),
                [id.as_str()],
                Self::row_to_sighting,
            )
            .optional()?;
        Ok(result)
    }

    /// Get every sighting, newest first.
    ///
    /// Rows that cannot be decoded are skipped with a warning rather than
    /// failing the whole listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_all(&self) -> Result<Vec<SightingRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SIGHTING_COLUMNS} FROM sightings \
             ORDER BY captured_at DESC, rowid DESC"
        ))?;

        let sightings = stmt
            .query_map([], Self::row_to_sighting)?
            .filter_map(|row| match row {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable sighting row");
                    None
                }
            })
            .collect();

        Ok(sightings)
    }

    /// Delete a sighting by id.
    ///
    /// Returns `true` if a sighting was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete(&self, id: &SightingId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM sightings WHERE id = ?1", [id.as_str()])?;
        Ok(affected > 0)
    }

    /// Mark the given sightings as synced in a single transaction.
    ///
    /// Returns the number of rows that changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; no row is changed
    /// in that case.
    pub fn mark_synced(&self, ids: &[SightingId]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE sightings SET synced = 1, updated_at = datetime('now') \
                 WHERE id = ?1 AND synced = 0",
            )?;
            for id in ids {
                changed += stmt.execute([id.as_str()])?;
            }
        }
        tx.commit()?;

        if changed > 0 {
            info!("Marked {} sightings as synced", changed);
        }
        Ok(changed)
    }

    /// Count total sightings in storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sightings", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Count sightings still waiting for sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_unsynced(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sightings WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(captured_at), MAX(captured_at) FROM sightings",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_sightings: self.count()?,
            unsynced_sightings: self.count_unsynced()?,
            oldest_sighting: oldest.as_deref().and_then(parse_timestamp),
            newest_sighting: newest.as_deref().and_then(parse_timestamp),
            db_size_bytes,
        })
    }

    /// Convert a database row to a `SightingRecord`.
    fn row_to_sighting(row: &rusqlite::Row) -> rusqlite::Result<SightingRecord> {
        let id: String = row.get(0)?;
        let lat: f64 = row.get(1)?;
        let lng: f64 = row.get(2)?;
        let species: String = row.get(3)?;
        let notes: Option<String> = row.get(4)?;
        let photo: Option<String> = row.get(5)?;
        let captured_at_str: String = row.get(6)?;
        let source_str: Option<String> = row.get(7)?;
        let synced: bool = row.get(8)?;

        let captured_at = parse_timestamp(&captured_at_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("invalid captured_at for sighting {id}: {captured_at_str}").into(),
            )
        })?;

        let source = source_str.and_then(|s| match s.parse::<SightingSource>() {
            Ok(source) => Some(source),
            Err(_) => {
                warn!("Unknown sighting source: {}, ignoring", s);
                None
            }
        });

        Ok(SightingRecord {
            id: SightingId::from(id),
            position: Position::new(lat, lng),
            species,
            notes,
            photo,
            captured_at,
            source,
            synced,
        })
    }
}

/// Fixed-width RFC 3339 so lexical order in `SQLite` matches time order.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of sightings stored.
    pub total_sightings: i64,
    /// Sightings not yet synced.
    pub unsynced_sightings: i64,
    /// Capture time of the oldest sighting.
    pub oldest_sighting: Option<DateTime<Utc>>,
    /// Capture time of the newest sighting.
    pub newest_sighting: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sighting::NewSighting;
    use chrono::Duration;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn create_test_sighting(species: &str) -> SightingRecord {
        SightingRecord::create(
            SightingId::generate(),
            NewSighting::new(species, Position::new(-14.235, -51.9253)),
        )
    }

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_put_and_get() {
        let storage = create_test_storage();
        let mut record = create_test_sighting("Capivara");
        record.notes = Some("grazing".to_string());
        record.source = Some(SightingSource::Map);

        storage.put(&record).unwrap();

        let retrieved = storage.get(&record.id).unwrap().unwrap();
        assert_eq!(retrieved, record);
    }

    #[test]
    fn test_put_replaces_existing() {
        let storage = create_test_storage();
        let mut record = create_test_sighting("Capivara");
        storage.put(&record).unwrap();

        record.species = "Anta".to_string();
        record.synced = true;
        storage.put(&record).unwrap();

        assert_eq!(storage.count().unwrap(), 1);
        let retrieved = storage.get(&record.id).unwrap().unwrap();
        assert_eq!(retrieved.species, "Anta");
        assert!(retrieved.synced);
    }

    #[test]
    fn test_get_nonexistent() {
        let storage = create_test_storage();
        assert!(storage.get(&SightingId::from("missing")).unwrap().is_none());
    }

    #[test]
    fn test_get_all_newest_first() {
        let storage = create_test_storage();
        let base = Utc::now();

        let mut older = create_test_sighting("Older");
        older.captured_at = base - Duration::minutes(5);
        let mut newer = create_test_sighting("Newer");
        newer.captured_at = base;

        storage.put(&newer).unwrap();
        storage.put(&older).unwrap();

        let all = storage.get_all().unwrap();
        let species: Vec<_> = all.iter().map(|r| r.species.as_str()).collect();
        assert_eq!(species, vec!["Newer", "Older"]);
    }

    #[test]
    fn test_get_all_ties_break_by_insertion() {
        let storage = create_test_storage();
        let at = Utc::now();

        for species in ["R1", "R2", "R3"] {
            let mut record = create_test_sighting(species);
            record.captured_at = at;
            storage.put(&record).unwrap();
        }

        let species: Vec<_> = storage
            .get_all()
            .unwrap()
            .into_iter()
            .map(|r| r.species)
            .collect();
        assert_eq!(species, vec!["R3", "R2", "R1"]);
    }

    #[test]
    fn test_get_all_skips_corrupt_rows() {
        let storage = create_test_storage();
        storage.put(&create_test_sighting("Good")).unwrap();
        storage
            .conn
            .execute(
                "INSERT INTO sightings (id, lat, lng, species, captured_at) \
                 VALUES ('bad', 0, 0, 'Bad', 'yesterday-ish')",
                [],
            )
            .unwrap();

        let all = storage.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].species, "Good");
    }

    #[test]
    fn test_count_unsynced() {
        let storage = create_test_storage();
        let pending = create_test_sighting("Pending");
        let mut done = create_test_sighting("Done");
        done.synced = true;

        storage.put(&pending).unwrap();
        storage.put(&done).unwrap();

        assert_eq!(storage.get_all().unwrap().len(), 2);
        assert_eq!(storage.count_unsynced().unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let storage = create_test_storage();
        let record = create_test_sighting("To delete");
        storage.put(&record).unwrap();

        assert!(storage.delete(&record.id).unwrap());
        assert!(storage.get(&record.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_nonexistent() {
        let storage = create_test_storage();
        assert!(!storage.delete(&SightingId::from("nonexistent-id")).unwrap());
    }

    #[test]
    fn test_mark_synced() {
        let storage = create_test_storage();
        let a = create_test_sighting("A");
        let b = create_test_sighting("B");
        storage.put(&a).unwrap();
        storage.put(&b).unwrap();

        let changed = storage
            .mark_synced(&[a.id.clone(), SightingId::from("ghost")])
            .unwrap();
        assert_eq!(changed, 1);
        assert!(storage.get(&a.id).unwrap().unwrap().synced);
        assert!(!storage.get(&b.id).unwrap().unwrap().synced);

        // Already synced rows are not counted again.
        assert_eq!(storage.mark_synced(&[a.id.clone()]).unwrap(), 0);
    }

    #[test]
    fn test_stats_empty() {
        let storage = create_test_storage();
        let stats = storage.stats().unwrap();

        assert_eq!(stats.total_sightings, 0);
        assert_eq!(stats.unsynced_sightings, 0);
        assert!(stats.oldest_sighting.is_none());
        assert!(stats.newest_sighting.is_none());
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_stats_with_data() {
        let storage = create_test_storage();
        storage.put(&create_test_sighting("First")).unwrap();
        storage.put(&create_test_sighting("Second")).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_sightings, 2);
        assert_eq!(stats.unsynced_sightings, 2);
        assert!(stats.oldest_sighting.is_some());
        assert!(stats.oldest_sighting <= stats.newest_sighting);
    }

    #[test]
    fn test_unicode_and_photo_round_trip() {
        let storage = create_test_storage();
        let mut record = create_test_sighting("Onça-pintada");
        record.notes = Some("pegadas perto do rio 🐾".to_string());
        record.photo = Some(format!("data:image/png;base64,{}", "A".repeat(50_000)));

        storage.put(&record).unwrap();
        let retrieved = storage.get(&record.id).unwrap().unwrap();
        assert_eq!(retrieved, record);
    }

    #[test]
    fn test_open_file_based_persists_across_reopen() {
        let db_path =
            std::env::temp_dir().join(format!("sightline_test_{}.db", std::process::id()));
        let record = create_test_sighting("Persisted");

        {
            let storage = Storage::open(&db_path).unwrap();
            storage.put(&record).unwrap();
            assert_eq!(storage.path(), db_path);
        }

        let storage = Storage::open(&db_path).unwrap();
        assert_eq!(storage.get(&record.id).unwrap().unwrap(), record);
        assert!(storage.stats().unwrap().db_size_bytes > 0);

        drop(storage);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let nested_path = std::env::temp_dir().join(format!(
            "sightline_test_{}/nested/db.sqlite",
            std::process::id()
        ));

        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }

        let storage = Storage::open(&nested_path).unwrap();
        assert!(nested_path.exists());

        drop(storage);
        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent.parent().unwrap());
        }
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = format_timestamp(Utc::now());
        let b = format_timestamp(DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(a.len(), b.len());
        assert_eq!(parse_timestamp(&b), Some(DateTime::<Utc>::UNIX_EPOCH));
    }
}
