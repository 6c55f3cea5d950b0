//! `SQLite` schema definitions for sightline.
//!
//! Statements are grouped by the schema version that introduced them; the
//! migration runner applies each group once, in order.

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the sightings table.
///
/// The table keeps its implicit rowid; upserts preserve it, so `rowid` orders
/// records that share a `captured_at` by insertion.
pub const CREATE_SIGHTINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sightings (
    id TEXT PRIMARY KEY NOT NULL,
    lat REAL NOT NULL,
    lng REAL NOT NULL,
    species TEXT NOT NULL,
    notes TEXT,
    photo TEXT,
    captured_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create an index on `captured_at` for newest-first listing.
pub const CREATE_CAPTURED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_sightings_captured_at ON sightings(captured_at DESC)
";

/// SQL statement to create an index on `synced` for pending lookups.
pub const CREATE_SYNCED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_sightings_synced ON sightings(synced)
";

/// SQL statement recording whether a sighting came from the map or the camera.
pub const ADD_SOURCE_COLUMN: &str = r"
ALTER TABLE sightings ADD COLUMN source TEXT
";

/// Version 1: the sightings table and its indexes.
pub const V1_STATEMENTS: &[&str] = &[
    CREATE_SIGHTINGS_TABLE,
    CREATE_CAPTURED_AT_INDEX,
    CREATE_SYNCED_INDEX,
];

/// Version 2: sighting source.
pub const V2_STATEMENTS: &[&str] = &[ADD_SOURCE_COLUMN];

/// Statements for every schema version, indexed by `version - 1`.
pub const MIGRATIONS: &[&[&str]] = &[V1_STATEMENTS, V2_STATEMENTS];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert!(!MIGRATIONS.is_empty());
        for version in MIGRATIONS {
            assert!(!version.is_empty());
            for stmt in *version {
                assert!(!stmt.trim().is_empty());
            }
        }
    }

    #[test]
    fn test_create_sightings_table_contains_required_columns() {
        assert!(CREATE_SIGHTINGS_TABLE.contains("id TEXT PRIMARY KEY"));
        assert!(CREATE_SIGHTINGS_TABLE.contains("lat REAL NOT NULL"));
        assert!(CREATE_SIGHTINGS_TABLE.contains("lng REAL NOT NULL"));
        assert!(CREATE_SIGHTINGS_TABLE.contains("species TEXT NOT NULL"));
        assert!(CREATE_SIGHTINGS_TABLE.contains("captured_at TEXT NOT NULL"));
        assert!(CREATE_SIGHTINGS_TABLE.contains("synced INTEGER NOT NULL"));
    }

    #[test]
    fn test_create_metadata_table_structure() {
        assert!(CREATE_METADATA_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_METADATA_TABLE.contains("value TEXT NOT NULL"));
    }
}
