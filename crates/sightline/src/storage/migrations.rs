//! Database migration system for sightline.
//!
//! The schema version lives in the `metadata` table. Opening a database
//! applies every version above the stored one, each inside its own
//! transaction, so an interrupted upgrade never leaves a half-applied step.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::schema::{CREATE_METADATA_TABLE, MIGRATIONS};

/// The current schema version.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const CURRENT_VERSION: i32 = MIGRATIONS.len() as i32;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Bring the database schema up to [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns an error if the stored version is unreadable, newer than this
/// build understands, or a migration statement fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute(CREATE_METADATA_TABLE, [])?;

    let version = get_schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }

    for next in (version + 1)..=CURRENT_VERSION {
        run_migration(conn, next)?;
    }

    if version < CURRENT_VERSION {
        info!(from = version, to = CURRENT_VERSION, "Migrated sightings schema");
    }
    Ok(())
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (fresh database).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
        None => Ok(0),
    }
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

/// Apply one schema version and record it, atomically.
fn run_migration(conn: &Connection, version: i32) -> Result<()> {
    let statements = usize::try_from(version - 1)
        .ok()
        .and_then(|index| MIGRATIONS.get(index))
        .ok_or_else(|| Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        })?;

    debug!(version, "Applying schema migration");
    let tx = conn.unchecked_transaction()?;
    for statement in *statements {
        tx.execute(statement, [])?;
    }
    set_schema_version(&tx, version)?;
    tx.commit()?;
    Ok(())
}
