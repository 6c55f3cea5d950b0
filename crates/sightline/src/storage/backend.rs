//! Async storage boundary consumed by the record store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::sighting::{SightingId, SightingRecord};

use super::{Storage, StorageStats};

/// Durable, keyed storage for sightings.
///
/// The record store only talks to storage through this trait, which keeps
/// the `SQLite` engine swappable and lets tests inject failing backends.
#[async_trait]
pub trait SightingBackend: Send + Sync + std::fmt::Debug {
    /// Read every stored sighting, newest first.
    async fn get_all(&self) -> Result<Vec<SightingRecord>>;

    /// Insert or replace a sighting keyed by its id.
    async fn put(&self, record: &SightingRecord) -> Result<()>;

    /// Delete a sighting. Returns `false` if it did not exist.
    async fn delete(&self, id: &SightingId) -> Result<bool>;

    /// Mark the given sightings synced. Returns how many changed.
    async fn mark_synced(&self, ids: &[SightingId]) -> Result<usize>;
}

/// [`SightingBackend`] over a [`Storage`] database.
///
/// `SQLite` calls are blocking, so each one runs on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    path: PathBuf,
    storage: Arc<Mutex<Storage>>,
}

impl SqliteBackend {
    /// Wrap an open storage engine.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            path: storage.path().to_path_buf(),
            storage: Arc::new(Mutex::new(storage)),
        }
    }

    /// Open or create the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Storage::open(path).map(Self::new)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Storage::open_in_memory().map(Self::new)
    }

    /// Path of the underlying database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn stats(&self) -> Result<StorageStats> {
        self.with_storage(|storage| storage.stats()).await
    }

    async fn with_storage<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Storage) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || {
            let guard = storage
                .lock()
                .map_err(|_| Error::internal("storage mutex poisoned"))?;
            f(&*guard)
        })
        .await
        .map_err(|e| Error::internal(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl SightingBackend for SqliteBackend {
    async fn get_all(&self) -> Result<Vec<SightingRecord>> {
        self.with_storage(|storage| storage.get_all()).await
    }

    async fn put(&self, record: &SightingRecord) -> Result<()> {
        let record = record.clone();
        self.with_storage(move |storage| storage.put(&record)).await
    }

    async fn delete(&self, id: &SightingId) -> Result<bool> {
        let id = id.clone();
        self.with_storage(move |storage| storage.delete(&id)).await
    }

    async fn mark_synced(&self, ids: &[SightingId]) -> Result<usize> {
        let ids = ids.to_vec();
        self.with_storage(move |storage| storage.mark_synced(&ids))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sighting::{NewSighting, Position};

    fn record(species: &str) -> SightingRecord {
        SightingRecord::create(
            SightingId::generate(),
            NewSighting::new(species, Position::new(-3.1, -60.0)),
        )
    }

    #[tokio::test]
    async fn test_backend_crud() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let a = record("Boto-cor-de-rosa");

        backend.put(&a).await.unwrap();
        assert_eq!(backend.get_all().await.unwrap(), vec![a.clone()]);

        assert!(backend.delete(&a.id).await.unwrap());
        assert!(!backend.delete(&a.id).await.unwrap());
        assert!(backend.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_mark_synced_and_stats() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let a = record("Arara-azul");
        let b = record("Tucano");
        backend.put(&a).await.unwrap();
        backend.put(&b).await.unwrap();

        assert_eq!(backend.mark_synced(&[b.id.clone()]).await.unwrap(), 1);

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.total_sightings, 2);
        assert_eq!(stats.unsynced_sightings, 1);
    }

    #[tokio::test]
    async fn test_backend_clones_share_database() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let other = backend.clone();
        backend.put(&record("Jacaré")).await.unwrap();

        assert_eq!(other.get_all().await.unwrap().len(), 1);
        assert_eq!(other.path(), Path::new(":memory:"));
    }
}
