//! Write-through record store for sightings.
//!
//! [`SightingStore`] keeps a newest-first in-memory collection in front of a
//! [`SightingBackend`]. Every mutation is written durably first; the
//! collection only changes once the backend confirms, so a failed write never
//! leaves the two disagreeing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::sighting::{NewSighting, SightingId, SightingPatch, SightingRecord};
use crate::storage::SightingBackend;

/// Default bound on a single storage operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// A record the sync transport acknowledged, with the content it saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    /// The acknowledged sighting.
    pub id: SightingId,
    /// Fingerprint of the content that was pushed.
    pub fingerprint: String,
}

/// Durable CRUD over sightings with a newest-first in-memory view.
#[derive(Debug)]
pub struct SightingStore {
    backend: Arc<dyn SightingBackend>,
    records: Vec<SightingRecord>,
    operation_timeout: Duration,
}

impl SightingStore {
    /// Create an empty store over `backend`. Call [`load`](Self::load) to
    /// populate it.
    #[must_use]
    pub fn new(backend: Arc<dyn SightingBackend>) -> Self {
        Self {
            backend,
            records: Vec::new(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Bound every storage call by `timeout`.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Replace the in-memory collection with what storage holds.
    ///
    /// Never fails: if storage is unavailable, corrupt, or too slow the error
    /// is logged and the collection is left empty.
    pub async fn load(&mut self) -> &[SightingRecord] {
        match self.bounded("load sightings", self.backend.get_all()).await {
            Ok(mut records) => {
                records.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
                info!(count = records.len(), "Loaded sightings");
                self.records = records;
            }
            Err(e) if e.is_timeout() => {
                warn!(error = %e, "Storage too slow to load sightings, starting empty");
                self.records.clear();
            }
            Err(e) => {
                warn!(error = %e, "Could not load sightings, starting empty");
                self.records.clear();
            }
        }
        &self.records
    }

    /// Create and persist a new sighting.
    ///
    /// The record is prepended to the collection only after storage accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSighting`] for bad input, or the storage error
    /// if the write fails; the collection is unchanged in both cases.
    pub async fn add(&mut self, new: NewSighting) -> Result<SightingRecord> {
        new.validate()?;

        let mut id = SightingId::generate();
        while self.get(&id).is_some() {
            debug!(%id, "Generated id collides, regenerating");
            id = SightingId::generate();
        }

        let record = SightingRecord::create(id, new);
        self.bounded("store sighting", self.backend.put(&record))
            .await?;

        debug!(id = %record.id, species = %record.species, "Added sighting");
        let position = self
            .records
            .iter()
            .position(|r| r.captured_at <= record.captured_at)
            .unwrap_or(self.records.len());
        self.records.insert(position, record.clone());
        Ok(record)
    }

    /// Merge `patch` into an existing sighting and clear its sync flag.
    ///
    /// Returns `Ok(None)` (and logs) when no sighting has that id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSighting`] for a bad patch, or the storage
    /// error if the write fails; the collection is unchanged in both cases.
    pub async fn update(
        &mut self,
        id: &SightingId,
        patch: &SightingPatch,
    ) -> Result<Option<SightingRecord>> {
        patch.validate()?;

        let Some(index) = self.index_of(id) else {
            warn!(%id, "Ignoring update for unknown sighting");
            return Ok(None);
        };

        let updated = self.records[index].patched(patch);
        self.bounded("update sighting", self.backend.put(&updated))
            .await?;

        debug!(%id, "Updated sighting");
        self.records[index] = updated.clone();
        Ok(Some(updated))
    }

    /// Delete a sighting. Removing an unknown id is a no-op.
    ///
    /// Returns whether a sighting was removed from the collection.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the delete fails; the collection is
    /// unchanged in that case.
    pub async fn remove(&mut self, id: &SightingId) -> Result<bool> {
        self.bounded("delete sighting", self.backend.delete(id))
            .await?;

        match self.index_of(id) {
            Some(index) => {
                self.records.remove(index);
                debug!(%id, "Removed sighting");
                Ok(true)
            }
            None => {
                debug!(%id, "Remove of unknown sighting was a no-op");
                Ok(false)
            }
        }
    }

    /// Mark acknowledged sightings as synced.
    ///
    /// An acknowledgement whose fingerprint no longer matches the stored
    /// record is ignored: the record changed after it was pushed and must go
    /// out again. Returns the ids that were marked.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write fails; no record is marked in
    /// that case.
    pub async fn mark_synced(&mut self, acks: &[Acknowledgement]) -> Result<Vec<SightingId>> {
        let ids: Vec<SightingId> = acks
            .iter()
            .filter(|ack| match self.get(&ack.id) {
                Some(record) if !record.synced => {
                    let current = record.fingerprint() == ack.fingerprint;
                    if !current {
                        debug!(id = %ack.id, "Sighting changed in flight, keeping it pending");
                    }
                    current
                }
                _ => false,
            })
            .map(|ack| ack.id.clone())
            .collect();

        if ids.is_empty() {
            return Ok(ids);
        }

        self.bounded("mark sightings synced", self.backend.mark_synced(&ids))
            .await?;

        for record in &mut self.records {
            if ids.contains(&record.id) {
                record.synced = true;
            }
        }
        Ok(ids)
    }

    /// All sightings, newest first.
    #[must_use]
    pub fn records(&self) -> &[SightingRecord] {
        &self.records
    }

    /// Look up a sighting by id.
    #[must_use]
    pub fn get(&self, id: &SightingId) -> Option<&SightingRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// Snapshot of sightings still waiting for sync, newest first.
    #[must_use]
    pub fn unsynced(&self) -> Vec<SightingRecord> {
        self.records.iter().filter(|r| !r.synced).cloned().collect()
    }

    /// Number of sightings with `synced == false`.
    ///
    /// Recomputed from the collection on every call; there is no separate
    /// counter to drift.
    #[must_use]
    pub fn pending_sync_count(&self) -> usize {
        self.records.iter().filter(|r| !r.synced).count()
    }

    /// Number of sightings held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no sightings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn index_of(&self, id: &SightingId) -> Option<usize> {
        self.records.iter().position(|r| &r.id == id)
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| Error::timeout(operation))?
    }
}
