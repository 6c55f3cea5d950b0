//! Presentation-facing handle over the sighting store.
//!
//! [`SightingsContext`] is built once at application start with its
//! dependencies passed in, then handed to whatever renders sightings. It
//! publishes a [`SightingsSnapshot`] after every change and exposes the
//! mutation actions. Errors stop here: they are logged and turned into
//! `None`/`false` results so a presentation layer never has to handle a
//! storage failure.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::network::{NetworkMonitor, NetworkStatus};
use crate::sighting::{NewSighting, SightingId, SightingPatch, SightingRecord};
use crate::storage::SightingBackend;
use crate::store::{SightingStore, DEFAULT_OPERATION_TIMEOUT};
use crate::sync::{SyncCoordinator, SyncReport, SyncSettings, SyncTransport};

/// What a presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SightingsSnapshot {
    /// All sightings, newest first.
    pub records: Vec<SightingRecord>,
    /// The initial load has not finished.
    pub is_loading: bool,
    /// Current network status.
    pub is_online: bool,
    /// Sightings not yet synced.
    pub pending_sync_count: usize,
}

/// Behavior switches for a [`SightingsContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSettings {
    /// Attempt a sync right after each successful add when online.
    pub auto_sync_on_add: bool,
    /// Bound on each storage operation.
    pub operation_timeout: Duration,
    /// Sync batching and timeout.
    pub sync: SyncSettings,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            auto_sync_on_add: true,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            sync: SyncSettings::default(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    store: Mutex<SightingStore>,
    coordinator: SyncCoordinator,
    snapshot: watch::Sender<SightingsSnapshot>,
    auto_sync_on_add: bool,
}

impl Inner {
    fn publish(&self, store: &SightingStore) {
        self.snapshot.send_replace(SightingsSnapshot {
            records: store.records().to_vec(),
            is_loading: false,
            is_online: self.coordinator.network().is_online(),
            pending_sync_count: store.pending_sync_count(),
        });
    }

    async fn load(&self) {
        let mut store = self.store.lock().await;
        store.load().await;
        self.publish(&store);
    }

    async fn loaded(&self) {
        let mut rx = self.snapshot.subscribe();
        // The sender lives in `self`, so the channel stays open.
        let _ = rx.wait_for(|s| !s.is_loading).await;
    }

    async fn sync(&self) -> Option<SyncReport> {
        self.loaded().await;
        let result = self.coordinator.sync(&self.store).await;
        self.publish(&*self.store.lock().await);
        match result {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Sync failed");
                None
            }
        }
    }

    async fn watch_network(self: Arc<Self>, mut rx: watch::Receiver<NetworkStatus>) {
        while rx.changed().await.is_ok() {
            let online = rx.borrow_and_update().is_online();
            self.snapshot.send_if_modified(|snapshot| {
                let changed = snapshot.is_online != online;
                snapshot.is_online = online;
                changed
            });
            if online {
                debug!("Back online, syncing");
                self.sync().await;
            }
        }
    }
}

/// Shared handle to the sighting store, its sync coordinator, and the
/// published snapshot.
///
/// Must be created inside a tokio runtime. Dropping it stops the network
/// watcher.
#[derive(Debug)]
pub struct SightingsContext {
    inner: Arc<Inner>,
    watcher: JoinHandle<()>,
}

impl SightingsContext {
    /// Build the context and start loading in the background.
    ///
    /// The first snapshot has `is_loading == true`. Actions issued before the
    /// load finishes wait for it.
    #[must_use]
    pub fn new(
        backend: Arc<dyn SightingBackend>,
        transport: Box<dyn SyncTransport>,
        network: NetworkMonitor,
        settings: ContextSettings,
    ) -> Self {
        let store = Mutex::new(
            SightingStore::new(backend).with_operation_timeout(settings.operation_timeout),
        );
        let (snapshot, _rx) = watch::channel(SightingsSnapshot {
            is_loading: true,
            is_online: network.is_online(),
            ..SightingsSnapshot::default()
        });

        let inner = Arc::new(Inner {
            store,
            coordinator: SyncCoordinator::new(transport, network, settings.sync),
            snapshot,
            auto_sync_on_add: settings.auto_sync_on_add,
        });

        // Actions wait for this load before touching the store.
        let loader = Arc::clone(&inner);
        tokio::spawn(async move { loader.load().await });

        let network_rx = inner.coordinator.network().subscribe();
        let watcher = tokio::spawn(Arc::clone(&inner).watch_network(network_rx));
        Self { inner, watcher }
    }

    /// Build the context and wait for the initial load.
    pub async fn start(
        backend: Arc<dyn SightingBackend>,
        transport: Box<dyn SyncTransport>,
        network: NetworkMonitor,
        settings: ContextSettings,
    ) -> Self {
        let context = Self::new(backend, transport, network, settings);
        context.ready().await;
        context
    }

    /// Wait until the initial load has finished.
    pub async fn ready(&self) {
        self.inner.loaded().await;
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SightingsSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Observe every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SightingsSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// The network signal driving sync.
    #[must_use]
    pub fn network(&self) -> &NetworkMonitor {
        self.inner.coordinator.network()
    }

    /// Record a new sighting.
    ///
    /// Returns the stored record, or `None` if it was rejected or could not
    /// be persisted. When online, a sync is started in the background.
    pub async fn add(&self, new: NewSighting) -> Option<SightingRecord> {
        self.inner.loaded().await;
        let record = {
            let mut store = self.inner.store.lock().await;
            match store.add(new).await {
                Ok(record) => {
                    self.inner.publish(&store);
                    record
                }
                Err(e) => {
                    error!(error = %e, "Could not add sighting");
                    return None;
                }
            }
        };

        if self.inner.auto_sync_on_add && self.network().is_online() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.sync().await });
        }
        Some(record)
    }

    /// Edit a sighting. Returns the updated record, or `None` if the id is
    /// unknown or the edit failed.
    pub async fn update(&self, id: &SightingId, patch: &SightingPatch) -> Option<SightingRecord> {
        self.inner.loaded().await;
        let mut store = self.inner.store.lock().await;
        match store.update(id, patch).await {
            Ok(updated) => {
                if updated.is_some() {
                    self.inner.publish(&store);
                }
                updated
            }
            Err(e) => {
                error!(%id, error = %e, "Could not update sighting");
                None
            }
        }
    }

    /// Delete a sighting. Returns whether it existed and was removed.
    pub async fn remove(&self, id: &SightingId) -> bool {
        self.inner.loaded().await;
        let mut store = self.inner.store.lock().await;
        match store.remove(id).await {
            Ok(removed) => {
                if removed {
                    self.inner.publish(&store);
                }
                removed
            }
            Err(e) => {
                error!(%id, error = %e, "Could not remove sighting");
                false
            }
        }
    }

    /// Sync now. Returns `None` if acknowledged records could not be saved.
    pub async fn sync(&self) -> Option<SyncReport> {
        self.inner.sync().await
    }

    /// Re-read everything from storage.
    pub async fn reload(&self) {
        self.inner.load().await;
    }
}

impl Drop for SightingsContext {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
