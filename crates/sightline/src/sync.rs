//! Reconciliation of pending sightings with a remote authority.
//!
//! The [`SyncCoordinator`] pushes unsynced sightings through a
//! [`SyncTransport`] in batches and marks synced only what the transport
//! acknowledges. A failed or timed-out batch leaves its records pending for
//! the next trigger.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::network::NetworkMonitor;
use crate::sighting::{SightingId, SightingRecord};
use crate::store::{Acknowledgement, SightingStore};

/// Ids a transport confirmed the remote side accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncAck {
    /// Acknowledged sightings.
    pub accepted: Vec<SightingId>,
}

impl SyncAck {
    /// Acknowledge every record in `batch`.
    #[must_use]
    pub fn all(batch: &[SightingRecord]) -> Self {
        Self {
            accepted: batch.iter().map(|r| r.id.clone()).collect(),
        }
    }
}

/// Delivers batches of sightings to a remote authority.
#[async_trait]
pub trait SyncTransport: Send + Sync + std::fmt::Debug {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Push a batch. Records missing from the returned ack stay pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be delivered at all.
    async fn push(&self, batch: &[SightingRecord]) -> Result<SyncAck>;
}

/// Placeholder transport that acknowledges everything without a network call.
///
/// Stands in until a real backend contract exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAckTransport;

#[async_trait]
impl SyncTransport for LocalAckTransport {
    fn name(&self) -> &'static str {
        "local-ack"
    }

    async fn push(&self, batch: &[SightingRecord]) -> Result<SyncAck> {
        debug!(count = batch.len(), "Acknowledging batch locally");
        Ok(SyncAck::all(batch))
    }
}

/// Tuning for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Maximum records per push.
    pub batch_size: usize,
    /// Bound on a single push.
    pub timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// The run did nothing because the network was offline.
    pub skipped_offline: bool,
    /// Records pushed.
    pub attempted: usize,
    /// Records now marked synced.
    pub synced: usize,
    /// Records in batches that failed to deliver.
    pub failed: usize,
    /// Records still pending after the run.
    pub pending: usize,
}

impl SyncReport {
    /// Whether every attempted record went through.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.skipped_offline && self.pending == 0
    }
}

/// Pushes pending sightings when the network allows.
#[derive(Debug)]
pub struct SyncCoordinator {
    transport: Box<dyn SyncTransport>,
    network: NetworkMonitor,
    settings: SyncSettings,
    running: Mutex<()>,
}

impl SyncCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        transport: Box<dyn SyncTransport>,
        network: NetworkMonitor,
        settings: SyncSettings,
    ) -> Self {
        Self {
            transport,
            network,
            settings,
            running: Mutex::new(()),
        }
    }

    /// The network signal this coordinator gates on.
    #[must_use]
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Push every pending sighting in `store`.
    ///
    /// The store is only locked to read the pending set and to record
    /// acknowledgements, never while a push is in flight. A record edited or
    /// removed during the push is not marked synced. Runs on one coordinator
    /// are serialized.
    ///
    /// Transport failures are logged and counted in the report; the affected
    /// records stay pending and later batches still run.
    ///
    /// # Errors
    ///
    /// Returns the storage error if acknowledged records could not be marked
    /// synced durably.
    pub async fn sync(&self, store: &Mutex<SightingStore>) -> Result<SyncReport> {
        let _running = self.running.lock().await;

        if !self.network.is_online() {
            debug!("Offline, skipping sync");
            return Ok(SyncReport {
                skipped_offline: true,
                pending: store.lock().await.pending_sync_count(),
                ..SyncReport::default()
            });
        }

        let pending = store.lock().await.unsynced();
        if pending.is_empty() {
            return Ok(SyncReport::default());
        }

        info!(
            count = pending.len(),
            transport = self.transport.name(),
            "Syncing sightings"
        );

        let mut report = SyncReport::default();
        for batch in pending.chunks(self.settings.batch_size.max(1)) {
            report.attempted += batch.len();

            let ack = match self.push(batch).await {
                Ok(ack) => ack,
                Err(e) => {
                    warn!(error = %e, size = batch.len(), "Sync batch failed, will retry");
                    report.failed += batch.len();
                    continue;
                }
            };

            let acks: Vec<Acknowledgement> = batch
                .iter()
                .filter(|record| ack.accepted.contains(&record.id))
                .map(|record| Acknowledgement {
                    id: record.id.clone(),
                    fingerprint: record.fingerprint(),
                })
                .collect();

            let marked = store.lock().await.mark_synced(&acks).await?;
            report.synced += marked.len();
        }

        report.pending = store.lock().await.pending_sync_count();
        if report.pending == 0 {
            info!(synced = report.synced, "Sync completed");
        } else {
            warn!(
                synced = report.synced,
                pending = report.pending,
                "Sync finished with records still pending"
            );
        }
        Ok(report)
    }

    async fn push(&self, batch: &[SightingRecord]) -> Result<SyncAck> {
        tokio::time::timeout(self.settings.timeout, self.transport.push(batch))
            .await
            .map_err(|_| Error::timeout(format!("sync push via {}", self.transport.name())))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::network::NetworkStatus;
    use crate::sighting::{NewSighting, Position, SightingPatch};
    use crate::storage::SqliteBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Transport that records what it saw and fails or partially accepts on demand.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        pub(crate) fail: std::sync::atomic::AtomicBool,
        pub(crate) reject: std::sync::Mutex<Vec<SightingId>>,
        pub(crate) pushes: AtomicUsize,
        pub(crate) seen: std::sync::Mutex<Vec<SightingId>>,
    }

    #[async_trait]
    impl SyncTransport for Arc<ScriptedTransport> {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn push(&self, batch: &[SightingRecord]) -> Result<SyncAck> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .extend(batch.iter().map(|r| r.id.clone()));
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::sync_transport("scripted", "connection reset"));
            }
            let reject = self.reject.lock().unwrap();
            Ok(SyncAck {
                accepted: batch
                    .iter()
                    .map(|r| r.id.clone())
                    .filter(|id| !reject.contains(id))
                    .collect(),
            })
        }
    }

    /// Transport that parks each push until released.
    #[derive(Debug, Default)]
    pub(crate) struct GatedTransport {
        pub(crate) entered: tokio::sync::Notify,
        pub(crate) release: tokio::sync::Notify,
    }

    #[async_trait]
    impl SyncTransport for Arc<GatedTransport> {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn push(&self, batch: &[SightingRecord]) -> Result<SyncAck> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(SyncAck::all(batch))
        }
    }

    #[derive(Debug)]
    struct HangingTransport;

    #[async_trait]
    impl SyncTransport for HangingTransport {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn push(&self, _batch: &[SightingRecord]) -> Result<SyncAck> {
            std::future::pending().await
        }
    }

    async fn store_with(count: usize) -> Mutex<SightingStore> {
        let mut store = SightingStore::new(Arc::new(SqliteBackend::open_in_memory().unwrap()));
        for i in 0..count {
            store
                .add(NewSighting::new(format!("Species {i}"), Position::new(0.0, 0.0)))
                .await
                .unwrap();
        }
        Mutex::new(store)
    }

    fn coordinator(transport: Box<dyn SyncTransport>, online: bool) -> SyncCoordinator {
        SyncCoordinator::new(
            transport,
            NetworkMonitor::new(NetworkStatus::from(online)),
            SyncSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_local_ack_syncs_everything() {
        let store = store_with(3).await;
        assert_eq!(store.lock().await.pending_sync_count(), 3);

        let report = coordinator(Box::new(LocalAckTransport), true)
            .sync(&store)
            .await
            .unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.synced, 3);
        assert!(report.is_complete());
        assert_eq!(store.lock().await.pending_sync_count(), 0);
        assert!(store.lock().await.records().iter().all(|r| r.synced));
    }

    #[tokio::test]
    async fn test_offline_sync_is_skipped() {
        let store = store_with(2).await;
        let report = coordinator(Box::new(LocalAckTransport), false)
            .sync(&store)
            .await
            .unwrap();

        assert!(report.skipped_offline);
        assert_eq!(report.pending, 2);
        assert!(!report.is_complete());
        assert_eq!(store.lock().await.pending_sync_count(), 2);
    }

    #[tokio::test]
    async fn test_nothing_pending() {
        let store = store_with(0).await;
        let report = coordinator(Box::new(LocalAckTransport), true)
            .sync(&store)
            .await
            .unwrap();
        assert_eq!(report, SyncReport::default());
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_records_pending() {
        let store = store_with(2).await;
        let transport = Arc::new(ScriptedTransport::default());
        transport.fail.store(true, Ordering::SeqCst);

        let report = coordinator(Box::new(transport.clone()), true)
            .sync(&store)
            .await
            .unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.synced, 0);
        assert_eq!(store.lock().await.pending_sync_count(), 2);

        transport.fail.store(false, Ordering::SeqCst);
        let report = coordinator(Box::new(transport), true)
            .sync(&store)
            .await
            .unwrap();
        assert_eq!(report.synced, 2);
        assert_eq!(store.lock().await.pending_sync_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_ack_only_marks_accepted() {
        let store = store_with(3).await;
        let rejected = store.lock().await.records()[1].id.clone();
        let transport = Arc::new(ScriptedTransport::default());
        transport.reject.lock().unwrap().push(rejected.clone());

        let report = coordinator(Box::new(transport), true)
            .sync(&store)
            .await
            .unwrap();

        assert_eq!(report.synced, 2);
        assert_eq!(report.pending, 1);
        assert!(!store.lock().await.get(&rejected).unwrap().synced);
    }

    #[tokio::test]
    async fn test_batches_respect_batch_size() {
        let store = store_with(5).await;
        let transport = Arc::new(ScriptedTransport::default());
        let coordinator = SyncCoordinator::new(
            Box::new(transport.clone()),
            NetworkMonitor::default(),
            SyncSettings {
                batch_size: 2,
                ..SyncSettings::default()
            },
        );

        let report = coordinator.sync(&store).await.unwrap();
        assert_eq!(report.synced, 5);
        assert_eq!(transport.pushes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_synced_records_are_not_pushed_again() {
        let store = store_with(2).await;
        let transport = Arc::new(ScriptedTransport::default());
        let coordinator = coordinator(Box::new(transport.clone()), true);
        coordinator.sync(&store).await.unwrap();

        let edited = store.lock().await.records()[0].id.clone();
        store
            .lock()
            .await
            .update(&edited, &SightingPatch::new().notes("seen again"))
            .await
            .unwrap();
        transport.seen.lock().unwrap().clear();

        coordinator.sync(&store).await.unwrap();
        assert_eq!(*transport.seen.lock().unwrap(), vec![edited]);
    }

    #[tokio::test]
    async fn test_push_timeout_counts_as_failure() {
        let store = store_with(1).await;
        let coordinator = SyncCoordinator::new(
            Box::new(HangingTransport),
            NetworkMonitor::default(),
            SyncSettings {
                batch_size: 10,
                timeout: Duration::from_millis(20),
            },
        );

        let report = coordinator.sync(&store).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(store.lock().await.pending_sync_count(), 1);
    }

    #[tokio::test]
    async fn test_store_is_free_while_push_in_flight() {
        let store = store_with(2).await;
        let (edited, removed) = {
            let guard = store.lock().await;
            (guard.records()[0].id.clone(), guard.records()[1].id.clone())
        };
        let transport = Arc::new(GatedTransport::default());
        let coordinator = coordinator(Box::new(transport.clone()), true);

        let (report, ()) = tokio::join!(coordinator.sync(&store), async {
            transport.entered.notified().await;
            let mut guard = tokio::time::timeout(Duration::from_secs(1), store.lock())
                .await
                .expect("store locked during push");
            guard
                .update(&edited, &SightingPatch::new().notes("closer look"))
                .await
                .unwrap();
            guard.remove(&removed).await.unwrap();
            drop(guard);
            transport.release.notify_one();
        });

        let report = report.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.synced, 0);
        assert_eq!(report.pending, 1);

        let guard = store.lock().await;
        assert_eq!(guard.len(), 1);
        assert!(!guard.get(&edited).unwrap().synced);
    }
}
