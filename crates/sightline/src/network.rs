//! Online/offline signal for the sync coordinator.
//!
//! The monitor does not probe the network itself; the host (a platform
//! connectivity callback, the CLI's `--offline` flag, a test) pushes
//! transitions in and interested parties subscribe to them.

use tokio::sync::watch;
use tracing::info;

/// Connectivity as last reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// A remote authority may be reachable.
    Online,
    /// No connectivity.
    Offline,
}

impl NetworkStatus {
    /// Whether this status allows sync attempts.
    #[must_use]
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl From<bool> for NetworkStatus {
    fn from(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A cloneable handle to the current network status.
///
/// All clones share one signal.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: watch::Sender<NetworkStatus>,
}

impl NetworkMonitor {
    /// Create a monitor starting in the given state.
    #[must_use]
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    /// Whether the network is currently reported online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    /// Report a new status. Returns `true` if it differs from the previous one.
    ///
    /// Subscribers are only woken on an actual change.
    pub fn set_status(&self, status: NetworkStatus) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            info!(%status, "Network status changed");
        }
        changed
    }

    /// Shorthand for `set_status(online.into())`.
    pub fn set_online(&self, online: bool) -> bool {
        self.set_status(online.into())
    }

    /// Subscribe to status transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Online)
    }
}
