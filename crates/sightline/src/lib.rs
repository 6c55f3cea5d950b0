//! `sightline` - A local-first field sighting log
//!
//! This library records geotagged wildlife sightings to a local `SQLite`
//! database, tracks which ones still need to reach a remote authority, and
//! syncs them when the network allows. A bundled reference library of
//! Brazilian fauna and flora works fully offline.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod library;
pub mod logging;
pub mod network;
pub mod sighting;
pub mod storage;
pub mod store;
pub mod sync;
pub mod transfer;
pub mod view;

pub use config::Config;
pub use error::{Error, Result};
pub use library::Library;
pub use logging::init_logging;
pub use network::{NetworkMonitor, NetworkStatus};
pub use sighting::{
    NewSighting, Position, SightingId, SightingPatch, SightingRecord, SightingSource,
};
pub use storage::{SightingBackend, SqliteBackend, Storage, StorageStats};
pub use store::SightingStore;
pub use sync::{LocalAckTransport, SyncCoordinator, SyncReport, SyncTransport};
pub use view::{ContextSettings, SightingsContext, SightingsSnapshot};
