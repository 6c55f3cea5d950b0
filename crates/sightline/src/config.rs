//! Configuration management for sightline.
//!
//! Configuration is layered with figment: built-in defaults, then a TOML
//! file, then `SIGHTLINE_` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::NetworkStatus;
use crate::sync::SyncSettings;
use crate::view::ContextSettings;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "sightline";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "database.db";

/// Environment variable prefix. Nested keys use `__`, e.g.
/// `SIGHTLINE_SYNC__BATCH_SIZE=10`.
const ENV_PREFIX: &str = "SIGHTLINE_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SIGHTLINE_`)
/// 2. TOML config file at `~/.config/sightline/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Sync configuration.
    pub sync: SyncConfig,
    /// Network configuration.
    pub network: NetworkConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/sightline/database.db`
    pub database_path: Option<PathBuf>,
    /// Upper bound on a single storage operation, in milliseconds.
    pub operation_timeout_ms: u64,
}

/// Sync-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Try to sync right after each new sighting when online.
    pub auto_sync_on_add: bool,
    /// Maximum sightings per push.
    pub batch_size: usize,
    /// Upper bound on a single push, in milliseconds.
    pub timeout_ms: u64,
}

/// Network-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Initial network status when nothing else reports one.
    pub assume_online: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            operation_timeout_ms: 5_000,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync_on_add: true,
            batch_size: 50,
            timeout_ms: 30_000,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            assume_online: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        let config: Config = Self::figment(&config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.operation_timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "storage.operation_timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.sync.batch_size == 0 {
            return Err(Error::ConfigValidation {
                message: "sync.batch_size must be greater than 0".to_string(),
            });
        }

        if self.sync.timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "sync.timeout_ms must be greater than 0".to_string(),
            });
        }

        if let Some(path) = &self.storage.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::ConfigValidation {
                    message: "storage.database_path cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the storage operation timeout as a Duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.operation_timeout_ms)
    }

    /// Coordinator tuning derived from the `sync` section.
    #[must_use]
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            batch_size: self.sync.batch_size,
            timeout: Duration::from_millis(self.sync.timeout_ms),
        }
    }

    /// View adapter settings derived from this configuration.
    #[must_use]
    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            auto_sync_on_add: self.sync.auto_sync_on_add,
            operation_timeout: self.operation_timeout(),
            sync: self.sync_settings(),
        }
    }

    /// Network status to start from.
    #[must_use]
    pub fn initial_network_status(&self) -> NetworkStatus {
        NetworkStatus::from(self.network.assume_online)
    }
}
