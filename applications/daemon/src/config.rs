/// Daemon configuration
use crate::error::{DaemonError, Result};
use cadence_importer::copy::CopyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "cadence.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CadenceConfig {
    #[serde(default = "default_storage")]
    pub storage: StorageSettings,

    #[serde(default = "default_library")]
    pub library: LibrarySettings,

    #[serde(default = "default_access")]
    pub access: AccessSettings,

    #[serde(default = "default_index")]
    pub index: IndexSettings,

    #[serde(default = "default_copy")]
    pub copy: CopySettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Holds the versioned database, the locator store and the app-private library
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibrarySettings {
    /// Owner of registered sources
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessSettings {
    /// Age after which a locator resolves as stale and is renewed
    #[serde(default = "default_locator_ttl_secs")]
    pub locator_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexSettings {
    /// Path entries written per transaction during a sync
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CopySettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

impl CopySettings {
    pub fn to_copy_config(&self) -> CopyConfig {
        CopyConfig {
            interval: Duration::from_secs(self.interval_secs),
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_secs(self.backoff_base_secs),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
        }
    }
}

impl CadenceConfig {
    /// Load configuration from `path` (or `cadence.toml` when present) and the environment.
    ///
    /// Environment variables use the `CADENCE_` prefix and `__` between section and key,
    /// e.g. `CADENCE_STORAGE__DATA_DIR`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("CADENCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.library.user_id.trim().is_empty() {
            return Err(DaemonError::Config(
                "library.user_id must not be empty".to_string(),
            ));
        }

        if self.index.batch_size == 0 {
            return Err(DaemonError::Config(
                "index.batch_size must be at least 1".to_string(),
            ));
        }

        if self.copy.interval_secs == 0 {
            return Err(DaemonError::Config(
                "copy.interval_secs must be at least 1".to_string(),
            ));
        }

        if self.copy.max_attempts == 0 {
            return Err(DaemonError::Config(
                "copy.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.copy.backoff_base_secs > self.copy.backoff_max_secs {
            return Err(DaemonError::Config(format!(
                "copy.backoff_base_secs ({}) exceeds copy.backoff_max_secs ({})",
                self.copy.backoff_base_secs, self.copy.backoff_max_secs
            )));
        }

        Ok(())
    }

    pub fn locator_ttl(&self) -> Duration {
        Duration::from_secs(self.access.locator_ttl_secs)
    }

    /// App-private directory for copied audio and cover art
    pub fn library_dir(&self) -> PathBuf {
        self.storage.data_dir.join("library")
    }

    pub fn locator_store_path(&self) -> PathBuf {
        self.storage.data_dir.join("locators.json")
    }
}

// Default values
fn default_storage() -> StorageSettings {
    StorageSettings {
        data_dir: default_data_dir(),
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_library() -> LibrarySettings {
    LibrarySettings {
        user_id: default_user_id(),
    }
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_access() -> AccessSettings {
    AccessSettings {
        locator_ttl_secs: default_locator_ttl_secs(),
    }
}

fn default_locator_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_index() -> IndexSettings {
    IndexSettings {
        batch_size: default_batch_size(),
    }
}

fn default_batch_size() -> usize {
    500
}

fn default_copy() -> CopySettings {
    CopySettings {
        interval_secs: default_interval_secs(),
        max_attempts: default_max_attempts(),
        backoff_base_secs: default_backoff_base_secs(),
        backoff_max_secs: default_backoff_max_secs(),
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    8
}

fn default_backoff_base_secs() -> u64 {
    30
}

fn default_backoff_max_secs() -> u64 {
    60 * 60
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            storage: default_storage(),
            library: default_library(),
            access: default_access(),
            index: default_index(),
            copy: default_copy(),
        }
    }
}
