use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::PersistedConfig;

const APP_DIR: &str = "tile-controller";
const STATE_FILE: &str = "device_state.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Load/save collaborator for [`PersistedConfig`].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Stored configuration, or defaults when nothing has been saved yet.
    async fn load(&self) -> Result<PersistedConfig, StoreError>;

    async fn save(&self, config: &PersistedConfig) -> Result<(), StoreError>;

    /// Erases the stored configuration.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// JSON file on local storage.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    /// `<config_dir>/tile-controller/device_state.json`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path.push(STATE_FILE);
        path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, action: &'static str, source: std::io::Error) -> StoreError {
        StoreError::Io {
            action,
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn load(&self) -> Result<PersistedConfig, StoreError> {
        let exists = tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| self.io_error("check", e))?;
        if !exists {
            warn!(
                "No saved configuration at {}, starting fresh",
                self.path.display()
            );
            return Ok(PersistedConfig::default());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error("read", e))?;
        let config = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.display().to_string(),
            source,
        })?;
        debug!("Loaded configuration from {}", self.path.display());
        Ok(config)
    }

    async fn save(&self, config: &PersistedConfig) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error("create directory for", e))?;
        }

        let content = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| self.io_error("write", e))?;
        debug!("Saved configuration to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Erased {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error("remove", e)),
        }
    }
}

/// Store kept in memory; clones share the same slot.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<PersistedConfig>>>,
}

impl MemoryStore {
    pub fn with(config: PersistedConfig) -> Self {
        MemoryStore {
            slot: Arc::new(Mutex::new(Some(config))),
        }
    }

    /// Last saved configuration.
    pub fn snapshot(&self) -> Option<PersistedConfig> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self) -> Result<PersistedConfig, StoreError> {
        Ok(self.snapshot().unwrap_or_default())
    }

    async fn save(&self, config: &PersistedConfig) -> Result<(), StoreError> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(config.clone());
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
        Ok(())
    }
}
