//! Application settings, read from a TOML file at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::BackendConfig;
use crate::device::DeviceConfig;
use crate::mqtt::MqttConfig;
use crate::orchestrator::config::TimingConfig;

const CONFIG_DIR: &str = "tile-controller";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
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
        source: toml::de::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: MqttConfig,
    pub backend: BackendConfig,
    pub device: DeviceConfig,
    pub timing: TimingConfig,
}

impl Settings {
    /// `<config_dir>/tile-controller/settings.toml`, or the working directory
    /// when the platform has no config dir.
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_DIR);
        path.push(SETTINGS_FILE);
        path
    }

    /// Writes the default settings if `path` does not exist yet.
    pub async fn ensure_default(path: &Path) -> Result<(), SettingsError> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        info!("Creating default settings at {}", path.display());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error("create", parent, source))?;
        }
        let content = toml::to_string_pretty(&Settings::default())?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| io_error("write", path, source))
    }

    pub async fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| io_error("read", path, source))?;
        let settings = Self::parse(&content).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

fn io_error(action: &'static str, path: &Path, source: std::io::Error) -> SettingsError {
    SettingsError::Io {
        action,
        path: path.display().to_string(),
        source,
    }
}
