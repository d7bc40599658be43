//! # Persistence Module
//!
//! The device state that has to survive a restart: network credentials, the
//! device token and base URL, identity fields and the first-run flag. It is
//! one camelCase JSON object, read once at startup and written back whenever
//! the orchestrator changes a field.
//!
//! Storage itself sits behind [`config_store::ConfigStore`] so the controller
//! can run against a file on a host or an in-memory store in tests.

pub mod config_store;

use serde::{Deserialize, Serialize};

/// Length of a generated device id.
pub const DEVICE_ID_LEN: usize = 8;

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedConfig {
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub device_token: String,
    pub device_base_url: String,
    pub friend_id: String,
    pub device_id: String,
    pub name: String,
    pub group_id: String,
    /// Set after the first successful pairing.
    pub setup_done: bool,
}

impl PersistedConfig {
    pub fn has_wifi_credentials(&self) -> bool {
        !self.wifi_ssid.trim().is_empty()
    }

    pub fn has_identity(&self) -> bool {
        !self.friend_id.trim().is_empty()
    }

    /// Generates a device id when none is stored. Returns whether it changed.
    pub fn ensure_device_id(&mut self) -> bool {
        if !self.device_id.trim().is_empty() {
            return false;
        }
        self.device_id = generate_device_id();
        true
    }

    pub fn optional(value: &str) -> Option<String> {
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

/// Short upper-case hex id.
pub fn generate_device_id() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .to_uppercase()
        .chars()
        .take(DEVICE_ID_LEN)
        .collect()
}
