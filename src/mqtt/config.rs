use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `[broker]` section of the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// First segment of every topic.
    pub app_prefix: String,
    /// First segment of the client id.
    pub client_prefix: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: "hivemq.dock.moxd.io".to_string(),
            port: 1883,
            app_prefix: "GeoGlow".to_string(),
            client_prefix: "GeoGlow".to_string(),
            keep_alive_secs: 15,
            connect_timeout_ms: 10_000,
            reconnect_delay_ms: 5_000,
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
