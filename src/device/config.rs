use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[device]` section of the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// mDNS service type the device announces.
    pub service_type: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Switch the panels on and off once the broker is up.
    pub greeting_blink: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            service_type: "_nanoleafapi._tcp.local.".to_string(),
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
            greeting_blink: true,
        }
    }
}

impl DeviceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
