use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::backoff::BackoffPolicy;

/// `[timing]` section of the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Heartbeat or full status cadence.
    pub publish_interval_secs: u64,
    /// Panels switch off this long after the last color command.
    pub interaction_timeout_secs: u64,
    pub tick_interval_ms: u64,
    /// How long one discovery query listens for answers.
    pub discovery_window_ms: u64,
    pub greeting_blink_ms: u64,
    pub wifi: BackoffPolicy,
    pub discovery: BackoffPolicy,
    pub auth: BackoffPolicy,
    pub events: BackoffPolicy,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            publish_interval_secs: 30,
            interaction_timeout_secs: 360,
            tick_interval_ms: 50,
            discovery_window_ms: 3_000,
            greeting_blink_ms: 1_500,
            wifi: BackoffPolicy::fixed(500, 10),
            discovery: BackoffPolicy::exponential(1_000, 1.5, 10_000, 10),
            auth: BackoffPolicy::fixed(6_000, 5),
            events: BackoffPolicy::fixed(1_000, 5),
        }
    }
}

impl TimingConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    pub fn interaction_timeout(&self) -> Duration {
        Duration::from_secs(self.interaction_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    pub fn greeting_blink(&self) -> Duration {
        Duration::from_millis(self.greeting_blink_ms)
    }
}
