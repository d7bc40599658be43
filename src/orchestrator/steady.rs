//! Steady-state tick. Never sleeps: every step either finishes immediately or
//! is a single bounded request.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{DeviceSignal, Orchestrator, PublishMode, TickOutcome};
use crate::backend::{HeartbeatOutcome, StatusReport};
use crate::commands::DeviceCommand;
use crate::mqtt::topic;
use crate::persistence::PersistedConfig;

/// Debounced power-off after the last colour command.
#[derive(Debug, Clone)]
pub struct InteractionTimer {
    timeout: Duration,
    started: Option<Instant>,
}

impl InteractionTimer {
    pub fn new(timeout: Duration) -> Self {
        InteractionTimer {
            timeout,
            started: None,
        }
    }

    /// (Re)starts the countdown.
    pub fn arm(&mut self, now: Instant) {
        self.started = Some(now);
    }

    /// True once per countdown, when the timeout has elapsed.
    pub fn expired(&mut self, now: Instant) -> bool {
        match self.started {
            Some(started) if now.duration_since(started) >= self.timeout => {
                self.started = None;
                true
            }
            _ => false,
        }
    }
}

impl Orchestrator {
    pub async fn tick(&mut self) -> TickOutcome {
        if let Some(router) = self.ctx.router.as_mut() {
            router.tick().await;
        }

        while let Ok(command) = self.commands.try_recv() {
            self.execute(command).await;
        }

        self.ctx.device.poll_events();
        while let Ok(signal) = self.signals.try_recv() {
            match signal {
                DeviceSignal::LayoutChanged => {
                    info!("Panel layout changed");
                    self.publish_status().await;
                }
                DeviceSignal::ColorsApplied => self.timer.arm(Instant::now()),
            }
        }

        if self.timer.expired(Instant::now()) {
            info!("No interaction for {:?}, switching panels off", self.timer.timeout);
            if let Err(e) = self.ctx.device.set_power(false).await {
                warn!("Power off failed: {}", e);
            }
        }

        let now = Instant::now();
        let due = self
            .last_publish
            .map_or(true, |last| now.duration_since(last) >= self.ctx.settings.timing.publish_interval());
        if due {
            self.last_publish = Some(now);
            match self.mode {
                PublishMode::Periodic => self.publish_status().await,
                PublishMode::EventDriven => {
                    if !self.heartbeat().await {
                        return TickOutcome::DeviceLost;
                    }
                }
            }

            if self.mode == PublishMode::EventDriven && !self.ctx.device.is_streaming() {
                warn!("Event stream closed, publishing full status every interval");
                self.mode = PublishMode::Periodic;
            }
        }

        if !self.ctx.device.is_authenticated() {
            return TickOutcome::DeviceLost;
        }

        self.ctx.flush().await;
        TickOutcome::Continue
    }

    async fn execute(&mut self, command: DeviceCommand) {
        let result = match &command {
            DeviceCommand::ApplyColors(assignment) => self.ctx.device.apply_colors(assignment).await,
            DeviceCommand::Identify => self.ctx.device.identify().await,
        };
        if let Err(e) = result {
            error!("Device command {:?} failed: {}", command, e);
        }
    }

    /// Liveness signal. False once the device no longer holds a session.
    async fn heartbeat(&mut self) -> bool {
        if !self.ctx.device.check_connected().await {
            if !self.ctx.device.is_authenticated() {
                warn!("Device health check failed");
                return false;
            }
            warn!("Device did not answer the health check, keeping session");
            return true;
        }
        let Some(identity) = self.ctx.identity() else {
            return true;
        };

        match self.ctx.backend.post_heartbeat(&identity).await {
            Ok(HeartbeatOutcome::Accepted) => debug!("Heartbeat accepted"),
            Ok(HeartbeatOutcome::NotRegistered) => {
                info!("Backend does not know this friend yet, sending full status");
                self.publish_status().await;
            }
            Ok(HeartbeatOutcome::ServerError) => error!("Heartbeat rejected by the backend (500)"),
            Ok(HeartbeatOutcome::Unexpected(status)) => {
                warn!("Heartbeat returned unknown status {}", status)
            }
            Err(e) => warn!("Heartbeat failed: {}", e),
        }
        true
    }

    /// Full status to the ping topic and the backend.
    async fn publish_status(&mut self) {
        let Some(identity) = self.ctx.identity() else {
            warn!("No identity, status not published");
            return;
        };
        if let Err(e) = self.ctx.device.list_panels().await {
            warn!("Could not refresh panels before status: {}", e);
        }

        let report = StatusReport::new(
            &identity,
            PersistedConfig::optional(&self.ctx.persisted.name),
            PersistedConfig::optional(&self.ctx.persisted.group_id),
            self.ctx.device.inventory().panels().to_vec(),
        );

        if let Some(router) = self.ctx.router.as_mut() {
            let status_topic = topic::status_topic(&router.config().app_prefix);
            if let Err(e) = router.publish(&status_topic, &report).await {
                error!("Status publish failed: {}", e);
            }
        }
        if let Err(e) = self.ctx.backend.patch_status(&report).await {
            warn!("Status update to backend failed: {}", e);
        }
    }
}
