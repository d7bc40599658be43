//! Connectivity orchestration
//!
//! Sequences startup (network link, device discovery, pairing, event stream,
//! broker) and then drives the steady loop. Everything runs on the caller's
//! task: the orchestrator is never spawned, and the only waits are the
//! bootstrap backoffs and the steady tick interval.

pub mod backoff;
pub mod bootstrap;
pub mod config;
pub mod discovery;
pub mod steady;

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::commands::DeviceCommand;
use crate::context::Context;
use steady::InteractionTimer;

/// Coarse connection phase, mirrored on the status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    WifiConnecting,
    DiscoveringDevice,
    Authenticating,
    BrokerConnecting,
    Steady,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::WifiConnecting => "Connecting to WiFi",
            ConnectionState::DiscoveringDevice => "Searching for panels",
            ConnectionState::Authenticating => "Pairing with panels",
            ConnectionState::BrokerConnecting => "Connecting to broker",
            ConnectionState::Steady => "Connected",
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No safe continuation exists; the process must be restarted.
    #[error("restart required: {0}")]
    RestartRequired(String),
}

/// How device state reaches the broker and backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Layout events trigger full status; the interval sends heartbeats.
    EventDriven,
    /// No event stream: full status every interval.
    Periodic,
}

/// Raised by DeviceClient callbacks, consumed by the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSignal {
    LayoutChanged,
    ColorsApplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The device stopped answering; pairing has to run again.
    DeviceLost,
}

pub struct Orchestrator {
    ctx: Context,
    command_tx: UnboundedSender<DeviceCommand>,
    commands: UnboundedReceiver<DeviceCommand>,
    signals: UnboundedReceiver<DeviceSignal>,
    mode: PublishMode,
    timer: InteractionTimer,
    last_publish: Option<Instant>,
}

impl Orchestrator {
    pub fn new(mut ctx: Context) -> Self {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (signal_tx, signals) = mpsc::unbounded_channel();

        let layout_tx = signal_tx.clone();
        ctx.device.on_layout_change(Box::new(move || {
            let _ = layout_tx.send(DeviceSignal::LayoutChanged);
        }));
        ctx.device.on_colors_applied(Box::new(move || {
            let _ = signal_tx.send(DeviceSignal::ColorsApplied);
        }));

        let timer = InteractionTimer::new(ctx.settings.timing.interaction_timeout());
        Orchestrator {
            ctx,
            command_tx,
            commands,
            signals,
            mode: PublishMode::EventDriven,
            timer,
            last_publish: None,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    /// Full startup sequence. Blocks until the broker is up.
    pub async fn bootstrap(mut self) -> Result<Self, OrchestratorError> {
        let booted = bootstrap::run(self.ctx, self.command_tx.clone()).await?;
        self.ctx = booted.ctx;
        self.enter_steady(booted.mode);
        Ok(self)
    }

    /// Pairing, event registration and broker check after a device loss.
    pub async fn recover(mut self) -> Result<Self, OrchestratorError> {
        let booted = bootstrap::resume(self.ctx, self.command_tx.clone()).await?;
        self.ctx = booted.ctx;
        self.enter_steady(booted.mode);
        Ok(self)
    }

    fn enter_steady(&mut self, mode: PublishMode) {
        info!("Steady state reached, publish mode {:?}", mode);
        self.mode = mode;
        self.last_publish = None;
    }

    /// Bootstraps, then ticks until a condition with no safe continuation.
    pub async fn run(self) -> Result<(), OrchestratorError> {
        let mut orchestrator = self.bootstrap().await?;
        loop {
            let mut ticker = tokio::time::interval(orchestrator.ctx.settings.timing.tick_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if orchestrator.tick().await == TickOutcome::DeviceLost {
                    break;
                }
            }

            warn!("Device lost, pairing again");
            orchestrator = orchestrator.recover().await?;
        }
    }
}
