//! Startup pipeline as a statum state machine.
//!
//! ```text
//! LinkUp -> Discovery -> Authentication -> EventRegistration -> BrokerSetup
//! ```
//!
//! Every stage blocks with its own [`BackoffPolicy`](super::backoff::BackoffPolicy).
//! Stages that cannot continue return `RestartRequired`. Authentication and
//! the broker connection retry without bound. After a device loss the steady
//! loop re-enters at `Authentication` through [`resume`].

use statum::{machine, state};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use super::{ConnectionState, OrchestratorError, PublishMode};
use crate::commands::{self, DeviceCommand};
use crate::context::Context;
use crate::device::{Rgb, LAYOUT_EVENT_ID};
use crate::mqtt::MessageRouter;

#[state]
#[derive(Debug, Clone)]
pub enum BootstrapStage {
    LinkUp,
    Discovery,
    Authentication,
    EventRegistration,
    BrokerSetup,
}

#[machine]
pub struct Bootstrap<S: BootstrapStage> {
    ctx: Context,
    commands: UnboundedSender<DeviceCommand>,
    mode: PublishMode,
}

/// Result of a completed bootstrap.
pub struct Booted {
    pub ctx: Context,
    pub mode: PublishMode,
}

/// Runs every stage in order.
pub async fn run(
    ctx: Context,
    commands: UnboundedSender<DeviceCommand>,
) -> Result<Booted, OrchestratorError> {
    Bootstrap::begin(ctx, commands)
        .associate()
        .await?
        .locate()
        .await?
        .authenticate()
        .await
        .register_events()
        .await
        .connect_broker()
        .await
}

/// Re-enters the pipeline at authentication after the device stopped
/// answering in the steady loop.
pub async fn resume(
    ctx: Context,
    commands: UnboundedSender<DeviceCommand>,
) -> Result<Booted, OrchestratorError> {
    Bootstrap::reauthenticate(ctx, commands)
        .authenticate()
        .await
        .register_events()
        .await
        .connect_broker()
        .await
}

impl Bootstrap<LinkUp> {
    pub fn begin(ctx: Context, commands: UnboundedSender<DeviceCommand>) -> Self {
        Self::new(ctx, commands, PublishMode::EventDriven)
    }

    /// Brings the network link up, provisioning when it stays down or the
    /// device has no identity yet.
    pub async fn associate(mut self) -> Result<Bootstrap<Discovery>, OrchestratorError> {
        let ctx = &mut self.ctx;
        ctx.enter(ConnectionState::WifiConnecting);

        let mut linked = false;
        if ctx.persisted.has_wifi_credentials() {
            let mut attempts = ctx.settings.timing.wifi.attempts("network link");
            while attempts.next().await.is_some() {
                if ctx
                    .link
                    .associate(&ctx.persisted.wifi_ssid, &ctx.persisted.wifi_password)
                    .await
                {
                    linked = true;
                    break;
                }
            }
        } else {
            linked = ctx.link.is_up().await;
        }

        if !linked || !ctx.persisted.has_identity() {
            info!("Provisioning required (link up: {})", linked);
            ctx.display.show("Setup required");
            let provisioned = ctx
                .provisioner
                .provision(&ctx.persisted)
                .await
                .ok_or_else(|| OrchestratorError::RestartRequired("provisioning failed".into()))?;
            provisioned.apply_to(&mut ctx.persisted);
            ctx.request_save();

            let up = ctx
                .link
                .associate(&ctx.persisted.wifi_ssid, &ctx.persisted.wifi_password)
                .await
                || ctx.link.is_up().await;
            if !up {
                ctx.flush().await;
                return Err(OrchestratorError::RestartRequired(
                    "network link down after provisioning".into(),
                ));
            }
        }

        if ctx.persisted.ensure_device_id() {
            info!("Generated device id {}", ctx.persisted.device_id);
            ctx.request_save();
        }
        ctx.flush().await;

        Ok(self.transition())
    }
}

impl Bootstrap<Discovery> {
    /// Resolves the device base URL, from storage or by discovery.
    pub async fn locate(mut self) -> Result<Bootstrap<Authentication>, OrchestratorError> {
        let ctx = &mut self.ctx;
        let stored = ctx.persisted.device_base_url.clone();

        let known = !stored.is_empty()
            && match ctx.device.set_base_url(&stored) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Ignoring stored device url: {}", e);
                    false
                }
            };

        if !known && !discover(ctx).await {
            error!("Device not found on the network");
            return Err(OrchestratorError::RestartRequired(
                "device discovery exhausted".into(),
            ));
        }

        Ok(self.transition())
    }
}

/// One bounded discovery run. Persists the URL on success.
async fn discover(ctx: &mut Context) -> bool {
    ctx.enter(ConnectionState::DiscoveringDevice);
    let service_type = ctx.settings.device.service_type.clone();
    let window = ctx.settings.timing.discovery_window();

    let mut attempts = ctx.settings.timing.discovery.attempts("device discovery");
    while attempts.next().await.is_some() {
        let Some(url) = ctx.browser.browse(&service_type, window).await else {
            continue;
        };
        match ctx.device.set_base_url(&url) {
            Ok(()) => {
                info!("Device found at {}", url);
                ctx.persisted.device_base_url = url;
                ctx.request_save();
                ctx.flush().await;
                return true;
            }
            Err(e) => warn!("Discovery returned an unusable url: {}", e),
        }
    }
    false
}

impl Bootstrap<Authentication> {
    pub fn reauthenticate(ctx: Context, commands: UnboundedSender<DeviceCommand>) -> Self {
        Self::new(ctx, commands, PublishMode::EventDriven)
    }

    /// Pairs with the device. Exhausting the policy triggers a new discovery
    /// run and the cycle starts over.
    pub async fn authenticate(mut self) -> Bootstrap<EventRegistration> {
        let ctx = &mut self.ctx;
        ctx.device.set_token(ctx.persisted.device_token.clone());

        loop {
            ctx.enter(ConnectionState::Authenticating);
            let mut attempts = ctx.settings.timing.auth.attempts("device pairing");
            while attempts.next().await.is_some() {
                if try_authenticate(ctx).await {
                    refresh_inventory(ctx).await;
                    complete_first_run(ctx).await;
                    return self.transition();
                }
            }

            warn!("Pairing failed, searching for the device again");
            discover(ctx).await;
        }
    }
}

async fn try_authenticate(ctx: &mut Context) -> bool {
    if !ctx.device.token().is_empty() && ctx.device.check_connected().await {
        return true;
    }

    ctx.display.show("Hold the power button");
    let Some(token) = ctx.device.generate_token().await else {
        return false;
    };
    info!("Received a new device token");
    ctx.device.set_token(token.clone());
    ctx.persisted.device_token = token;
    ctx.request_save();
    ctx.flush().await;

    ctx.device.check_connected().await
}

async fn refresh_inventory(ctx: &mut Context) {
    if let Err(e) = ctx.device.list_panels().await {
        warn!("Could not read the panel layout: {}", e);
    }
}

async fn complete_first_run(ctx: &mut Context) {
    if ctx.persisted.setup_done {
        return;
    }
    info!("First pairing complete");
    ctx.persisted.setup_done = true;
    ctx.request_save();
    ctx.flush().await;

    if let Err(e) = ctx.device.set_static_color(Rgb::RED).await {
        warn!("Could not show the setup confirmation: {}", e);
    }
}

impl Bootstrap<EventRegistration> {
    /// Opens the layout event stream, or falls back to periodic status.
    pub async fn register_events(mut self) -> Bootstrap<BrokerSetup> {
        let ctx = &mut self.ctx;
        let mut attempts = ctx.settings.timing.events.attempts("event registration");

        let mut registered = false;
        while attempts.next().await.is_some() {
            if ctx.device.register_event_stream(&[LAYOUT_EVENT_ID]).await {
                registered = true;
                break;
            }
        }

        self.mode = if registered {
            PublishMode::EventDriven
        } else {
            warn!("Event registration failed, publishing full status every interval");
            PublishMode::Periodic
        };
        self.transition()
    }
}

impl Bootstrap<BrokerSetup> {
    /// Builds the router on first use and blocks until the broker accepts the
    /// session.
    pub async fn connect_broker(mut self) -> Result<Booted, OrchestratorError> {
        let ctx = &mut self.ctx;
        ctx.enter(ConnectionState::BrokerConnecting);

        let identity = ctx.identity().ok_or_else(|| {
            OrchestratorError::RestartRequired("device identity is incomplete".into())
        })?;

        let fresh = ctx.router.is_none();
        if fresh {
            let transport = ctx.transport.take().ok_or_else(|| {
                OrchestratorError::RestartRequired("broker transport missing".into())
            })?;
            let mut router = MessageRouter::new(transport, identity, ctx.settings.broker.clone());
            for handler in commands::default_handlers(&self.commands) {
                router.register_handler(handler).await.map_err(|e| {
                    OrchestratorError::RestartRequired(format!("handler topic rejected: {e}"))
                })?;
            }
            ctx.router = Some(router);
        }

        if let Some(router) = ctx.router.as_mut() {
            if !router.is_connected() {
                router.reconnect().await;
            }
        }

        if fresh && ctx.settings.device.greeting_blink {
            greet(ctx).await;
        }

        ctx.enter(ConnectionState::Steady);
        Ok(Booted {
            ctx: self.ctx,
            mode: self.mode,
        })
    }
}

async fn greet(ctx: &mut Context) {
    if let Err(e) = ctx.device.set_power(true).await {
        warn!("Greeting failed: {}", e);
        return;
    }
    tokio::time::sleep(ctx.settings.timing.greeting_blink()).await;
    if let Err(e) = ctx.device.set_power(false).await {
        warn!("Greeting failed: {}", e);
    }
}
