//! Device identity and the runtime context owned by the orchestrator.
//!
//! Credentials, token, base URL and client handles all live in [`Context`],
//! which is built once in `main` and moved through the bootstrap stages into
//! the steady loop.

use crate::backend::BackendClient;
use crate::config::Settings;
use crate::device::DeviceClient;
use crate::mqtt::{BrokerTransport, MessageRouter};
use crate::orchestrator::discovery::ServiceBrowser;
use crate::orchestrator::ConnectionState;
use crate::persistence::{config_store::ConfigStore, PersistedConfig};
use crate::platform::{NetworkLink, Provisioner, StatusDisplay};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("friend id is empty")]
    MissingFriendId,
}

/// Namespaces every broker topic and every backend path.
///
/// A value of this type always carries a non-empty friend id, so holding one
/// is proof that identity has formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    friend_id: String,
    device_id: Option<String>,
}

impl DeviceIdentity {
    pub fn new(
        friend_id: impl Into<String>,
        device_id: Option<String>,
    ) -> Result<Self, IdentityError> {
        let friend_id = friend_id.into().trim().to_string();
        if friend_id.is_empty() {
            return Err(IdentityError::MissingFriendId);
        }
        let device_id = device_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        Ok(Self {
            friend_id,
            device_id,
        })
    }

    pub fn friend_id(&self) -> &str {
        &self.friend_id
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// `<prefix>-<friendId>[-<deviceId>]`
    pub fn client_id(&self, prefix: &str) -> String {
        match &self.device_id {
            Some(device_id) => format!("{}-{}-{}", prefix, self.friend_id, device_id),
            None => format!("{}-{}", prefix, self.friend_id),
        }
    }

    /// `<appPrefix>/<friendId>[/<deviceId>]`
    pub fn topic_namespace(&self, app_prefix: &str) -> String {
        match &self.device_id {
            Some(device_id) => format!("{}/{}/{}", app_prefix, self.friend_id, device_id),
            None => format!("{}/{}", app_prefix, self.friend_id),
        }
    }
}

/// Single owner of all mutable controller state.
pub struct Context {
    pub settings: Settings,
    pub persisted: PersistedConfig,
    pub store: Box<dyn ConfigStore>,
    pub link: Box<dyn NetworkLink>,
    pub provisioner: Box<dyn Provisioner>,
    pub browser: Box<dyn ServiceBrowser>,
    pub display: Box<dyn StatusDisplay>,
    pub device: DeviceClient,
    pub backend: BackendClient,
    /// Broker transport until the router takes it over.
    pub transport: Option<Box<dyn BrokerTransport>>,
    pub router: Option<MessageRouter>,
    state: ConnectionState,
    save_requested: bool,
}

/// Collaborators handed to [`Context::assemble`].
pub struct Collaborators {
    pub store: Box<dyn ConfigStore>,
    pub link: Box<dyn NetworkLink>,
    pub provisioner: Box<dyn Provisioner>,
    pub browser: Box<dyn ServiceBrowser>,
    pub display: Box<dyn StatusDisplay>,
    pub transport: Box<dyn BrokerTransport>,
}

impl Context {
    pub fn assemble(
        settings: Settings,
        persisted: PersistedConfig,
        collaborators: Collaborators,
        device: DeviceClient,
        backend: BackendClient,
    ) -> Self {
        Self {
            settings,
            persisted,
            store: collaborators.store,
            link: collaborators.link,
            provisioner: collaborators.provisioner,
            browser: collaborators.browser,
            display: collaborators.display,
            device,
            backend,
            transport: Some(collaborators.transport),
            router: None,
            state: ConnectionState::WifiConnecting,
            save_requested: false,
        }
    }

    /// Identity from the persisted configuration, if it has formed.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        DeviceIdentity::new(
            self.persisted.friend_id.clone(),
            Some(self.persisted.device_id.clone()),
        )
        .ok()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Switches the connection state and shows it on the display.
    pub fn enter(&mut self, state: ConnectionState) {
        if self.state != state {
            info!("Connection state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.display.show(state.label());
    }

    /// Save-configuration request from a collaborator.
    pub fn request_save(&mut self) {
        self.save_requested = true;
    }

    /// Writes the persisted configuration. Failures are logged; the in-memory
    /// copy stays authoritative.
    pub async fn persist(&mut self) -> bool {
        match self.store.save(&self.persisted).await {
            Ok(()) => {
                info!("Configuration saved");
                self.save_requested = false;
                true
            }
            Err(e) => {
                error!("Failed to save configuration: {}", e);
                false
            }
        }
    }

    /// Writes the configuration only if a save was requested.
    pub async fn flush(&mut self) {
        if self.save_requested {
            self.persist().await;
        }
    }
}
