use async_trait::async_trait;
use dialoguer::{Input, Password};
use tracing::{info, warn};

use crate::persistence::PersistedConfig;

/// Values collected during interactive provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provisioned {
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub friend_id: String,
    pub name: String,
    pub group_id: String,
}

impl Provisioned {
    pub fn apply_to(self, config: &mut PersistedConfig) {
        config.wifi_ssid = self.wifi_ssid;
        config.wifi_password = self.wifi_password;
        config.friend_id = self.friend_id;
        config.name = self.name;
        config.group_id = self.group_id;
    }
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Collects credentials and identity. `None` means provisioning failed or
    /// timed out.
    async fn provision(&self, current: &PersistedConfig) -> Option<Provisioned>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalProvisioner;

fn prompt(label: &str, initial: &str) -> dialoguer::Result<String> {
    Input::<String>::new()
        .with_prompt(label)
        .with_initial_text(initial)
        .allow_empty(true)
        .interact_text()
}

fn prompt_all(current: PersistedConfig) -> dialoguer::Result<Provisioned> {
    let wifi_ssid = prompt("Wi-Fi SSID", &current.wifi_ssid)?;
    let wifi_password = Password::new()
        .with_prompt("Wi-Fi password")
        .allow_empty_password(true)
        .interact()?;
    let friend_id = prompt("Friend ID", &current.friend_id)?;
    let name = prompt("Name", &current.name)?;
    let group_id = prompt("Group ID", &current.group_id)?;

    Ok(Provisioned {
        wifi_ssid,
        wifi_password,
        friend_id: friend_id.trim().to_string(),
        name,
        group_id,
    })
}

#[async_trait]
impl Provisioner for TerminalProvisioner {
    async fn provision(&self, current: &PersistedConfig) -> Option<Provisioned> {
        info!("Starting interactive provisioning");
        let current = current.clone();
        let result = tokio::task::spawn_blocking(move || prompt_all(current))
            .await
            .ok()?;

        match result {
            Ok(provisioned) if !provisioned.friend_id.is_empty() => Some(provisioned),
            Ok(_) => {
                warn!("Provisioning finished without a friend id");
                None
            }
            Err(e) => {
                warn!("Provisioning prompt failed: {}", e);
                None
            }
        }
    }
}
