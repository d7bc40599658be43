use async_trait::async_trait;
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use tracing::{debug, warn};

/// Network association collaborator.
#[async_trait]
pub trait NetworkLink: Send + Sync {
    /// One association attempt with saved credentials.
    async fn associate(&self, ssid: &str, password: &str) -> bool;

    async fn is_up(&self) -> bool;
}

/// Link managed by the host OS. Association is left to the system; the link
/// counts as up when a non-loopback interface carries an address.
#[derive(Debug, Default)]
pub struct HostLink;

impl HostLink {
    fn has_routable_address() -> bool {
        let interfaces = match NetworkInterface::show() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!("Could not list network interfaces: {}", e);
                return false;
            }
        };

        interfaces.iter().any(|iface| {
            iface.addr.iter().any(|addr| {
                let usable = match addr {
                    Addr::V4(v4) => !v4.ip.is_loopback() && !v4.ip.is_unspecified(),
                    Addr::V6(v6) => !v6.ip.is_loopback() && !v6.ip.is_unspecified(),
                };
                if usable {
                    debug!("Interface {} is up", iface.name);
                }
                usable
            })
        })
    }
}

#[async_trait]
impl NetworkLink for HostLink {
    async fn associate(&self, ssid: &str, _password: &str) -> bool {
        debug!("Association with {} is handled by the host", ssid);
        self.is_up().await
    }

    async fn is_up(&self) -> bool {
        tokio::task::spawn_blocking(Self::has_routable_address)
            .await
            .unwrap_or(false)
    }
}
