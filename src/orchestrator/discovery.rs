//! Locating the device on the LAN.

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Service discovery collaborator.
#[async_trait]
pub trait ServiceBrowser: Send + Sync {
    /// One query for `service_type`, listening for at most `window`. Returns
    /// the device base URL, `http://<ip>:<port>`.
    async fn browse(&self, service_type: &str, window: Duration) -> Option<String>;
}

pub struct MdnsBrowser {
    daemon: ServiceDaemon,
}

impl MdnsBrowser {
    pub fn new() -> Result<Self, mdns_sd::Error> {
        Ok(MdnsBrowser {
            daemon: ServiceDaemon::new()?,
        })
    }
}

/// Base URL for a resolved service, preferring IPv4.
pub fn base_url(addresses: &[IpAddr], port: u16) -> Option<String> {
    let ip = addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addresses.first())?;
    Some(match ip {
        IpAddr::V4(v4) => format!("http://{v4}:{port}"),
        IpAddr::V6(v6) => format!("http://[{v6}]:{port}"),
    })
}

fn resolved_url(info: &ServiceInfo) -> Option<String> {
    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    addresses.sort();
    base_url(&addresses, info.get_port())
}

#[async_trait]
impl ServiceBrowser for MdnsBrowser {
    async fn browse(&self, service_type: &str, window: Duration) -> Option<String> {
        let receiver = match self.daemon.browse(service_type) {
            Ok(receiver) => receiver,
            Err(e) => {
                warn!("mDNS browse for {} failed: {}", service_type, e);
                return None;
            }
        };

        let found = tokio::task::spawn_blocking(move || {
            let deadline = Instant::now() + window;
            loop {
                let remaining = deadline.checked_duration_since(Instant::now())?;
                match receiver.recv_timeout(remaining) {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        debug!("Resolved {}", info.get_fullname());
                        if let Some(url) = resolved_url(&info) {
                            return Some(url);
                        }
                    }
                    Ok(_) => {}
                    Err(_) => return None,
                }
            }
        })
        .await
        .ok()
        .flatten();

        if let Err(e) = self.daemon.stop_browse(service_type) {
            debug!("Stopping mDNS browse failed: {}", e);
        }
        if let Some(url) = &found {
            info!("Found device at {}", url);
        }
        found
    }
}

impl Drop for MdnsBrowser {
    fn drop(&mut self) {
        let _ = self.daemon.shutdown();
    }
}
