//! Host-side collaborators the orchestrator drives but does not own the
//! logic of: the network link, interactive provisioning and the status
//! display.

pub mod display;
pub mod link;
pub mod provisioning;

pub use display::{LogDisplay, StatusDisplay};
pub use link::{HostLink, NetworkLink};
pub use provisioning::{Provisioned, Provisioner, TerminalProvisioner};
