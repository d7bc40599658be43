//! Topic handlers registered with the router.
//!
//! Handlers run inside `MessageRouter::tick` and must not block, so they only
//! validate the payload and queue a [`DeviceCommand`]; the orchestrator runs
//! the command against the device on the same tick.

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::device::ColorAssignment;
use crate::mqtt::TopicHandler;

pub const COLOR_TOPIC: &str = "color";
pub const IDENTIFY_TOPIC: &str = "identify";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    ApplyColors(ColorAssignment),
    Identify,
}

/// Per-panel colors plus the friend color for triangles.
pub struct ColorPaletteHandler {
    commands: UnboundedSender<DeviceCommand>,
}

impl ColorPaletteHandler {
    pub fn new(commands: UnboundedSender<DeviceCommand>) -> Self {
        ColorPaletteHandler { commands }
    }
}

impl TopicHandler for ColorPaletteHandler {
    fn topic_suffix(&self) -> &str {
        COLOR_TOPIC
    }

    fn handle(&mut self, topic: &str, payload: &Value) {
        match ColorAssignment::from_json(payload) {
            Ok(assignment) => {
                debug!("Color command on {}", topic);
                if self.commands.send(DeviceCommand::ApplyColors(assignment)).is_err() {
                    warn!("Command queue closed, dropping color command");
                }
            }
            Err(e) => warn!("Ignoring color command on {}: {}", topic, e),
        }
    }
}

/// Flashes the panels so a user can find the device.
pub struct IdentifyHandler {
    commands: UnboundedSender<DeviceCommand>,
}

impl IdentifyHandler {
    pub fn new(commands: UnboundedSender<DeviceCommand>) -> Self {
        IdentifyHandler { commands }
    }
}

impl TopicHandler for IdentifyHandler {
    fn topic_suffix(&self) -> &str {
        IDENTIFY_TOPIC
    }

    fn handle(&mut self, _topic: &str, _payload: &Value) {
        if self.commands.send(DeviceCommand::Identify).is_err() {
            warn!("Command queue closed, dropping identify command");
        }
    }
}

/// Handlers in registration order.
pub fn default_handlers(commands: &UnboundedSender<DeviceCommand>) -> Vec<Box<dyn TopicHandler>> {
    vec![
        Box::new(ColorPaletteHandler::new(commands.clone())),
        Box::new(IdentifyHandler::new(commands.clone())),
    ]
}
