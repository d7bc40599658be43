use chrono::{DateTime, Local};
use serde_json::Value;
use std::fmt;

use super::topic;

/// A message delivered by the broker, stamped on arrival.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    topic: String,
    payload: Vec<u8>,
    timestamp: DateTime<Local>,
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} - {} ({} bytes)",
            self.timestamp.format("%H:%M:%S"),
            self.topic,
            self.payload.len()
        )
    }
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: Local::now(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn parse_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// First characters of the payload, for log lines.
    pub fn preview(&self) -> String {
        String::from_utf8_lossy(&self.payload).chars().take(64).collect()
    }
}

/// Receives parsed payloads for one topic suffix.
///
/// The router owns every handler it is given and prefixes the suffix with the
/// device namespace before subscribing.
pub trait TopicHandler: Send {
    fn topic_suffix(&self) -> &str;

    fn handle(&mut self, topic: &str, payload: &Value);
}

struct Registration {
    pattern: String,
    handler: Box<dyn TopicHandler>,
}

/// Ordered set of handlers. Registration order decides ties.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<Registration>,
}

impl HandlerRegistry {
    pub fn push(&mut self, pattern: String, handler: Box<dyn TopicHandler>) {
        self.entries.push(Registration { pattern, handler });
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.pattern.as_str())
    }

    /// Hands the payload to the first matching handler and returns its pattern.
    pub fn dispatch(&mut self, received: &str, payload: &Value) -> Option<&str> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| topic::matches(&entry.pattern, received))?;
        entry.handler.handle(received, payload);
        Some(entry.pattern.as_str())
    }
}
