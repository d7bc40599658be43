//! Error definitions for the broker side of the controller

use thiserror::Error;

/// Failures raised by the router or the broker transport.
#[derive(Debug, Error)]
pub enum MqttError {
    /// The serialized payload does not fit the publish buffer.
    #[error("payload of {size} bytes exceeds the {limit} byte publish buffer")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A topic would exceed the topic length bound.
    #[error("topic of {size} bytes exceeds the {limit} byte limit")]
    TopicTooLong { size: usize, limit: usize },

    #[error("payload could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Connecting to the broker failed or timed out.
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// An operation needed a live session and there was none.
    #[error("not connected to broker")]
    NotConnected,
}
