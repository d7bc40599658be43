//! # Broker Messaging
//!
//! Keeps one long-lived MQTT session open for the controller, routes inbound
//! messages to the handler registered for their topic and publishes device
//! status.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - `[broker]` settings and defaults
//! ├── error.rs            - MqttError
//! ├── message_manager.rs  - InboundMessage, TopicHandler, handler registry
//! ├── router.rs           - MessageRouter: publish, tick, reconnect loop
//! ├── topic.rs            - topic building and pattern matching
//! └── transport.rs        - BrokerTransport trait and the rumqttc transport
//! ```
//!
//! ## Topic Layout
//!
//! Handlers register a suffix only. The router prefixes it with the device
//! namespace, so a `color` handler for friend `f1` on device `d1` listens on
//! `GeoGlow/f1/d1/color`. Status goes to the shared
//! `GeoGlow/Friend-Service/ping` topic.
//!
//! ## Dispatch Rules
//!
//! - Payloads are parsed as JSON before any handler sees them; malformed
//!   payloads are logged and dropped.
//! - The first registered handler whose pattern matches receives the message.
//!   Later matches are not consulted.
//! - Messages nobody matches are logged and dropped.
//!
//! ## Connection Lifecycle
//!
//! `tick()` checks liveness on every call. A dropped session triggers
//! `reconnect()`, which retries with a fixed delay until the broker accepts
//! the client and then subscribes every registered handler again before
//! returning. Publishing while disconnected is a logged no-op.

pub mod config;
pub mod error;
pub mod message_manager;
pub mod router;
pub mod topic;
pub mod transport;

pub use config::MqttConfig;
pub use error::MqttError;
pub use message_manager::{InboundMessage, TopicHandler};
pub use router::{MessageRouter, PublishOutcome, RouterStatus};
pub use transport::{BrokerTransport, RumqttTransport};
