use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::error::MqttError;
use super::message_manager::{HandlerRegistry, InboundMessage, TopicHandler};
use super::topic;
use super::transport::BrokerTransport;
use crate::context::DeviceIdentity;

/// Upper bound for one serialized publish payload.
pub const MAX_PAYLOAD_BYTES: usize = 512;

#[derive(Clone, Debug, Default)]
pub struct RouterStatus {
    pub connected: bool,
    pub sessions_opened: usize,
    pub messages_received: usize,
    pub messages_dispatched: usize,
    pub messages_dropped: usize,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    /// Nothing was sent; the router never queues.
    NotConnected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Unmatched,
    Malformed,
}

/// Owns the broker session and the handler registry.
pub struct MessageRouter {
    transport: Box<dyn BrokerTransport>,
    identity: DeviceIdentity,
    config: MqttConfig,
    registry: HandlerRegistry,
    /// Patterns whose subscribe failed while the session was up.
    pending: Vec<String>,
    status: RouterStatus,
}

/// Serializes `payload`, refusing anything over [`MAX_PAYLOAD_BYTES`].
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>, MqttError> {
    let bytes = serde_json::to_vec(payload)?;
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(MqttError::PayloadTooLarge {
            size: bytes.len(),
            limit: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(bytes)
}

impl MessageRouter {
    pub fn new(
        transport: Box<dyn BrokerTransport>,
        identity: DeviceIdentity,
        config: MqttConfig,
    ) -> Self {
        MessageRouter {
            transport,
            identity,
            config,
            registry: HandlerRegistry::default(),
            pending: Vec::new(),
            status: RouterStatus::default(),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    pub fn status(&self) -> RouterStatus {
        RouterStatus {
            connected: self.transport.is_connected(),
            ..self.status.clone()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.registry.patterns().map(str::to_string).collect()
    }

    /// Adds a handler; subscribes right away when a session is open.
    pub async fn register_handler(
        &mut self,
        handler: Box<dyn TopicHandler>,
    ) -> Result<(), MqttError> {
        let pattern =
            topic::handler_topic(&self.config.app_prefix, &self.identity, handler.topic_suffix())?;

        if self.transport.is_connected() {
            if let Err(e) = self.transport.subscribe(&pattern).await {
                warn!("Subscribe to {} failed, retrying next tick: {}", pattern, e);
                self.pending.push(pattern.clone());
            }
        }

        info!("Registered handler for {}", pattern);
        self.registry.push(pattern, handler);
        Ok(())
    }

    pub async fn publish<T: Serialize + ?Sized>(
        &mut self,
        topic: &str,
        payload: &T,
    ) -> Result<PublishOutcome, MqttError> {
        topic::check_len(topic)?;
        let bytes = encode_payload(payload).inspect_err(|e| {
            error!("Refusing publish to {}: {}", topic, e);
        })?;

        if !self.transport.is_connected() {
            warn!("Not connected, dropping publish to {}", topic);
            return Ok(PublishOutcome::NotConnected);
        }

        self.transport.publish(topic, bytes).await?;
        self.status.messages_sent += 1;
        self.status.last_activity = Some(Local::now());
        debug!("Published to {}", topic);
        Ok(PublishOutcome::Sent)
    }

    /// Reconnects if the session dropped, then dispatches everything buffered.
    /// Returns the number of messages handed to a handler.
    pub async fn tick(&mut self) -> usize {
        if !self.transport.is_connected() {
            warn!("Broker connection lost");
            self.reconnect().await;
        } else if !self.pending.is_empty() {
            self.retry_pending().await;
        }

        let mut handled = 0;
        while let Some(message) = self.transport.try_recv() {
            if self.dispatch(&message) == Dispatch::Handled {
                handled += 1;
            }
        }
        handled
    }

    /// Retries until a session is open and every handler is subscribed again.
    pub async fn reconnect(&mut self) {
        let client_id = self.identity.client_id(&self.config.client_prefix);
        let delay = self.config.reconnect_delay();
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            info!("Connecting to broker as {} (attempt {})", client_id, attempt);
            match self.transport.connect(&client_id).await {
                Ok(()) => {
                    self.status.sessions_opened += 1;
                    self.status.last_activity = Some(Local::now());
                    self.resubscribe().await;
                    return;
                }
                Err(e) => {
                    warn!("Broker connection failed: {}, retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn resubscribe(&mut self) {
        self.pending = self.subscriptions();
        self.retry_pending().await;
    }

    async fn retry_pending(&mut self) {
        for pattern in std::mem::take(&mut self.pending) {
            match self.transport.subscribe(&pattern).await {
                Ok(()) => debug!("Subscribed to {}", pattern),
                Err(e) => {
                    warn!("Subscribe to {} failed, retrying next tick: {}", pattern, e);
                    self.pending.push(pattern);
                }
            }
        }
    }

    pub fn dispatch(&mut self, message: &InboundMessage) -> Dispatch {
        self.status.messages_received += 1;
        self.status.last_activity = Some(message.timestamp());

        let payload = match message.parse_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    "Dropping malformed payload on {}: {} ({})",
                    message.topic(),
                    e,
                    message.preview()
                );
                self.status.messages_dropped += 1;
                return Dispatch::Malformed;
            }
        };

        match self.registry.dispatch(message.topic(), &payload) {
            Some(pattern) => {
                debug!("{} handled by {}", message, pattern);
                self.status.messages_dispatched += 1;
                Dispatch::Handled
            }
            None => {
                warn!("No handler for {}, dropping", message.topic());
                self.status.messages_dropped += 1;
                Dispatch::Unmatched
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Wire {
        connected: bool,
        refuse_connects: usize,
        refuse_subscribes: usize,
        connects: Vec<String>,
        subscriptions: Vec<String>,
        published: Vec<(String, Vec<u8>)>,
        inbound: VecDeque<InboundMessage>,
    }

    struct LoopbackTransport(Arc<Mutex<Wire>>);

    #[async_trait]
    impl BrokerTransport for LoopbackTransport {
        async fn connect(&mut self, client_id: &str) -> Result<(), MqttError> {
            let mut wire = self.0.lock().unwrap();
            wire.connects.push(client_id.to_string());
            if wire.refuse_connects > 0 {
                wire.refuse_connects -= 1;
                return Err(MqttError::Connection("refused".into()));
            }
            wire.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.0.lock().unwrap().connected
        }

        async fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
            let mut wire = self.0.lock().unwrap();
            if wire.refuse_subscribes > 0 {
                wire.refuse_subscribes -= 1;
                return Err(MqttError::Connection("suback timeout".into()));
            }
            wire.subscriptions.push(topic.to_string());
            Ok(())
        }

        async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
            self.0
                .lock()
                .unwrap()
                .published
                .push((topic.to_string(), payload));
            Ok(())
        }

        fn try_recv(&mut self) -> Option<InboundMessage> {
            self.0.lock().unwrap().inbound.pop_front()
        }
    }

    struct Counter {
        suffix: &'static str,
        seen: Arc<Mutex<Vec<Value>>>,
    }

    impl TopicHandler for Counter {
        fn topic_suffix(&self) -> &str {
            self.suffix
        }

        fn handle(&mut self, _topic: &str, payload: &Value) {
            self.seen.lock().unwrap().push(payload.clone());
        }
    }

    fn router(wire: &Arc<Mutex<Wire>>) -> MessageRouter {
        let config = MqttConfig {
            reconnect_delay_ms: 10,
            ..MqttConfig::default()
        };
        MessageRouter::new(
            Box::new(LoopbackTransport(Arc::clone(wire))),
            DeviceIdentity::new("f1", Some("d1".into())).unwrap(),
            config,
        )
    }

    #[tokio::test]
    async fn registering_while_connected_subscribes_immediately() {
        let wire = Arc::new(Mutex::new(Wire {
            connected: true,
            ..Wire::default()
        }));
        let mut router = router(&wire);
        let seen = Arc::new(Mutex::new(Vec::new()));

        router
            .register_handler(Box::new(Counter {
                suffix: "color",
                seen,
            }))
            .await
            .unwrap();

        assert_eq!(wire.lock().unwrap().subscriptions, vec!["GeoGlow/f1/d1/color"]);
    }

    #[tokio::test]
    async fn failed_subscribe_is_retried_on_the_next_tick() {
        let wire = Arc::new(Mutex::new(Wire {
            connected: true,
            refuse_subscribes: 1,
            ..Wire::default()
        }));
        let mut router = router(&wire);
        router
            .register_handler(Box::new(Counter {
                suffix: "color",
                seen: Arc::default(),
            }))
            .await
            .unwrap();
        assert!(wire.lock().unwrap().subscriptions.is_empty());

        router.tick().await;
        assert_eq!(wire.lock().unwrap().subscriptions, vec!["GeoGlow/f1/d1/color"]);
        assert!(wire.lock().unwrap().connects.is_empty());

        router.tick().await;
        assert_eq!(wire.lock().unwrap().subscriptions.len(), 1);
    }

    #[tokio::test]
    async fn registering_offline_defers_subscription() {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let mut router = router(&wire);
        router
            .register_handler(Box::new(Counter {
                suffix: "color",
                seen: Arc::default(),
            }))
            .await
            .unwrap();

        assert!(wire.lock().unwrap().subscriptions.is_empty());
        assert_eq!(router.subscriptions(), vec!["GeoGlow/f1/d1/color"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_retries_and_resubscribes() {
        let wire = Arc::new(Mutex::new(Wire {
            refuse_connects: 2,
            ..Wire::default()
        }));
        let mut router = router(&wire);
        router
            .register_handler(Box::new(Counter {
                suffix: "color",
                seen: Arc::default(),
            }))
            .await
            .unwrap();

        router.tick().await;
        assert_eq!(router.status().sessions_opened, 1);

        let wire = wire.lock().unwrap();
        assert_eq!(wire.connects.len(), 3);
        assert!(wire.connects.iter().all(|id| id == "GeoGlow-f1-d1"));
        assert_eq!(wire.subscriptions, vec!["GeoGlow/f1/d1/color"]);
    }

    #[tokio::test]
    async fn tick_dispatches_valid_and_drops_malformed() {
        let wire = Arc::new(Mutex::new(Wire {
            connected: true,
            ..Wire::default()
        }));
        let mut router = router(&wire);
        let seen = Arc::new(Mutex::new(Vec::new()));
        router
            .register_handler(Box::new(Counter {
                suffix: "color",
                seen: Arc::clone(&seen),
            }))
            .await
            .unwrap();

        {
            let mut wire = wire.lock().unwrap();
            wire.inbound
                .push_back(InboundMessage::new("GeoGlow/f1/d1/color", "{not json"));
            wire.inbound
                .push_back(InboundMessage::new("GeoGlow/f1/d1/other", "{}"));
            wire.inbound
                .push_back(InboundMessage::new("GeoGlow/f1/d1/color", r#"{"p1":[1,2,3]}"#));
        }

        assert_eq!(router.tick().await, 1);
        assert_eq!(*seen.lock().unwrap(), vec![json!({"p1": [1, 2, 3]})]);

        let status = router.status();
        assert_eq!(status.messages_received, 3);
        assert_eq!(status.messages_dispatched, 1);
        assert_eq!(status.messages_dropped, 2);
    }

    #[tokio::test]
    async fn publish_while_offline_is_not_queued() {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let mut router = router(&wire);

        let outcome = router.publish("GeoGlow/x", &json!({"a": 1})).await.unwrap();

        assert_eq!(outcome, PublishOutcome::NotConnected);
        assert!(wire.lock().unwrap().published.is_empty());
    }

    #[tokio::test]
    async fn oversized_payload_fails_loudly() {
        let wire = Arc::new(Mutex::new(Wire {
            connected: true,
            ..Wire::default()
        }));
        let mut router = router(&wire);
        let big = json!({ "blob": "x".repeat(MAX_PAYLOAD_BYTES) });

        let result = router.publish("GeoGlow/x", &big).await;

        assert!(matches!(result, Err(MqttError::PayloadTooLarge { .. })));
        assert!(wire.lock().unwrap().published.is_empty());
    }

    #[tokio::test]
    async fn publish_sends_serialized_json() {
        let wire = Arc::new(Mutex::new(Wire {
            connected: true,
            ..Wire::default()
        }));
        let mut router = router(&wire);

        router.publish("GeoGlow/x", &json!({"a": 1})).await.unwrap();
        assert_eq!(router.status().messages_sent, 1);

        let wire = wire.lock().unwrap();
        assert_eq!(wire.published[0].0, "GeoGlow/x");
        assert_eq!(wire.published[0].1, br#"{"a":1}"#.to_vec());
    }
}
