//! Broker transport seam.
//!
//! The router talks to the broker only through [`BrokerTransport`]. The
//! production implementation wraps rumqttc's `AsyncClient` and drives its
//! event loop on a background task; inbound publishes are forwarded over a
//! channel so the router can drain them without blocking.

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::MqttConfig;
use super::error::MqttError;
use super::message_manager::InboundMessage;

#[async_trait]
pub trait BrokerTransport: Send {
    /// Opens a fresh session, replacing any previous one.
    async fn connect(&mut self, client_id: &str) -> Result<(), MqttError>;

    fn is_connected(&self) -> bool;

    async fn subscribe(&mut self, topic: &str) -> Result<(), MqttError>;

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError>;

    /// Next buffered inbound message, if any. Never waits.
    fn try_recv(&mut self) -> Option<InboundMessage>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum LinkState {
    Connecting,
    Up,
    Down(String),
}

struct Session {
    client: AsyncClient,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
    state: watch::Receiver<LinkState>,
    task: JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct RumqttTransport {
    config: MqttConfig,
    session: Option<Session>,
}

impl RumqttTransport {
    pub fn new(config: MqttConfig) -> Self {
        RumqttTransport {
            config,
            session: None,
        }
    }

    fn session(&self) -> Result<&Session, MqttError> {
        self.session.as_ref().ok_or(MqttError::NotConnected)
    }
}

#[async_trait]
impl BrokerTransport for RumqttTransport {
    async fn connect(&mut self, client_id: &str) -> Result<(), MqttError> {
        self.session = None;

        let mut options = MqttOptions::new(client_id, &self.config.host, self.config.port);
        options
            .set_keep_alive(self.config.keep_alive())
            .set_clean_session(true);

        let (client, event_loop) = AsyncClient::new(options, 64);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state_tx, mut state_rx) = watch::channel(LinkState::Connecting);
        let task = tokio::spawn(drive_event_loop(event_loop, inbound_tx, state_tx));

        let session = Session {
            client,
            inbound: inbound_rx,
            state: state_rx.clone(),
            task,
        };

        let established = tokio::time::timeout(self.config.connect_timeout(), async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err("event loop ended".to_string());
                }
                let current = state_rx.borrow().clone();
                match current {
                    LinkState::Up => return Ok(()),
                    LinkState::Down(reason) => return Err(reason),
                    LinkState::Connecting => {}
                }
            }
        })
        .await;

        match established {
            Ok(Ok(())) => {
                info!(
                    "Connected to broker {}:{} as {}",
                    self.config.host, self.config.port, client_id
                );
                self.session = Some(session);
                Ok(())
            }
            Ok(Err(reason)) => Err(MqttError::Connection(reason)),
            Err(_) => Err(MqttError::Connection(format!(
                "no acknowledgement within {:?}",
                self.config.connect_timeout()
            ))),
        }
    }

    fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| *session.state.borrow() == LinkState::Up)
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        self.session()?
            .client
            .subscribe(topic, QoS::AtMostOnce)
            .await?;
        debug!("Subscribed to {}", topic);
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        self.session()?
            .client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<InboundMessage> {
        self.session.as_mut()?.inbound.try_recv().ok()
    }
}

async fn drive_event_loop(
    mut event_loop: EventLoop,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    state: watch::Sender<LinkState>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    state.send_replace(LinkState::Up);
                } else {
                    state.send_replace(LinkState::Down(format!("refused: {:?}", ack.code)));
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                if inbound.send(message).is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker closed the session");
                state.send_replace(LinkState::Down("disconnected by broker".to_string()));
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Broker event loop stopped: {}", e);
                state.send_replace(LinkState::Down(e.to_string()));
                break;
            }
        }
    }
}
