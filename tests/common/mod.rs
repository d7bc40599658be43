#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tile_controller::backend::BackendClient;
use tile_controller::config::Settings;
use tile_controller::context::{Collaborators, Context};
use tile_controller::device::DeviceClient;
use tile_controller::mqtt::{BrokerTransport, InboundMessage, MqttError};
use tile_controller::orchestrator::backoff::BackoffPolicy;
use tile_controller::orchestrator::discovery::ServiceBrowser;
use tile_controller::persistence::config_store::MemoryStore;
use tile_controller::persistence::PersistedConfig;
use tile_controller::platform::{NetworkLink, Provisioned, Provisioner, StatusDisplay};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "tok";

#[derive(Default)]
pub struct BrokerState {
    pub connected: bool,
    pub client_ids: Vec<String>,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    pub inbox: VecDeque<InboundMessage>,
}

/// In-memory broker; the test keeps a handle to inspect and disturb it.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl FakeBroker {
    pub fn transport(&self) -> Box<dyn BrokerTransport> {
        Box::new(self.clone())
    }

    pub fn drop_connection(&self) {
        self.state.lock().unwrap().connected = false;
    }

    pub fn inject(&self, topic: &str, payload: serde_json::Value) {
        let message = InboundMessage::new(topic, payload.to_string());
        self.state.lock().unwrap().inbox.push_back(message);
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().client_ids.len()
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().client_ids.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl BrokerTransport for FakeBroker {
    async fn connect(&mut self, client_id: &str) -> Result<(), MqttError> {
        let mut state = self.state.lock().unwrap();
        state.connected = true;
        state.client_ids.push(client_id.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(MqttError::NotConnected);
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(MqttError::NotConnected);
        }
        state.published.push((topic.to_string(), payload));
        Ok(())
    }

    fn try_recv(&mut self) -> Option<InboundMessage> {
        self.state.lock().unwrap().inbox.pop_front()
    }
}

/// Answers every browse with the same URL.
pub struct ScriptedBrowser {
    url: String,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedBrowser {
    pub fn new(url: impl Into<String>) -> Self {
        ScriptedBrowser {
            url: url.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ServiceBrowser for ScriptedBrowser {
    async fn browse(&self, _service_type: &str, _window: Duration) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(self.url.clone())
    }
}

pub struct AlwaysUpLink;

#[async_trait]
impl NetworkLink for AlwaysUpLink {
    async fn associate(&self, _ssid: &str, _password: &str) -> bool {
        true
    }

    async fn is_up(&self) -> bool {
        true
    }
}

pub struct NoProvisioner;

#[async_trait]
impl Provisioner for NoProvisioner {
    async fn provision(&self, _current: &PersistedConfig) -> Option<Provisioned> {
        None
    }
}

#[derive(Clone, Default)]
pub struct RecordingDisplay {
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl StatusDisplay for RecordingDisplay {
    fn show(&mut self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

/// Settings with millisecond backoffs, pointed at `server` for the backend.
pub fn fast_settings(server: &MockServer) -> Settings {
    let mut settings = Settings::default();
    settings.broker.reconnect_delay_ms = 5;
    settings.backend.url_prefix = format!("{}/friends/", server.uri());
    settings.device.greeting_blink = false;
    settings.timing.tick_interval_ms = 5;
    settings.timing.discovery_window_ms = 5;
    settings.timing.wifi = BackoffPolicy::fixed(1, 2);
    settings.timing.discovery = BackoffPolicy::fixed(1, 3);
    settings.timing.auth = BackoffPolicy::fixed(1, 2);
    settings.timing.events = BackoffPolicy::fixed(1, 2);
    settings
}

/// Identity formed, but never paired with a device.
pub fn fresh_device() -> PersistedConfig {
    PersistedConfig {
        friend_id: "f1".to_string(),
        device_id: "d1".to_string(),
        name: "Desk".to_string(),
        ..PersistedConfig::default()
    }
}

pub struct Harness {
    pub ctx: Context,
    pub broker: FakeBroker,
    pub store: MemoryStore,
    pub display: RecordingDisplay,
    pub discovery_calls: Arc<AtomicUsize>,
}

pub fn harness(server: &MockServer, persisted: PersistedConfig) -> Harness {
    let settings = fast_settings(server);
    let broker = FakeBroker::default();
    let store = MemoryStore::with(persisted.clone());
    let display = RecordingDisplay::default();
    let browser = ScriptedBrowser::new(server.uri());
    let discovery_calls = browser.calls.clone();

    let device = DeviceClient::new(&settings.device).unwrap();
    let backend = BackendClient::new(&settings.backend).unwrap();
    let collaborators = Collaborators {
        store: Box::new(store.clone()),
        link: Box::new(AlwaysUpLink),
        provisioner: Box::new(NoProvisioner),
        browser: Box::new(browser),
        display: Box::new(display.clone()),
        transport: broker.transport(),
    };

    Harness {
        ctx: Context::assemble(settings, persisted, collaborators, device, backend),
        broker,
        store,
        display,
        discovery_calls,
    }
}

/// A device that pairs on request and reports one square and one triangle.
/// `stream_status` answers the event registration.
pub async fn mount_device(server: &MockServer, stream_status: u16) {
    let events =
        ResponseTemplate::new(stream_status).insert_header("content-type", "text/event-stream");
    mount_device_with(server, TOKEN, events).await;
}

/// Same device, handing out `token` on pairing and answering the event
/// registration with `events`.
pub async fn mount_device_with(server: &MockServer, token: &str, events: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/{token}/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"serialNo": "S19124C8036"})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"auth_token": token})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/{token}/panelLayout/layout")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "numPanels": 3,
            "sideLength": 150,
            "positionData": [
                {"panelId": 0, "x": 0, "y": 0, "o": 0, "shapeType": 12},
                {"panelId": "p1", "x": 10, "y": 0, "o": 0, "shapeType": 7},
                {"panelId": "t1", "x": 20, "y": 0, "o": 60, "shapeType": 9}
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/{token}/events")))
        .respond_with(events)
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/api/v1/{token}/effects")))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/api/v1/{token}/state")))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

pub async fn mount_backend(server: &MockServer) {
    mount_backend_with(server, 204).await;
}

/// Backend whose heartbeat endpoint answers `heartbeat_status`.
pub async fn mount_backend_with(server: &MockServer, heartbeat_status: u16) {
    Mock::given(method("POST"))
        .and(path("/friends/f1/heartbeat"))
        .respond_with(ResponseTemplate::new(heartbeat_status))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/friends/f1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

pub async fn requests_to(server: &MockServer, verb: &str, url_path: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == url_path)
        .collect()
}
