use reqwest::{header, Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::animation::{self, ColorAssignment, EffectCommand, Rgb};
use super::config::DeviceConfig;
use super::error::DeviceError;
use super::events::{EventStream, LAYOUT_EVENT_ID};
use super::panels::{PanelId, PanelInventory};

const API_PREFIX: &str = "/api/v1";

pub type Callback = Box<dyn FnMut() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    /// Authenticated with an open event stream.
    Streaming,
}

/// HTTP client for the lighting device's local API.
pub struct DeviceClient {
    http: reqwest::Client,
    request_timeout: Duration,
    base_url: Option<String>,
    token: String,
    inventory: PanelInventory,
    session: SessionState,
    events: Option<EventStream>,
    on_layout_change: Option<Callback>,
    on_colors_applied: Option<Callback>,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        // No client-wide timeout: it would also cut the event stream.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(DeviceClient {
            http,
            request_timeout: config.request_timeout(),
            base_url: None,
            token: String::new(),
            inventory: PanelInventory::default(),
            session: SessionState::Unauthenticated,
            events: None,
            on_layout_change: None,
            on_colors_applied: None,
        })
    }

    /// Accepts `scheme://host:port`; a trailing slash is dropped.
    pub fn set_base_url(&mut self, base_url: &str) -> Result<(), DeviceError> {
        let parsed = Url::parse(base_url).map_err(|e| DeviceError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.host_str().is_none() {
            return Err(DeviceError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "missing host".to_string(),
            });
        }

        let base_url = base_url.trim_end_matches('/').to_string();
        if self.base_url.as_deref() != Some(base_url.as_str()) {
            info!("Device base url set to {}", base_url);
            self.drop_session();
        }
        self.base_url = Some(base_url);
        Ok(())
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn session_state(&self) -> SessionState {
        self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session != SessionState::Unauthenticated
    }

    pub fn is_streaming(&self) -> bool {
        self.session == SessionState::Streaming
    }

    pub fn inventory(&self) -> &PanelInventory {
        &self.inventory
    }

    pub fn on_layout_change(&mut self, callback: Callback) {
        self.on_layout_change = Some(callback);
    }

    pub fn on_colors_applied(&mut self, callback: Callback) {
        self.on_colors_applied = Some(callback);
    }

    fn url(&self, endpoint: &str, authenticated: bool) -> Result<String, DeviceError> {
        let base = self.base_url.as_deref().ok_or(DeviceError::NoBaseUrl)?;
        if !authenticated {
            return Ok(format!("{base}{API_PREFIX}{endpoint}"));
        }
        if self.token.is_empty() {
            return Err(DeviceError::MissingToken {
                endpoint: endpoint.to_string(),
            });
        }
        Ok(format!("{base}{API_PREFIX}/{}{endpoint}", self.token))
    }

    fn request(
        &self,
        method: Method,
        endpoint: &str,
        authenticated: bool,
    ) -> Result<RequestBuilder, DeviceError> {
        let url = self.url(endpoint, authenticated)?;
        Ok(self.http.request(method, url))
    }

    async fn execute(
        &self,
        method: &Method,
        endpoint: &str,
        builder: RequestBuilder,
    ) -> Result<Response, DeviceError> {
        let response = builder
            .send()
            .await
            .map_err(|source| DeviceError::Transport {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Status {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
                status,
            });
        }
        Ok(response)
    }

    /// Sends one request and returns the parsed body, `Value::Null` when the
    /// device answers without one. Failures are logged with method and
    /// endpoint.
    pub async fn send_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
        authenticated: bool,
    ) -> Result<Value, DeviceError> {
        let result = self
            .send_request_inner(&method, endpoint, body, authenticated)
            .await;
        if let Err(e) = &result {
            warn!("Device request {} {} failed: {}", method, endpoint, e);
        }
        result
    }

    async fn send_request_inner<B: Serialize + ?Sized>(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<&B>,
        authenticated: bool,
    ) -> Result<Value, DeviceError> {
        let mut builder = self
            .request(method.clone(), endpoint, authenticated)?
            .timeout(self.request_timeout)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        debug!("{} {}", method, endpoint);

        let response = self.execute(method, endpoint, builder).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| DeviceError::Transport {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
                source,
            })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| DeviceError::Body {
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    /// Authenticated call. A failure resets the session only when a follow-up
    /// identity probe fails for a reason other than a timeout or a 5xx.
    async fn authenticated<B: Serialize + ?Sized>(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<Value, DeviceError> {
        let result = self.send_request(method, endpoint, body, true).await;
        if let Err(e) = &result {
            let probe_worthwhile = !matches!(
                e,
                DeviceError::NoBaseUrl | DeviceError::MissingToken { .. }
            );
            if self.is_authenticated() && probe_worthwhile {
                match self.probe().await {
                    Ok(()) => {}
                    Err(probe_err) if probe_err.is_transient() => {
                        debug!("Identity probe inconclusive, keeping session: {}", probe_err);
                    }
                    Err(probe_err) => {
                        warn!("Device no longer accepts the token: {}", probe_err);
                        self.drop_session();
                    }
                }
            }
        }
        result
    }

    async fn probe(&self) -> Result<(), DeviceError> {
        let body = self
            .send_request::<Value>(Method::GET, "/", None, true)
            .await?;
        if body.get("serialNo").is_some_and(|serial| !serial.is_null()) {
            Ok(())
        } else {
            Err(DeviceError::Body {
                method: Method::GET.to_string(),
                endpoint: "/".to_string(),
                reason: "no serialNo".to_string(),
            })
        }
    }

    fn drop_session(&mut self) {
        self.events = None;
        self.session = SessionState::Unauthenticated;
    }

    /// Identity probe with the current token. Returns `false` on any failure,
    /// but only a non-transient one resets the session.
    pub async fn check_connected(&mut self) -> bool {
        match self.probe().await {
            Ok(()) => {
                if self.session == SessionState::Unauthenticated {
                    info!("Device accepted the token");
                    self.session = SessionState::Authenticated;
                }
                true
            }
            Err(e) if e.is_transient() && self.is_authenticated() => {
                debug!("Device unreachable for now: {}", e);
                false
            }
            Err(e) => {
                debug!("Identity probe failed: {}", e);
                self.drop_session();
                false
            }
        }
    }

    /// Asks the device for a new token. Returns `None` unless the pairing
    /// button was held on the device beforehand.
    pub async fn generate_token(&self) -> Option<String> {
        let body = self
            .send_request::<Value>(Method::POST, "/new", None, false)
            .await
            .ok()?;
        match body.get("auth_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() && token != "null" => Some(token.to_string()),
            _ => {
                debug!("Pairing response carried no token");
                None
            }
        }
    }

    /// Refreshes the panel inventory and returns the non-triangle panels.
    pub async fn list_panels(&mut self) -> Result<Vec<PanelId>, DeviceError> {
        let body = self
            .authenticated::<Value>(Method::GET, "/panelLayout/layout", None)
            .await?;
        let inventory = PanelInventory::from_layout(body).map_err(|e| DeviceError::Body {
            method: Method::GET.to_string(),
            endpoint: "/panelLayout/layout".to_string(),
            reason: e.to_string(),
        })?;

        debug!(
            "Layout has {} panels and {} triangles",
            inventory.panels().len(),
            inventory.triangles().len()
        );
        self.inventory = inventory;
        Ok(self.inventory.panels().to_vec())
    }

    pub async fn set_power(&mut self, on: bool) -> Result<(), DeviceError> {
        let body = json!({ "on": { "value": on } });
        self.authenticated(Method::PUT, "/state", Some(&body)).await?;
        Ok(())
    }

    /// Flashes the panels.
    pub async fn identify(&mut self) -> Result<(), DeviceError> {
        self.authenticated::<Value>(Method::PUT, "/identify", None)
            .await?;
        Ok(())
    }

    /// Opens the change-notification stream for `event_ids`.
    pub async fn register_event_stream(&mut self, event_ids: &[u32]) -> bool {
        let ids = event_ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let endpoint = format!("/events?id={ids}");

        let builder = match self.request(Method::GET, &endpoint, true) {
            Ok(builder) => builder.header(header::ACCEPT, "text/event-stream"),
            Err(e) => {
                warn!("Cannot register for events: {}", e);
                return false;
            }
        };

        match self.execute(&Method::GET, &endpoint, builder).await {
            Ok(response) => {
                info!("Listening for device events {}", ids);
                self.events = Some(EventStream::spawn(response));
                self.session = SessionState::Streaming;
                true
            }
            Err(e) => {
                warn!("Event registration GET {} failed: {}", endpoint, e);
                false
            }
        }
    }

    /// Handles pending stream lines without waiting. Returns the number of
    /// layout changes seen.
    pub fn poll_events(&mut self) -> usize {
        let Some(stream) = self.events.as_mut() else {
            return 0;
        };
        let drained = stream.drain();

        let layout_changes = drained
            .event_ids
            .iter()
            .filter(|id| **id == LAYOUT_EVENT_ID)
            .count();
        for _ in 0..layout_changes {
            info!("Device layout changed");
            if let Some(callback) = self.on_layout_change.as_mut() {
                callback();
            }
        }

        if drained.closed {
            warn!("Device event stream closed");
            self.events = None;
            if self.session == SessionState::Streaming {
                self.session = SessionState::Authenticated;
            }
        }
        layout_changes
    }

    /// Encodes `assignment` and plays it as a one-shot custom effect.
    pub async fn apply_colors(&mut self, assignment: &ColorAssignment) -> Result<(), DeviceError> {
        if assignment.is_empty() {
            return Err(DeviceError::EmptyCommand);
        }
        self.play(assignment).await?;
        if let Some(callback) = self.on_colors_applied.as_mut() {
            callback();
        }
        Ok(())
    }

    /// Holds every known panel, triangles included, at one color.
    pub async fn set_static_color(&mut self, rgb: Rgb) -> Result<(), DeviceError> {
        let assignment = ColorAssignment::uniform(&self.inventory, rgb);
        self.play(&assignment).await
    }

    async fn play(&mut self, assignment: &ColorAssignment) -> Result<(), DeviceError> {
        let command = EffectCommand::display(animation::encode(assignment, &self.inventory));
        debug!("animData: {}", command.anim_data());
        self.authenticated(Method::PUT, "/effects", Some(&command))
            .await?;
        Ok(())
    }
}
