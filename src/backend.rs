//! Backend HTTP service: liveness heartbeat and status registration.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::context::DeviceIdentity;
use crate::device::PanelId;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("PATCH {url} returned {status}")]
    Rejected { url: String, status: StatusCode },

    #[error("http client setup failed: {0}")]
    Setup(#[from] reqwest::Error),
}

/// `[backend]` section of the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Friend resource collection, ending in `/`.
    pub url_prefix: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            url_prefix: "http://139.6.56.197/friends/".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Full status body, shared by the ping topic and the backend PATCH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub friend_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub tile_ids: Vec<PanelId>,
}

impl StatusReport {
    pub fn new(
        identity: &DeviceIdentity,
        name: Option<String>,
        group_id: Option<String>,
        tile_ids: Vec<PanelId>,
    ) -> Self {
        StatusReport {
            friend_id: identity.friend_id().to_string(),
            name,
            device_id: identity.device_id().map(str::to_string),
            group_id,
            tile_ids,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// 201 or 204.
    Accepted,
    /// 404: the backend does not know this friend yet.
    NotRegistered,
    ServerError,
    Unexpected(StatusCode),
}

impl From<StatusCode> for HeartbeatOutcome {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::CREATED | StatusCode::NO_CONTENT => HeartbeatOutcome::Accepted,
            StatusCode::NOT_FOUND => HeartbeatOutcome::NotRegistered,
            StatusCode::INTERNAL_SERVER_ERROR => HeartbeatOutcome::ServerError,
            other => HeartbeatOutcome::Unexpected(other),
        }
    }
}

pub struct BackendClient {
    http: reqwest::Client,
    url_prefix: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(BackendClient {
            http,
            url_prefix: config.url_prefix.clone(),
        })
    }

    fn friend_url(&self, identity: &DeviceIdentity) -> String {
        format!("{}{}", self.url_prefix, identity.friend_id())
    }

    pub async fn post_heartbeat(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<HeartbeatOutcome, BackendError> {
        let url = format!("{}/heartbeat", self.friend_url(identity));
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                method: Method::POST,
                url: url.clone(),
                source,
            })?;

        let outcome = HeartbeatOutcome::from(response.status());
        match outcome {
            HeartbeatOutcome::Accepted => debug!("Heartbeat posted"),
            HeartbeatOutcome::NotRegistered => info!("Backend does not know this friend yet"),
            HeartbeatOutcome::ServerError => error!("Backend failed the heartbeat"),
            HeartbeatOutcome::Unexpected(status) => {
                warn!("Unknown heartbeat response {}", status)
            }
        }
        Ok(outcome)
    }

    pub async fn patch_status(&self, report: &StatusReport) -> Result<(), BackendError> {
        let url = format!("{}{}", self.url_prefix, report.friend_id);
        debug!("PATCH {}", url);

        let response = self
            .http
            .patch(&url)
            .json(report)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                method: Method::PATCH,
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::CREATED || status == StatusCode::NO_CONTENT {
            info!("Status registered ({})", status);
            Ok(())
        } else {
            Err(BackendError::Rejected { url, status })
        }
    }
}
