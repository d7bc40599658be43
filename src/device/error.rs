use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device base url is not known")]
    NoBaseUrl,

    #[error("invalid device base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// An authenticated call was attempted without a token.
    #[error("no auth token for {endpoint}")]
    MissingToken { endpoint: String },

    #[error("{method} {endpoint} failed: {source}")]
    Transport {
        method: String,
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {endpoint} returned {status}")]
    Status {
        method: String,
        endpoint: String,
        status: StatusCode,
    },

    #[error("{method} {endpoint} returned an unusable body: {reason}")]
    Body {
        method: String,
        endpoint: String,
        reason: String,
    },

    #[error("invalid color command: {0}")]
    InvalidCommand(String),

    #[error("color command carries no colors")]
    EmptyCommand,

    #[error("http client setup failed: {0}")]
    Setup(#[from] reqwest::Error),
}

impl DeviceError {
    /// Timeouts, refused connections and 5xx answers.
    pub fn is_transient(&self) -> bool {
        match self {
            DeviceError::Transport { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            DeviceError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// The device refused the token, or there was none to send.
    pub fn is_auth_rejected(&self) -> bool {
        match self {
            DeviceError::MissingToken { .. } => true,
            DeviceError::Status { status, .. } => {
                *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
            }
            _ => false,
        }
    }
}
