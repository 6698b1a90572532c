//! Unified SDK error types.

use thiserror::Error;

/// Top-level SDK error.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification shared by REST and streaming failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Http4xx,
    Http5xx,
    Timeout,
    NotJson,
    Transport,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Http4xx => "HTTP_4XX",
            ErrorKind::Http5xx => "HTTP_5XX",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::NotJson => "NOT_JSON",
            ErrorKind::Transport => "TRANSPORT_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP-layer errors.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Client error {status}: {body}")]
    Response4xx { status: u16, body: String },

    #[error("Server error {status}: {body}")]
    Response5xx { status: u16, body: String },

    #[error("Timeout")]
    Timeout,

    #[error("Response is not JSON: {0}")]
    NotJson(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl HttpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HttpError::Response4xx { .. } => ErrorKind::Http4xx,
            HttpError::Response5xx { .. } => ErrorKind::Http5xx,
            HttpError::Timeout => ErrorKind::Timeout,
            HttpError::NotJson(_) => ErrorKind::NotJson,
            HttpError::Transport(_) | HttpError::MaxRetriesExceeded { .. } => ErrorKind::Transport,
        }
    }

    /// Classify a non-success status code.
    pub fn from_status(status: u16, body: String) -> Self {
        if (400..500).contains(&status) {
            HttpError::Response4xx { status, body }
        } else {
            HttpError::Response5xx { status, body }
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HttpError::Timeout
        } else {
            HttpError::Transport(e.to_string())
        }
    }
}

/// WebSocket errors.
#[derive(Error, Debug)]
pub enum WsError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout")]
    ConnectTimeout,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Heartbeat lost")]
    HeartbeatTimeout,

    #[error("Streaming is not supported for this venue")]
    Unsupported,

    #[error("Connection closed: code={code:?} reason={reason}")]
    Closed { code: Option<u16>, reason: String },

    #[error("Client stopped")]
    Stopped,
}

impl WsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WsError::ConnectTimeout => ErrorKind::Timeout,
            _ => ErrorKind::Transport,
        }
    }
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}
