//! Unified error types for the storefront client.

use std::fmt;

// ---------------------------------------------------------------------------
// RequestError
// ---------------------------------------------------------------------------

/// Errors from the HTTP gateway.
#[derive(Debug)]
pub enum RequestError {
    /// Network / reqwest-level error.
    Http(reqwest::Error),
    /// Non-2xx status from the API. The message is extracted from the
    /// structured error body when one is present, else the status line.
    Status(u16, String),
    /// The response body did not decode as the expected shape.
    Decode(String),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Status(code, message) => write!(f, "status {code}: {message}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors when reading or writing the persistent identity store.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Invalid(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Invalid(msg) => write!(f, "invalid identity store: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// ChannelError
// ---------------------------------------------------------------------------

/// Errors from the realtime channel connect path.
///
/// Failures after the socket is established are reported as channel events,
/// not errors, so the read loop can keep delivering frames in order.
#[derive(Debug)]
pub enum ChannelError {
    /// The configured websocket endpoint is not a valid URL.
    InvalidUrl(String),
    /// The websocket handshake failed.
    Connect(String),
    /// The handshake did not complete within the configured timeout.
    Timeout(String),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(msg) => write!(f, "invalid websocket url: {msg}"),
            Self::Connect(msg) => write!(f, "websocket connect failed: {msg}"),
            Self::Timeout(msg) => write!(f, "websocket connect timed out: {msg}"),
        }
    }
}

impl std::error::Error for ChannelError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// ClientError — top-level
// ---------------------------------------------------------------------------

/// Top-level error type for the storefront client.
#[derive(Debug)]
pub enum ClientError {
    Config(ConfigError),
    Request(RequestError),
    Store(StoreError),
    Channel(ChannelError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Request(e) => write!(f, "api: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Channel(e) => write!(f, "realtime: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ConfigError> for ClientError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<RequestError> for ClientError {
    fn from(e: RequestError) -> Self {
        Self::Request(e)
    }
}

impl From<StoreError> for ClientError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<ChannelError> for ClientError {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}
