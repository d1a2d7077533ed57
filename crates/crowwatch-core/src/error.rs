//! Error types for the monitor, its chain client and the log decoder.

use thiserror::Error;

/// Errors raised by a [`ChainClient`](crate::client::ChainClient) or one of
/// its connections.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The dial to the node endpoint failed.
    #[error("connection to {url} failed: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// WebSocket send/receive error on an established connection.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The connection (or the subscription riding on it) is gone.
    #[error("connection closed: {0}")]
    Closed(String),

    /// A node response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Returns `true` if the error means the underlying connection is no
    /// longer usable and must be re-dialed.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::WebSocket(_) | Self::Closed(_))
    }
}

/// A log matched the Transfer signature but could not be decoded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing topic {index} (log has {len} topics)")]
    MissingTopic { index: usize, len: usize },

    #[error("amount payload does not fit in 256 bits ({len} significant bytes)")]
    AmountOverflow { len: usize },
}

/// Errors while loading or validating a [`MonitorConfig`](crate::config::MonitorConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("token decimals {0} out of range (max 77)")]
    Decimals(u8),

    #[error("invalid reconnect policy: {0}")]
    Reconnect(String),
}

/// Fatal outcomes of [`Monitor::run`](crate::monitor::Monitor::run).
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The initial dial or the initial subscription failed.
    #[error("startup failed: {0}")]
    Startup(#[source] TransportError),

    /// `max_attempts` reconnect attempts in a row failed.
    #[error("reconnect failed after {attempts} attempts: {last}")]
    ReconnectExhausted {
        attempts: u32,
        #[source]
        last: TransportError,
    },
}
