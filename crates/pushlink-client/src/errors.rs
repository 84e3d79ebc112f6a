//! Client error types.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors from the connect-config endpoint call.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The HTTP request itself failed (DNS, TLS, connection reset, bad JSON).
    #[error("endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("endpoint request timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The endpoint answered with a non-success HTTP status.
    #[error("endpoint returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The endpoint answered with a non-zero application code.
    #[error("endpoint rejected request (code {code}): {msg}")]
    Rejected {
        /// Application error code.
        code: i64,
        /// Server message.
        msg: String,
    },

    /// A required response field was absent.
    #[error("endpoint response missing {0}")]
    MissingField(&'static str),

    /// The connect URL did not carry a usable `service_id`.
    #[error("invalid service_id in connect URL: {0}")]
    InvalidServiceId(String),

    /// The cancellation token fired while waiting.
    #[error("endpoint request cancelled")]
    Cancelled,
}

/// Errors from opening or using the WebSocket.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The WebSocket handshake failed.
    #[error("WebSocket connect failed: {0}")]
    Connect(#[source] Box<tungstenite::Error>),

    /// The WebSocket handshake did not finish in time.
    #[error("WebSocket connect timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// Reading from or writing to an open socket failed.
    #[error("WebSocket error: {0}")]
    Socket(#[source] Box<tungstenite::Error>),

    /// The cancellation token fired while connecting.
    #[error("connect cancelled")]
    Cancelled,
}

impl From<tungstenite::Error> for ConnectionError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Socket(Box::new(err))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
