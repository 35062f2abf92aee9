//! Error types for the focusdeck-protocol crate.
//!
//! Both protocol clients report failures through [`ProtocolError`]. Callers at
//! the integration layer turn these into logged, boolean outcomes.

use crate::transport::CodecError;

/// Unified error type for protocol client operations
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Connection closed")]
    Closed,

    #[error("Not connected")]
    NotConnected,

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("No IPC endpoint accepted a connection (tried {0})")]
    NoPipeAvailable(usize),
}

impl ProtocolError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    // Durations handed to the clients are a few seconds at most
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout(duration.as_millis() as u64)
    }

    /// Whether the failure came from reaching the endpoint rather than from
    /// what the endpoint said.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::WebSocket(_) | Self::Timeout(_) | Self::Closed | Self::NoPipeAvailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
