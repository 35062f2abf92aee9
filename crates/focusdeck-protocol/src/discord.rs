//! Discord RPC client over the local IPC endpoint.
//!
//! The client walks a fixed list of endpoints (`discord-ipc-0` through
//! `discord-ipc-9`), keeps the first that accepts a connection, and sends the
//! handshake frame straight away. Activity commands are fire-and-forget.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{Instrument, Span, debug, info, warn};

use crate::channel::{FrameChannel, IpcStream, PipeChannel};
use crate::error::{ProtocolError, Result};
use crate::transport::{IpcFrame, Opcode};

pub const IPC_VERSION: u32 = 1;

/// Number of well-known endpoint names to try
pub const PIPE_CANDIDATES: usize = 10;

/// Bound for a single endpoint connection attempt
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

/// Well-known endpoint names, in the order they are tried.
#[must_use]
pub fn pipe_names() -> Vec<String> {
    (0..PIPE_CANDIDATES)
        .map(|i| format!("discord-ipc-{i}"))
        .collect()
}

#[cfg(unix)]
fn runtime_dir() -> PathBuf {
    ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .find_map(|var| std::env::var_os(var).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Full endpoint path for a pipe name.
#[cfg(windows)]
#[must_use]
pub fn endpoint_path(name: &str) -> String {
    format!(r"\\.\pipe\{name}")
}

/// Full endpoint path for a pipe name.
#[cfg(unix)]
#[must_use]
pub fn endpoint_path(name: &str) -> String {
    runtime_dir().join(name).to_string_lossy().into_owned()
}

/// Default endpoint candidates for this platform.
#[must_use]
pub fn default_endpoints() -> Vec<String> {
    pipe_names().iter().map(|name| endpoint_path(name)).collect()
}

#[cfg(windows)]
#[allow(clippy::unused_async)] // Named pipe open is synchronous; kept async to match unix
async fn open_endpoint(path: &str) -> io::Result<Box<dyn IpcStream>> {
    use tokio::net::windows::named_pipe::ClientOptions;

    let client = ClientOptions::new().open(path)?;
    Ok(Box::new(client))
}

#[cfg(unix)]
async fn open_endpoint(path: &str) -> io::Result<Box<dyn IpcStream>> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

/// Discord application and endpoint settings
#[derive(Debug, Clone)]
pub struct DiscordSettings {
    pub client_id: String,
    pub endpoints: Vec<String>,
    pub attempt_timeout: Duration,
}

impl DiscordSettings {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            endpoints: default_endpoints(),
            attempt_timeout: ATTEMPT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityTimestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityAssets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,
}

/// Rich presence activity payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Activity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<ActivityTimestamps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<ActivityAssets>,
}

impl Activity {
    #[must_use]
    pub fn with_state(state: impl Into<String>) -> Self {
        Self {
            state: Some(state.into()),
            ..Self::default()
        }
    }
}

/// Client for one Discord IPC connection
pub struct DiscordClient {
    settings: DiscordSettings,
    channel: Option<PipeChannel>,
    nonce: u64,
    span: Span,
}

impl DiscordClient {
    #[must_use]
    pub fn new(settings: DiscordSettings, span: Span) -> Self {
        Self {
            settings,
            channel: None,
            nonce: 0,
            span,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Endpoint of the live connection, if any
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.channel.as_ref().map(PipeChannel::endpoint)
    }

    /// Connect to the first endpoint that accepts and send the handshake.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::NoPipeAvailable` when no endpoint accepts, or the
    /// send error if the handshake frame cannot be written.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let span = self.span.clone();
        let result = self.open_and_handshake().instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| warn!("Discord IPC connection failed: {}", e));
            self.disconnect().await;
        }
        result
    }

    async fn open_and_handshake(&mut self) -> Result<()> {
        let mut accepted = None;
        for endpoint in &self.settings.endpoints {
            match tokio::time::timeout(self.settings.attempt_timeout, open_endpoint(endpoint)).await
            {
                Ok(Ok(stream)) => {
                    accepted = Some(PipeChannel::new(stream, endpoint.clone()));
                    break;
                }
                Ok(Err(e)) => debug!("{} not available: {}", endpoint, e),
                Err(_) => debug!("{} timed out", endpoint),
            }
        }

        let channel = self.channel.insert(
            accepted.ok_or(ProtocolError::NoPipeAvailable(self.settings.endpoints.len()))?,
        );

        let handshake = json!({
            "v": IPC_VERSION,
            "client_id": self.settings.client_id,
        });
        channel
            .send(IpcFrame::new(Opcode::Handshake, handshake))
            .await?;

        info!("Connected to Discord IPC at {}", channel.endpoint());
        Ok(())
    }

    /// Show a plain status line for this session.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::NotConnected` or the send error.
    pub async fn set_status(&mut self, status: &str) -> Result<String> {
        self.set_activity(Some(&Activity::with_state(status))).await
    }

    /// Publish a rich presence activity.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::NotConnected` or the send error.
    pub async fn set_rich_presence(&mut self, activity: &Activity) -> Result<String> {
        self.set_activity(Some(activity)).await
    }

    /// Clear any activity published by this client.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::NotConnected` or the send error.
    pub async fn clear_activity(&mut self) -> Result<String> {
        self.set_activity(None).await
    }

    /// Send a `SET_ACTIVITY` command and return its nonce.
    async fn set_activity(&mut self, activity: Option<&Activity>) -> Result<String> {
        let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;

        self.nonce += 1;
        let nonce = self.nonce.to_string();
        let activity = match activity {
            Some(activity) => serde_json::to_value(activity)?,
            None => Value::Null,
        };

        let command = json!({
            "cmd": "SET_ACTIVITY",
            "nonce": nonce,
            "args": {
                "pid": std::process::id(),
                "activity": activity,
            }
        });

        channel
            .send(IpcFrame::new(Opcode::Frame, command))
            .instrument(self.span.clone())
            .await?;
        self.span.in_scope(|| debug!("SET_ACTIVITY sent (nonce {})", nonce));
        Ok(nonce)
    }

    /// Close the endpoint. Disconnecting twice is a no-op.
    pub async fn disconnect(&mut self) {
        let Some(mut channel) = self.channel.take() else {
            return;
        };

        if let Err(e) = channel.close().instrument(self.span.clone()).await {
            self.span
                .in_scope(|| debug!("Closing {} failed: {}", channel.endpoint(), e));
        }
        self.span
            .in_scope(|| debug!("Disconnected from {}", channel.endpoint()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_names_order() {
        let names = pipe_names();
        assert_eq!(names.len(), PIPE_CANDIDATES);
        assert_eq!(names[0], "discord-ipc-0");
        assert_eq!(names[9], "discord-ipc-9");
    }

    #[test]
    #[cfg(windows)]
    fn test_endpoint_path_windows() {
        assert_eq!(endpoint_path("discord-ipc-0"), r"\\.\pipe\discord-ipc-0");
    }

    #[test]
    #[cfg(unix)]
    fn test_endpoint_path_unix() {
        assert!(endpoint_path("discord-ipc-0").ends_with("discord-ipc-0"));
    }

    #[test]
    fn test_activity_serialization_skips_empty_fields() {
        let activity = Activity::with_state("In game");
        let value = serde_json::to_value(&activity).unwrap();
        assert_eq!(value, json!({"state": "In game"}));

        let activity = Activity {
            details: Some("Playing Apex Legends".to_string()),
            state: None,
            timestamps: Some(ActivityTimestamps {
                start: Some(1_700_000_000),
            }),
            assets: Some(ActivityAssets {
                large_image: Some("logo".to_string()),
                large_text: None,
            }),
        };
        let value = serde_json::to_value(&activity).unwrap();
        assert_eq!(value["details"], "Playing Apex Legends");
        assert_eq!(value["timestamps"]["start"], 1_700_000_000);
        assert_eq!(value["assets"], json!({"large_image": "logo"}));
        assert!(value.get("state").is_none());
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let mut client = DiscordClient::new(DiscordSettings::new("123"), Span::none());
        assert!(matches!(
            client.set_status("dnd").await,
            Err(ProtocolError::NotConnected)
        ));
        assert!(matches!(
            client.clear_activity().await,
            Err(ProtocolError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_no_endpoint_available() {
        let settings = DiscordSettings::new("123")
            .with_endpoints(vec![missing_endpoint("a"), missing_endpoint("b")]);
        let mut client = DiscordClient::new(settings, Span::none());

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, ProtocolError::NoPipeAvailable(2)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_double_disconnect_is_noop() {
        let mut client = DiscordClient::new(DiscordSettings::new("123"), Span::none());
        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());
    }

    fn missing_endpoint(name: &str) -> String {
        #[cfg(windows)]
        {
            endpoint_path(&format!("focusdeck-test-missing-{name}"))
        }
        #[cfg(unix)]
        {
            std::env::temp_dir()
                .join(format!("focusdeck-test-missing-{name}"))
                .to_string_lossy()
                .into_owned()
        }
    }
}
