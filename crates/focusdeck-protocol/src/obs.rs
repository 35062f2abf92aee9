//! obs-websocket (v5) control-protocol client.
//!
//! Connection flow:
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingHello -> [Authenticating] -> IdentifySent -> Ready
//! ```
//!
//! Requests are fire-and-forget: the client sends an op 6 frame and does not
//! wait for the matching response.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{Instrument, Span, debug, info, warn};

use crate::channel::{FrameChannel, WsChannel};
use crate::error::{ProtocolError, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4455;
pub const RPC_VERSION: u32 = 1;

/// Socket connect bound
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound for each handshake frame (hello, identified)
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

pub const OP_HELLO: u64 = 0;
pub const OP_IDENTIFY: u64 = 1;
pub const OP_IDENTIFIED: u64 = 2;
pub const OP_REQUEST: u64 = 6;

pub const START_REPLAY_BUFFER: &str = "StartReplayBuffer";
pub const STOP_REPLAY_BUFFER: &str = "StopReplayBuffer";

/// Connection state of an [`ObsClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingHello,
    Authenticating,
    IdentifySent,
    Ready,
}

/// Where and how to reach obs-websocket
#[derive(Debug, Clone)]
pub struct ObsSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ObsSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: None,
            connect_timeout: CONNECT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }
}

impl ObsSettings {
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    op: u64,
    #[serde(default)]
    d: Value,
}

#[derive(Debug, Deserialize)]
struct Hello {
    #[serde(default)]
    authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthChallenge {
    salt: String,
    challenge: String,
}

/// `base64(sha256(password + salt))`
#[must_use]
pub fn auth_secret(password: &str, salt: &str) -> String {
    let digest = Sha256::digest(format!("{password}{salt}").as_bytes());
    STANDARD.encode(digest)
}

/// `base64(sha256(secret + challenge))`, where `secret` is [`auth_secret`].
#[must_use]
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = auth_secret(password, salt);
    let digest = Sha256::digest(format!("{secret}{challenge}").as_bytes());
    STANDARD.encode(digest)
}

/// Client for one obs-websocket connection
pub struct ObsClient {
    settings: ObsSettings,
    channel: Option<WsChannel>,
    state: ConnectionState,
    authenticated: bool,
    span: Span,
}

impl ObsClient {
    #[must_use]
    pub fn new(settings: ObsSettings, span: Span) -> Self {
        Self {
            settings,
            channel: None,
            state: ConnectionState::Disconnected,
            authenticated: false,
            span,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Whether the last handshake included a challenge response.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    #[must_use]
    pub fn url(&self) -> String {
        self.settings.url()
    }

    /// Connect and complete the hello / identify handshake.
    ///
    /// Connecting an already ready client is a no-op. On failure the socket is
    /// closed and the client is back in `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns an error on connect timeout, a missing or malformed hello, a
    /// rejected identify, or a missing identified acknowledgement.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let span = self.span.clone();
        let result = self.handshake().instrument(span.clone()).await;

        if let Err(e) = &result {
            span.in_scope(|| warn!("Connection to {} failed: {}", self.url(), e));
            self.disconnect().await;
        }
        result
    }

    async fn handshake(&mut self) -> Result<()> {
        let url = self.settings.url();
        self.state = ConnectionState::Connecting;
        debug!("State -> {:?}", self.state);
        self.authenticated = false;

        let channel = self
            .channel
            .insert(WsChannel::connect(&url, self.settings.connect_timeout).await?);

        self.state = ConnectionState::AwaitingHello;
        debug!("State -> {:?}", self.state);
        let hello = channel.recv(self.settings.handshake_timeout).await?;
        let hello = parse_envelope(hello, OP_HELLO, "Hello")?;
        let hello: Hello = serde_json::from_value(hello)
            .map_err(|e| ProtocolError::protocol(format!("malformed Hello: {e}")))?;

        let mut identify = json!({ "rpcVersion": RPC_VERSION });
        if let Some(auth) = hello.authentication {
            self.state = ConnectionState::Authenticating;
            debug!("State -> {:?}", self.state);

            let password = self
                .settings
                .password
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    ProtocolError::Authentication(
                        "server requires a password but none is configured".to_string(),
                    )
                })?;

            identify["authentication"] =
                Value::String(auth_response(password, &auth.salt, &auth.challenge));
            self.authenticated = true;
        }

        let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;
        channel
            .send(json!({ "op": OP_IDENTIFY, "d": identify }))
            .await?;
        self.state = ConnectionState::IdentifySent;
        debug!("State -> {:?}", self.state);

        let identified = match channel.recv(self.settings.handshake_timeout).await {
            Ok(frame) => frame,
            Err(ProtocolError::Closed) if self.authenticated => {
                return Err(ProtocolError::Authentication(
                    "server closed the connection after Identify".to_string(),
                ));
            }
            Err(e) => return Err(e),
        };
        let identified = parse_envelope(identified, OP_IDENTIFIED, "Identified")?;

        self.state = ConnectionState::Ready;
        info!(
            "Connected to {} (negotiated rpcVersion {})",
            url,
            identified
                .get("negotiatedRpcVersion")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(u64::from(RPC_VERSION))
        );
        Ok(())
    }

    /// Send a request without waiting for its response.
    ///
    /// Returns the generated request id.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::NotConnected` unless the client is ready, or the
    /// send error if the frame could not be written.
    pub async fn send_control_request(&mut self, request_type: &str) -> Result<String> {
        if !self.is_ready() {
            return Err(ProtocolError::NotConnected);
        }
        let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;

        let request_id = uuid::Uuid::new_v4().to_string();
        let frame = json!({
            "op": OP_REQUEST,
            "d": {
                "requestType": request_type,
                "requestId": request_id,
            }
        });

        channel.send(frame).instrument(self.span.clone()).await?;
        self.span
            .in_scope(|| info!("Sent {} ({})", request_type, request_id));
        Ok(request_id)
    }

    /// Close the socket and reset to `Disconnected`. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().instrument(self.span.clone()).await {
                self.span
                    .in_scope(|| debug!("Close handshake with {} failed: {}", channel.url(), e));
            }
            self.span.in_scope(|| debug!("Disconnected from {}", channel.url()));
        }
        self.state = ConnectionState::Disconnected;
    }
}

/// Check the opcode of a received frame and return its `d` body.
fn parse_envelope(frame: Value, expected: u64, name: &str) -> Result<Value> {
    let envelope: Envelope = serde_json::from_value(frame)
        .map_err(|e| ProtocolError::protocol(format!("malformed {name} frame: {e}")))?;

    if envelope.op != expected {
        return Err(ProtocolError::protocol(format!(
            "expected {name} (op {expected}), got op {}",
            envelope.op
        )));
    }
    Ok(envelope.d)
}
