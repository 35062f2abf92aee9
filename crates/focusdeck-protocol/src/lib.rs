//! Local control-protocol clients for focusdeck.
//!
//! This crate provides the two protocol clients the orchestrator uses to talk
//! to running desktop applications.
//!
//! # Architecture
//!
//! - [`channel`]: `FrameChannel` send/receive-with-timeout primitive, with a
//!   WebSocket and a local-pipe implementation
//! - [`transport`]: Opcode + length-prefixed codec for IPC frames
//! - [`obs`]: obs-websocket v5 client (hello / identify handshake, requests)
//! - [`discord`]: Discord RPC client over the local IPC endpoint
//! - [`error`]: Error and result types
//!
//! # Example
//!
//! ```no_run
//! use focusdeck_protocol::obs::{ObsClient, ObsSettings, START_REPLAY_BUFFER};
//!
//! # async fn example() -> Result<(), focusdeck_protocol::ProtocolError> {
//! let mut client = ObsClient::new(ObsSettings::default(), tracing::Span::none());
//! client.connect().await?;
//! client.send_control_request(START_REPLAY_BUFFER).await?;
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod discord;
pub mod error;
pub mod obs;
pub mod transport;

pub use channel::{FrameChannel, IpcStream, PipeChannel, WsChannel};
pub use discord::{Activity, ActivityAssets, ActivityTimestamps, DiscordClient, DiscordSettings};
pub use error::{ProtocolError, Result};
pub use obs::{ConnectionState, ObsClient, ObsSettings};
pub use transport::{CodecError, IpcCodec, IpcFrame, Opcode};
