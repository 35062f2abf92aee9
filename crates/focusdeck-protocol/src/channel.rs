//! Send/receive-with-timeout primitives shared by the protocol clients.
//!
//! [`FrameChannel`] is the one seam both clients are written against. The
//! WebSocket channel moves JSON text frames; the pipe channel moves
//! [`IpcFrame`]s through [`IpcCodec`].

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::error::{ProtocolError, Result};
use crate::transport::{IpcCodec, IpcFrame};

/// A connected, framed, bidirectional channel.
pub trait FrameChannel: Send {
    type Frame: Send;

    /// Send one frame without waiting for any reply.
    fn send(&mut self, frame: Self::Frame) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next frame, giving up after `timeout`.
    fn recv(&mut self, timeout: Duration) -> impl Future<Output = Result<Self::Frame>> + Send;

    /// Close the underlying transport.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// JSON-over-WebSocket channel
pub struct WsChannel {
    stream: WsStream,
    url: String,
}

impl WsChannel {
    /// Open a WebSocket connection, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Timeout` if the connection is not established in
    /// time, or `ProtocolError::WebSocket` if the upgrade fails.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        debug!("Connecting to {url}");
        let (stream, _response) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| ProtocolError::timeout(timeout))??;

        Ok(Self {
            stream,
            url: url.to_string(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FrameChannel for WsChannel {
    type Frame = Value;

    async fn send(&mut self, frame: Value) -> Result<()> {
        let text = serde_json::to_string(&frame)?;
        trace!("[{}] -> {}", self.url, text);
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Value> {
        tokio::time::timeout(timeout, next_text(&mut self.stream, &self.url))
            .await
            .map_err(|_| ProtocolError::timeout(timeout))?
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

/// Read until the next text frame, skipping control and binary frames.
async fn next_text(stream: &mut WsStream, url: &str) -> Result<Value> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                trace!("[{url}] <- {text}");
                return Ok(serde_json::from_str(&text)?);
            }
            Some(Ok(Message::Close(frame))) => {
                if let Some(frame) = frame {
                    debug!(
                        "[{url}] Server closed connection: {} {}",
                        u16::from(frame.code),
                        frame.reason
                    );
                }
                return Err(ProtocolError::Closed);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ProtocolError::Closed),
        }
    }
}

/// Byte stream a pipe channel can run over (Windows named pipe or Unix socket).
pub trait IpcStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IpcStream for T {}

/// Framed channel over a local IPC endpoint
pub struct PipeChannel {
    framed: Framed<Box<dyn IpcStream>, IpcCodec>,
    endpoint: String,
}

impl PipeChannel {
    #[must_use]
    pub fn new(stream: Box<dyn IpcStream>, endpoint: impl Into<String>) -> Self {
        Self {
            framed: Framed::new(stream, IpcCodec::new()),
            endpoint: endpoint.into(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl FrameChannel for PipeChannel {
    type Frame = IpcFrame;

    async fn send(&mut self, frame: IpcFrame) -> Result<()> {
        trace!("[{}] -> {:?} {}", self.endpoint, frame.opcode, frame.payload);
        self.framed.send(frame).await?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<IpcFrame> {
        match tokio::time::timeout(timeout, self.framed.next()).await {
            Ok(Some(Ok(frame))) => Ok(frame),
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => Err(ProtocolError::Closed),
            Err(_) => Err(ProtocolError::timeout(timeout)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }
}
