//! Framed transport codec for the Discord IPC protocol.
//!
//! Every frame carries an 8-byte header followed by a UTF-8 JSON payload.
//! Both header fields are little-endian.
//!
//! ```text
//! +----------------+----------------+------------------+
//! |  4 bytes       |  4 bytes       |  N bytes         |
//! |  (opcode LE)   |  (length LE)   |  (JSON payload)  |
//! +----------------+----------------+------------------+
//! ```

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum payload size (1 MB). Presence payloads are tiny.
const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Header size in bytes (opcode + length)
pub const HEADER_SIZE: usize = 8;

/// IPC frame opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl TryFrom<i32> for Opcode {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Handshake),
            1 => Ok(Self::Frame),
            2 => Ok(Self::Close),
            3 => Ok(Self::Ping),
            4 => Ok(Self::Pong),
            other => Err(CodecError::UnknownOpcode(other)),
        }
    }
}

/// A single IPC frame
#[derive(Debug, Clone, PartialEq)]
pub struct IpcFrame {
    pub opcode: Opcode,
    pub payload: Value,
}

impl IpcFrame {
    #[must_use]
    pub fn new(opcode: Opcode, payload: Value) -> Self {
        Self { opcode, payload }
    }
}

/// Codec for opcode + length prefixed JSON frames
#[derive(Debug, Default)]
pub struct IpcCodec {
    current_header: Option<(Opcode, usize)>,
}

impl IpcCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for IpcCodec {
    type Item = IpcFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.current_header.is_none() {
            if src.len() < HEADER_SIZE {
                return Ok(None);
            }

            let opcode = Opcode::try_from(src.get_i32_le())?;
            let len = src.get_i32_le();
            let len = usize::try_from(len).map_err(|_| CodecError::InvalidLength(len))?;

            if len > MAX_PAYLOAD_SIZE {
                return Err(CodecError::MessageTooLarge(len));
            }

            self.current_header = Some((opcode, len));
        }

        let Some((opcode, length)) = self.current_header else {
            return Ok(None);
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let payload = src.split_to(length);
        self.current_header = None;

        let json_str = std::str::from_utf8(&payload)?;
        let payload: Value = serde_json::from_str(json_str)?;

        Ok(Some(IpcFrame { opcode, payload }))
    }
}

impl Encoder<IpcFrame> for IpcCodec {
    type Error = CodecError;

    // Payload size is checked against MAX_PAYLOAD_SIZE (fits in i32)
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn encode(&mut self, item: IpcFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_string(&item.payload)?;
        let json_bytes = json.as_bytes();

        if json_bytes.len() > MAX_PAYLOAD_SIZE {
            return Err(CodecError::MessageTooLarge(json_bytes.len()));
        }

        dst.reserve(HEADER_SIZE + json_bytes.len());
        dst.put_i32_le(item.opcode as i32);
        dst.put_i32_le(json_bytes.len() as i32);
        dst.put_slice(json_bytes);

        Ok(())
    }
}

/// Errors that can occur during codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Message too large: {0} bytes (max: {MAX_PAYLOAD_SIZE})")]
    MessageTooLarge(usize),

    #[error("Unknown opcode: {0}")]
    UnknownOpcode(i32),

    #[error("Invalid payload length: {0}")]
    InvalidLength(i32),
}
