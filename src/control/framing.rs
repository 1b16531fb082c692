//! Control channel wire format
//!
//! ```text
//! +----------------+-----------+-----+-------------------+
//! | length (u32be) | type      | '=' | payload (JSON)    |
//! +----------------+-----------+-----+-------------------+
//!                  |<-------------- length ------------->|
//! ```
//!
//! Requests carry a type of `$req16-` followed by a 16 character request id
//! and the operation name. The reply to a request has type `$res16-<id>`.
//! Any other type is a plain message.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{CommandError, ControlError, Error, Result};

pub const REQUEST_PREFIX: &str = "$req16-";
pub const RESPONSE_PREFIX: &str = "$res16-";
pub const REQUEST_ID_LEN: usize = 16;

/// Largest frame accepted by default
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LENGTH_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub kind: String,
    pub payload: Bytes,
}

impl ControlFrame {
    pub fn new(kind: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    pub fn json(kind: impl Into<String>, body: &Value) -> Self {
        Self::new(kind, body.to_string().into_bytes())
    }

    /// Success reply: `code` 0 plus the fields of `result`
    pub fn response(id: &str, result: std::result::Result<Value, CommandError>) -> Self {
        let body = match result {
            Ok(Value::Object(mut fields)) => {
                fields.insert("code".into(), Value::from(0));
                Value::Object(fields)
            }
            Ok(Value::Null) => json!({ "code": 0 }),
            Ok(other) => json!({ "code": 0, "result": other }),
            Err(e) => json!({ "code": e.code.code(), "error": e.message }),
        };
        Self::json(format!("{}{}", RESPONSE_PREFIX, id), &body)
    }

    /// Payload as JSON; an empty payload reads as `null`
    pub fn body(&self) -> Result<Value> {
        if self.payload.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.payload).map_err(|e| ControlError::InvalidPayload(e.to_string()).into())
    }

    pub fn message_type(&self) -> MessageType<'_> {
        MessageType::parse(&self.kind)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let len = self.kind.len() + 1 + self.payload.len();
        buf.reserve(LENGTH_SIZE + len);
        buf.put_u32(len as u32);
        buf.put_slice(self.kind.as_bytes());
        buf.put_u8(b'=');
        buf.put_slice(&self.payload);
    }
}

/// What a frame type means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType<'a> {
    Request { id: &'a str, op: &'a str },
    Message(&'a str),
}

impl<'a> MessageType<'a> {
    pub fn parse(kind: &'a str) -> Self {
        let split = REQUEST_PREFIX.len() + REQUEST_ID_LEN;
        if kind.len() > split && kind.starts_with(REQUEST_PREFIX) {
            if let (Some(id), Some(op)) = (kind.get(REQUEST_PREFIX.len()..split), kind.get(split..)) {
                return MessageType::Request { id, op };
            }
        }
        MessageType::Message(kind)
    }
}

/// Splits a byte stream into frames
#[derive(Debug)]
pub struct FrameDecoder {
    max_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Take one complete frame off the front of `buf`
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ControlFrame>> {
        if buf.len() < LENGTH_SIZE {
            return Ok(None);
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len > self.max_len {
            return Err(ControlError::FrameTooLarge(len).into());
        }
        if buf.len() < LENGTH_SIZE + len {
            buf.reserve(LENGTH_SIZE + len - buf.len());
            return Ok(None);
        }
        buf.advance(LENGTH_SIZE);
        let mut data = buf.split_to(len).freeze();
        let eq = data
            .iter()
            .position(|b| *b == b'=')
            .ok_or(ControlError::MissingSeparator)?;
        let kind = String::from_utf8_lossy(&data[..eq]).into_owned();
        data.advance(eq + 1);
        Ok(Some(ControlFrame { kind, payload: data }))
    }
}

/// Read the next frame, `None` on a clean end of stream
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
    buf: &mut BytesMut,
) -> Result<Option<ControlFrame>> {
    loop {
        if let Some(frame) = decoder.decode(buf)? {
            return Ok(Some(frame));
        }
        if reader.read_buf(buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
    }
}
