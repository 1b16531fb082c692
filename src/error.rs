//! Error types
//!
//! Each layer has its own error enum; all of them convert into the crate-level
//! [`Error`]. The command surface reports failures as [`CommandError`], which
//! carries one of the numeric [`ErrorCode`]s seen by control-channel clients.

use std::fmt;
use std::io;

use thiserror::Error;

/// Crate-level result type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("AMF error: {0}")]
    Amf(#[from] AmfError),

    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("control channel error: {0}")]
    Control(#[from] ControlError),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Media container / bitstream errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("invalid AVC packet")]
    InvalidAvcPacket,

    #[error("invalid AAC packet")]
    InvalidAacPacket,

    #[error("invalid FLV data: {0}")]
    InvalidFlv(&'static str),

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// AMF encoding/decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmfError {
    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("unknown type marker 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("invalid object end marker")]
    InvalidObjectEnd,

    #[error("nesting too deep")]
    NestingTooDeep,
}

/// Handshake errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("unsupported RTMP version {0}")]
    InvalidVersion(u8),

    #[error("handshake not complete")]
    Incomplete,
}

/// RTMP protocol errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("connect rejected: {0}")]
    ConnectRejected(String),

    #[error("publish rejected: {0}")]
    PublishRejected(String),

    #[error("play rejected: {0}")]
    PlayRejected(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("H.264 configuration already sent on a previous connection")]
    ConfigAlreadySent,

    #[error("not connected")]
    NotConnected,

    #[error("invalid chunk: {0}")]
    InvalidChunk(&'static str),
}

/// Codec backend errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("no codec available for {0}")]
    Unavailable(String),

    #[error("failed to open codec: {0}")]
    OpenFailed(String),

    #[error("failed to send to codec: {0}")]
    SendFailed(String),

    #[error("failed to receive from codec: {0}")]
    ReceiveFailed(String),
}

/// Control channel framing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    #[error("frame has no type separator")]
    MissingSeparator,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Numeric error codes returned on the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConnNotFound,
    InvalidParams,
    StreamNotFound,
    MuxerNotFound,
    SinkNotFound,
}

impl ErrorCode {
    /// Wire value of this code
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::ConnNotFound => 10002,
            ErrorCode::InvalidParams => 10003,
            ErrorCode::StreamNotFound => 10004,
            ErrorCode::MuxerNotFound => 10005,
            ErrorCode::SinkNotFound => 10006,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            10002 => Some(ErrorCode::ConnNotFound),
            10003 => Some(ErrorCode::InvalidParams),
            10004 => Some(ErrorCode::StreamNotFound),
            10005 => Some(ErrorCode::MuxerNotFound),
            10006 => Some(ErrorCode::SinkNotFound),
            _ => None,
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ConnNotFound => "conn not found",
            ErrorCode::InvalidParams => "invalid params",
            ErrorCode::StreamNotFound => "stream not found",
            ErrorCode::MuxerNotFound => "muxer not found",
            ErrorCode::SinkNotFound => "sink not found",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error reported by a command handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({code})")]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn conn_not_found(id: &str) -> Self {
        Self::new(ErrorCode::ConnNotFound, format!("conn {} not found", id))
    }

    pub fn stream_not_found(id: &str) -> Self {
        Self::new(ErrorCode::StreamNotFound, format!("stream {} not found", id))
    }

    pub fn muxer_not_found(id: &str) -> Self {
        Self::new(ErrorCode::MuxerNotFound, format!("muxer {} not found", id))
    }

    pub fn sink_not_found(id: &str) -> Self {
        Self::new(ErrorCode::SinkNotFound, format!("sink {} not found", id))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, detail)
    }
}

impl From<ErrorCode> for CommandError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }
}
