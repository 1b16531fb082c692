//! RTMP wire protocol: handshake, chunk stream, messages

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder, RtmpMessage};
pub use message::{Command, ConnectParams, ControlMessage};
