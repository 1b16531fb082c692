//! Real-time audio/video muxing and relay engine
//!
//! Media enters as [`stream::Stream`]s (peer tracks, pulled URLs, synthetic
//! canvases, raw packets pushed by a client), is composited and mixed by an
//! [`muxer::AvMuxer`], re-encoded and fanned out to RTMP publishers, FLV
//! files or raw packet consumers.
//!
//! ```text
//!  Stream ──► Input ──┐                      ┌──► RtmpSink ──► RtmpSender ──► rtmp:// | file.flv
//!  Stream ──► Input ──┼──► AvMuxer ──► Stream┤
//!  Stream ──► Input ──┘   (video + audio)    └──► RawPacketSink ──► events
//! ```
//!
//! Everything is driven through [`engine::Engine`], usually by the
//! length-prefixed control channel in [`control`].

pub mod amf;
pub mod client;
pub mod codec;
pub mod compose;
pub mod control;
pub mod engine;
pub mod error;
pub mod frame;
pub mod input;
pub mod media;
pub mod muxer;
pub mod options;
pub mod output;
pub mod protocol;
pub mod stats;
pub mod stream;
pub mod sync;
pub mod transform;

pub use control::ControlPump;
pub use engine::{Engine, EngineConfig, EngineEvent};
pub use error::{CommandError, Error, ErrorCode, Result};
pub use muxer::{AvMuxer, MuxerConfig};
pub use output::{RtmpSink, SinkConfig};
pub use stream::Stream;
