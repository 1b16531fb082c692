//! Output side: encode the composite and ship it
//!
//! [`RtmpSink`] encodes frames and publishes them through an [`RtmpSender`]
//! to an RTMP server or a local FLV file. [`RawPacketSink`] forwards raw
//! packets to an observer untouched.

pub mod config;
pub mod raw;
pub mod sender;
pub mod sink;
pub mod transport;

pub use config::{SenderConfig, SinkConfig};
pub use raw::{RawPacketObserver, RawPacketSink};
pub use sender::{RtmpSender, SenderState};
pub use sink::RtmpSink;
pub use transport::{DefaultTransportFactory, FlvFileTransport, TagTransport, TransportFactory};
