//! RTMP clients
//!
//! The publisher pushes the encoded composite from output sinks to a remote
//! server; the player pulls `rtmp://` sources for URL inputs.

pub mod config;
mod connection;
pub mod player;
pub mod publisher;
#[cfg(test)]
pub(crate) mod testing;

pub use config::{ClientConfig, RtmpUrl};
pub use player::RtmpPlayer;
pub use publisher::RtmpPublisher;
