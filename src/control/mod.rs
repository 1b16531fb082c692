//! Control channel
//!
//! Length-prefixed frames carry JSON requests to the [`Engine`](crate::engine::Engine)
//! and its replies and events back.

pub mod framing;
pub mod pump;

pub use framing::{read_frame, ControlFrame, FrameDecoder, MessageType};
pub use pump::ControlPump;
