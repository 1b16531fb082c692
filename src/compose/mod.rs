//! Video compositing and audio mixing

pub mod audio;
pub mod video;

pub use audio::{gain, AudioMixer};
pub use video::{VideoMuxer, DEFAULT_BLANK_FRAME_THRESHOLD};
