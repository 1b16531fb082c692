//! Muxer configuration

use crate::compose::DEFAULT_BLANK_FRAME_THRESHOLD;

/// Muxer configuration options
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Canvas width, fixed for the muxer's lifetime
    pub width: u32,

    /// Canvas height, fixed for the muxer's lifetime
    pub height: u32,

    /// Composite frames per second
    pub fps: u32,

    /// Skip video composition entirely
    pub audio_only: bool,

    /// Blank canvases suppressed before output starts anyway
    pub blank_frame_threshold: u64,

    /// Per-input audio backlog kept when mixing
    pub audio_latest_limit: usize,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 25,
            audio_only: false,
            blank_frame_threshold: DEFAULT_BLANK_FRAME_THRESHOLD,
            audio_latest_limit: 20,
        }
    }
}

impl MuxerConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the frame rate; zero keeps the current value
    pub fn fps(mut self, fps: u32) -> Self {
        if fps > 0 {
            self.fps = fps;
        }
        self
    }

    pub fn audio_only(mut self, audio_only: bool) -> Self {
        self.audio_only = audio_only;
        self
    }

    pub fn blank_frame_threshold(mut self, frames: u64) -> Self {
        self.blank_frame_threshold = frames;
        self
    }

    pub fn audio_latest_limit(mut self, limit: usize) -> Self {
        self.audio_latest_limit = limit.max(1);
        self
    }
}
