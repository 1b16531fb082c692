//! Engine configuration

use std::time::Duration;

use crate::compose::DEFAULT_BLANK_FRAME_THRESHOLD;
use crate::input::InputConfig;
use crate::output::SinkConfig;

/// Synthetic test pattern defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasConfig {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Background as 0xRRGGBB
    pub background: u32,
    /// Sine tone sample rate
    pub tone_rate: u32,
    /// Sine tone frequency in Hz
    pub tone_hz: u32,
    /// Audio frame duration
    pub audio_frame: Duration,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            fps: 25,
            width: 320,
            height: 240,
            background: 0xff0000,
            tone_rate: 8000,
            tone_hz: 440,
            audio_frame: Duration::from_millis(10),
        }
    }
}

/// Engine configuration options
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Inputs attached to muxers
    pub muxer_input: InputConfig,

    /// Pulled URL streams
    pub url_input: InputConfig,

    /// Base settings for RTMP sinks; requests override rate and GOP fields
    pub sink: SinkConfig,

    /// Blank canvases suppressed by new muxers
    pub blank_frame_threshold: u64,

    /// Per-input audio backlog kept when mixing
    pub audio_latest_limit: usize,

    pub canvas: CanvasConfig,

    /// Time new inputs get to receive data before replacing a muxer's inputs
    pub replace_settle: Duration,

    /// Highest port a peer connection may be restricted to
    pub max_peer_port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            muxer_input: InputConfig::default(),
            url_input: InputConfig::default().native_rate(true).resample(false),
            sink: SinkConfig::default(),
            blank_frame_threshold: DEFAULT_BLANK_FRAME_THRESHOLD,
            audio_latest_limit: 20,
            canvas: CanvasConfig::default(),
            replace_settle: Duration::from_millis(500),
            max_peer_port: u16::MAX,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(mut self, sink: SinkConfig) -> Self {
        self.sink = sink;
        self
    }

    pub fn blank_frame_threshold(mut self, frames: u64) -> Self {
        self.blank_frame_threshold = frames;
        self
    }

    pub fn replace_settle(mut self, settle: Duration) -> Self {
        self.replace_settle = settle;
        self
    }

    pub fn canvas(mut self, canvas: CanvasConfig) -> Self {
        self.canvas = canvas;
        self
    }

    pub fn muxer_input(mut self, input: InputConfig) -> Self {
        self.muxer_input = input;
        self
    }

    pub fn url_input(mut self, input: InputConfig) -> Self {
        self.url_input = input;
        self
    }
}
