//! Sink and sender configuration

use std::time::Duration;

use crate::codec::EncoderParams;
use crate::protocol::constants::PUBLISH_CHUNK_SIZE;

/// Copyright string written into `onMetaData`
pub const DEFAULT_COPYRIGHT: &str = "avmux:v1";

/// How packets are framed on the way out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Keep SPS/PPS inline instead of moving them to a sequence header
    pub keep_sps_pps: bool,
    /// Start codes instead of 4-byte lengths in front of each NAL unit
    pub annexb: bool,
    pub send_metadata: bool,
    pub copyright: String,
    pub chunk_size: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            keep_sps_pps: false,
            annexb: false,
            send_metadata: true,
            copyright: DEFAULT_COPYRIGHT.into(),
            chunk_size: PUBLISH_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
        }
    }
}

impl SenderConfig {
    /// Local FLV files carry parameter sets inline in Annex-B form and no
    /// metadata tag
    pub fn for_file(&self) -> Self {
        Self {
            keep_sps_pps: true,
            annexb: true,
            send_metadata: false,
            ..self.clone()
        }
    }

    pub fn send_metadata(mut self, enabled: bool) -> Self {
        self.send_metadata = enabled;
        self
    }

    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }
}

/// RTMP sink settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub video_kbps: u32,
    pub min_rate_kbps: u32,
    pub max_rate_kbps: u32,
    pub gop: u32,
    pub fps: u32,
    pub audio_kbps: u32,
    pub dont_reconnect: bool,
    /// Composited frames waiting for the encoders
    pub muxed_queue_depth: usize,
    /// Encoded packets waiting per stream kind
    pub packet_queue_depth: usize,
    /// Packets buffered across both kinds before sending starts
    pub send_backlog: usize,
    /// Pause between encode rounds
    pub idle_interval: Duration,
    pub sender: SenderConfig,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            video_kbps: 1000,
            min_rate_kbps: 0,
            max_rate_kbps: 0,
            gop: 50,
            fps: 25,
            audio_kbps: EncoderParams::DEFAULT_AUDIO_KBPS,
            dont_reconnect: false,
            muxed_queue_depth: 100,
            packet_queue_depth: 100,
            send_backlog: 8,
            idle_interval: Duration::from_millis(10),
            sender: SenderConfig::default(),
        }
    }
}

impl SinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero keeps the current value
    pub fn video_kbps(mut self, kbps: u32) -> Self {
        if kbps > 0 {
            self.video_kbps = kbps;
        }
        self
    }

    pub fn rate_limits_kbps(mut self, min: u32, max: u32) -> Self {
        self.min_rate_kbps = min;
        self.max_rate_kbps = max;
        self
    }

    /// Zero keeps the current value
    pub fn gop(mut self, gop: u32) -> Self {
        if gop > 0 {
            self.gop = gop;
        }
        self
    }

    /// Zero keeps the current value
    pub fn fps(mut self, fps: u32) -> Self {
        if fps > 0 {
            self.fps = fps;
        }
        self
    }

    pub fn dont_reconnect(mut self, enabled: bool) -> Self {
        self.dont_reconnect = enabled;
        self
    }

    pub fn send_backlog(mut self, packets: usize) -> Self {
        self.send_backlog = packets;
        self
    }

    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn sender(mut self, sender: SenderConfig) -> Self {
        self.sender = sender;
        self
    }

    pub fn video_params(&self) -> EncoderParams {
        EncoderParams::video()
            .bitrate_kbps(self.video_kbps)
            .rate_limits_kbps(self.min_rate_kbps, self.max_rate_kbps)
            .gop(self.gop)
            .fps(self.fps)
            .global_header(!self.sender.keep_sps_pps)
    }

    pub fn audio_params(&self) -> EncoderParams {
        EncoderParams::audio().bitrate_kbps(self.audio_kbps)
    }
}
