//! Codec seams
//!
//! Actual compression lives behind [`CodecFactory`]; the engine only drives
//! the push/pull protocol:
//!
//! ```text
//!   MediaPacket ──► DecoderBackend::send_packet ──► receive_frame* ──► MediaFrame
//!   MediaFrame  ──► EncoderBackend::send_frame  ──► receive_packet* ──► MediaPacket
//! ```
//!
//! Both directions report [`SendStatus::Again`] when the backend must be
//! drained before it accepts more input.

pub mod decoder;
pub mod encoder;
pub mod raw;
pub mod sei;

#[cfg(test)]
pub(crate) mod mock;

use bytes::Bytes;

use crate::error::Result;
use crate::frame::{Codec, MediaFrame, MediaPacket, SampleFormat, StreamKind};

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use raw::RawCodecFactory;
pub use sei::SeiQueues;

/// Outcome of feeding a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Accepted,
    /// Output must be drained before this input is accepted
    Again,
}

/// Parameters for opening a decoder, taken from the first packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderParams {
    pub codec: Codec,
    pub extradata: Option<Bytes>,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecoderParams {
    pub fn from_packet(packet: &MediaPacket) -> Self {
        Self {
            codec: packet.codec,
            extradata: packet.extradata.clone(),
            width: packet.width,
            height: packet.height,
            sample_rate: packet.sample_rate,
            channels: packet.channels,
        }
    }
}

/// Rate-control buffer settings for constant bitrate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBuffer {
    pub size: u64,
    pub initial_occupancy: u64,
    pub tolerance: u64,
}

/// Parameters for opening an encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderParams {
    pub kind: StreamKind,
    pub codec: Codec,
    pub bitrate_kbps: u32,
    pub min_rate_kbps: u32,
    pub max_rate_kbps: u32,
    pub gop: u32,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub qmin: u32,
    pub qmax: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    /// Emit codec config as extradata instead of in-band
    pub global_header: bool,
}

impl EncoderParams {
    pub const DEFAULT_VIDEO_KBPS: u32 = 800;
    pub const DEFAULT_AUDIO_KBPS: u32 = 128;

    /// H.264 defaults
    pub fn video() -> Self {
        Self {
            kind: StreamKind::Video,
            codec: Codec::H264,
            bitrate_kbps: Self::DEFAULT_VIDEO_KBPS,
            min_rate_kbps: 0,
            max_rate_kbps: 0,
            gop: 0,
            fps: 25,
            width: 0,
            height: 0,
            qmin: 10,
            qmax: 51,
            sample_rate: 0,
            channels: 0,
            sample_format: SampleFormat::S16,
            global_header: false,
        }
    }

    /// AAC-LC defaults on canonical audio
    pub fn audio() -> Self {
        Self {
            kind: StreamKind::Audio,
            codec: Codec::Aac,
            bitrate_kbps: Self::DEFAULT_AUDIO_KBPS,
            sample_rate: crate::frame::CANONICAL_SAMPLE_RATE,
            channels: crate::frame::CANONICAL_CHANNELS,
            ..Self::video()
        }
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Zero keeps the default for the stream kind
    pub fn bitrate_kbps(mut self, kbps: u32) -> Self {
        if kbps > 0 {
            self.bitrate_kbps = kbps;
        }
        self
    }

    pub fn rate_limits_kbps(mut self, min: u32, max: u32) -> Self {
        self.min_rate_kbps = min;
        self.max_rate_kbps = max;
        self
    }

    pub fn gop(mut self, gop: u32) -> Self {
        self.gop = gop;
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        if fps > 0 {
            self.fps = fps;
        }
        self
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn global_header(mut self, enabled: bool) -> Self {
        self.global_header = enabled;
        self
    }

    pub fn bitrate(&self) -> u64 {
        self.bitrate_kbps as u64 * 1000
    }

    /// Fixed rate buffer when min, max and target bitrate coincide
    pub fn rate_buffer(&self) -> Option<RateBuffer> {
        let rate = self.bitrate_kbps;
        if rate == 0 || self.min_rate_kbps != rate || self.max_rate_kbps != rate {
            return None;
        }
        let size = self.bitrate();
        Some(RateBuffer {
            size,
            initial_occupancy: size * 3 / 4,
            tolerance: size,
        })
    }
}

pub trait DecoderBackend: Send {
    fn send_packet(&mut self, packet: &MediaPacket) -> Result<SendStatus>;

    /// Next decoded frame, `None` when more input is needed
    fn receive_frame(&mut self) -> Result<Option<MediaFrame>>;
}

pub trait EncoderBackend: Send {
    /// Samples per channel the encoder consumes per frame; 0 accepts any size
    fn frame_size(&self) -> usize {
        0
    }

    /// Codec configuration record, when the codec has one
    fn extradata(&self) -> Option<Bytes> {
        None
    }

    fn send_frame(&mut self, frame: &MediaFrame) -> Result<SendStatus>;

    /// Next encoded packet, `None` when more input is needed
    fn receive_packet(&mut self) -> Result<Option<MediaPacket>>;

    fn request_key_frame(&mut self) {}
}

/// Opens codec backends
pub trait CodecFactory: Send + Sync {
    fn open_decoder(&self, params: &DecoderParams) -> Result<Box<dyn DecoderBackend>>;

    fn open_encoder(&self, params: &EncoderParams) -> Result<Box<dyn EncoderBackend>>;
}
