//! Frame and packet model
//!
//! Decoded media travels through the engine as [`MediaFrame`]s shared behind
//! an `Arc`; compressed media as [`MediaPacket`]s.
//!
//! ```text
//!  source ──► MediaPacket ──► Decoder ──► MediaFrame ──► Input ──► AvMuxer
//!                                                                     │
//!   RtmpSender ◄── MediaPacket ◄── Encoder ◄── MediaFrame ◄── Output ◄┘
//! ```
//!
//! Plane buffers are `bytes::Bytes`, so restamping a frame's position or
//! timestamp clones only the handle and never touches what other holders see.

pub mod media;
pub mod packet;

pub use media::{AudioFrame, FramePayload, MediaFrame, Picture, Plane, SharedFrame, VideoFrame};
pub use packet::MediaPacket;

/// Canonical mixing sample rate
pub const CANONICAL_SAMPLE_RATE: u32 = 48_000;
/// Canonical mixing channel count
pub const CANONICAL_CHANNELS: u16 = 2;
/// Samples per channel in one canonical audio frame
pub const AUDIO_FRAME_SAMPLES: usize = 1024;

/// Largest picture width or height an input may be scaled to
pub const MAX_DIMENSION: u32 = 8192;

/// Stream kind carried by a frame or packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
    Raw,
}

/// Codec tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    Aac,
    Mp3,
    Opus,
    RawVideo,
    Pcm,
    Unknown,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::Aac => "aac",
            Codec::Mp3 => "mp3",
            Codec::Opus => "opus",
            Codec::RawVideo => "rawvideo",
            Codec::Pcm => "pcm",
            Codec::Unknown => "unknown",
        }
    }

    pub fn kind(&self) -> Option<StreamKind> {
        match self {
            Codec::H264 | Codec::RawVideo => Some(StreamKind::Video),
            Codec::Aac | Codec::Mp3 | Codec::Opus | Codec::Pcm => Some(StreamKind::Audio),
            Codec::Unknown => None,
        }
    }
}

/// Pixel layout of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar Y, U, V with 2x2 chroma subsampling
    Yuv420p,
    /// Yuv420p plus a full-resolution alpha plane
    Yuva420p,
    Rgba,
    Argb,
    Bgra,
    Abgr,
}

impl PixelFormat {
    /// Number of planes in the layout
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::Yuv420p => 3,
            PixelFormat::Yuva420p => 4,
            _ => 1,
        }
    }

    pub fn has_alpha(&self) -> bool {
        !matches!(self, PixelFormat::Yuv420p)
    }

    /// Packed 32-bit RGB variant
    pub fn is_packed_rgb(&self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba | PixelFormat::Argb | PixelFormat::Bgra | PixelFormat::Abgr
        )
    }

    /// Byte offsets of (R, G, B, A) inside one packed pixel
    pub fn rgba_offsets(&self) -> Option<[usize; 4]> {
        match self {
            PixelFormat::Rgba => Some([0, 1, 2, 3]),
            PixelFormat::Argb => Some([1, 2, 3, 0]),
            PixelFormat::Bgra => Some([2, 1, 0, 3]),
            PixelFormat::Abgr => Some([3, 2, 1, 0]),
            _ => None,
        }
    }

    /// Width in bytes and height in rows of plane `index` for a `width` x `height` picture
    pub fn plane_size(&self, index: usize, width: u32, height: u32) -> (usize, usize) {
        let (w, h) = (width as usize, height as usize);
        match (self, index) {
            (PixelFormat::Yuv420p | PixelFormat::Yuva420p, 1 | 2) => ((w + 1) / 2, (h + 1) / 2),
            (PixelFormat::Yuv420p | PixelFormat::Yuva420p, _) => (w, h),
            _ => (w * 4, h),
        }
    }
}

/// PCM sample layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    S16p,
    F32p,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 | SampleFormat::S16p => 2,
            SampleFormat::S32 | SampleFormat::F32 | SampleFormat::F32p => 4,
        }
    }

    pub fn is_planar(&self) -> bool {
        matches!(self, SampleFormat::S16p | SampleFormat::F32p)
    }
}
