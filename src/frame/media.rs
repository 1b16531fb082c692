//! Decoded frames

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::{
    Codec, MediaPacket, PixelFormat, SampleFormat, StreamKind, AUDIO_FRAME_SAMPLES,
    CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE,
};

/// Frames are shared between producers and every subscribed sink
pub type SharedFrame = Arc<MediaFrame>;

/// One picture plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Bytes,
    /// Bytes per row, at least the plane width
    pub stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Bytes>, stride: usize) -> Self {
        Self {
            data: data.into(),
            stride,
        }
    }
}

/// A decoded picture plus its compositing position
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<Plane>,
    /// Horizontal offset on the canvas
    pub x: i32,
    /// Vertical offset on the canvas
    pub y: i32,
    /// Stacking order, higher is drawn later
    pub z: i32,
}

impl VideoFrame {
    /// Bytes of row `y` of plane `index`, trimmed to the plane width.
    ///
    /// Returns an empty slice when the row is out of range.
    pub fn row(&self, index: usize, y: usize) -> &[u8] {
        let Some(plane) = self.planes.get(index) else {
            return &[];
        };
        let (width, _) = self.format.plane_size(index, self.width, self.height);
        let start = y * plane.stride;
        let end = start + width;
        if end > plane.data.len() {
            return &[];
        }
        &plane.data[start..end]
    }

    /// Copy with a new compositing position
    pub fn positioned(&self, x: i32, y: i32, z: i32) -> VideoFrame {
        VideoFrame {
            x,
            y,
            z,
            ..self.clone()
        }
    }

    /// Check that every plane holds enough bytes for the declared size
    pub fn is_valid(&self) -> bool {
        self.planes.len() == self.format.plane_count()
            && self.planes.iter().enumerate().all(|(i, p)| {
                let (w, h) = self.format.plane_size(i, self.width, self.height);
                p.stride >= w && (h == 0 || p.data.len() >= p.stride * (h - 1) + w)
            })
    }
}

/// Mutable, tightly packed picture used while drawing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<Vec<u8>>,
}

impl Picture {
    /// Zero-initialized picture
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let planes = (0..format.plane_count())
            .map(|i| {
                let (w, h) = format.plane_size(i, width, height);
                vec![0u8; w * h]
            })
            .collect();
        Self {
            width,
            height,
            format,
            planes,
        }
    }

    /// Planar picture filled with one YUV color.
    ///
    /// `alpha` selects `Yuva420p` with that alpha value, otherwise `Yuv420p`.
    pub fn filled(width: u32, height: u32, yuv: [u8; 3], alpha: Option<u8>) -> Self {
        let format = if alpha.is_some() {
            PixelFormat::Yuva420p
        } else {
            PixelFormat::Yuv420p
        };
        let mut pic = Self::new(width, height, format);
        for (i, plane) in pic.planes.iter_mut().enumerate() {
            let value = if i < 3 { yuv[i] } else { alpha.unwrap_or(255) };
            plane.fill(value);
        }
        pic
    }

    /// Bytes per row of plane `index`
    pub fn stride(&self, index: usize) -> usize {
        self.format.plane_size(index, self.width, self.height).0
    }

    pub fn from_frame(frame: &VideoFrame) -> Self {
        let planes = (0..frame.format.plane_count())
            .map(|i| {
                let (_, h) = frame.format.plane_size(i, frame.width, frame.height);
                let mut plane = Vec::new();
                for y in 0..h {
                    plane.extend_from_slice(frame.row(i, y));
                }
                plane
            })
            .collect();
        Self {
            width: frame.width,
            height: frame.height,
            format: frame.format,
            planes,
        }
    }

    pub fn into_frame(self) -> VideoFrame {
        let format = self.format;
        let (width, height) = (self.width, self.height);
        let planes = self
            .planes
            .into_iter()
            .enumerate()
            .map(|(i, data)| Plane::new(data, format.plane_size(i, width, height).0))
            .collect();
        VideoFrame {
            width,
            height,
            format,
            planes,
            x: 0,
            y: 0,
            z: 0,
        }
    }
}

/// A block of PCM samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    /// Samples per channel
    pub nb_samples: usize,
    /// One buffer when interleaved, one per channel when planar
    pub data: Vec<Bytes>,
}

impl AudioFrame {
    /// Interleaved S16 frame from native-endian samples
    pub fn from_s16(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        let mut buf = BytesMut::with_capacity(samples.len() * 2);
        for s in samples {
            buf.put_i16_le(*s);
        }
        Self {
            sample_rate,
            channels,
            format: SampleFormat::S16,
            nb_samples: samples.len() / channels.max(1) as usize,
            data: vec![buf.freeze()],
        }
    }

    /// One canonical frame of silence
    pub fn silent() -> Self {
        let samples = vec![0i16; AUDIO_FRAME_SAMPLES * CANONICAL_CHANNELS as usize];
        Self::from_s16(&samples, CANONICAL_SAMPLE_RATE, CANONICAL_CHANNELS)
    }

    /// S16, stereo, 48 kHz interleaved
    pub fn is_canonical(&self) -> bool {
        self.format == SampleFormat::S16
            && self.channels == CANONICAL_CHANNELS
            && self.sample_rate == CANONICAL_SAMPLE_RATE
    }

    /// Interleaved S16 samples, `None` for any other layout
    pub fn s16_samples(&self) -> Option<Vec<i16>> {
        if self.format != SampleFormat::S16 {
            return None;
        }
        let data = self.data.first()?;
        Some(
            data.chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect(),
        )
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.nb_samples as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// Frame contents
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Video(VideoFrame),
    Audio(AudioFrame),
    /// Compressed packet passed through untouched
    Raw(MediaPacket),
}

/// One decoded unit
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFrame {
    pub codec: Codec,
    /// Presentation timestamp in milliseconds
    pub pts: i64,
    pub payload: FramePayload,
}

impl MediaFrame {
    pub fn video(codec: Codec, pts: i64, frame: VideoFrame) -> Self {
        Self {
            codec,
            pts,
            payload: FramePayload::Video(frame),
        }
    }

    pub fn audio(codec: Codec, pts: i64, frame: AudioFrame) -> Self {
        Self {
            codec,
            pts,
            payload: FramePayload::Audio(frame),
        }
    }

    pub fn raw(packet: MediaPacket) -> Self {
        Self {
            codec: packet.codec,
            pts: packet.pts,
            payload: FramePayload::Raw(packet),
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self.payload {
            FramePayload::Video(_) => StreamKind::Video,
            FramePayload::Audio(_) => StreamKind::Audio,
            FramePayload::Raw(_) => StreamKind::Raw,
        }
    }

    pub fn as_video(&self) -> Option<&VideoFrame> {
        match &self.payload {
            FramePayload::Video(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioFrame> {
        match &self.payload {
            FramePayload::Audio(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&MediaPacket> {
        match &self.payload {
            FramePayload::Raw(p) => Some(p),
            _ => None,
        }
    }

    /// Copy with a new timestamp; plane buffers are shared
    pub fn with_pts(&self, pts: i64) -> MediaFrame {
        MediaFrame {
            pts,
            ..self.clone()
        }
    }

    pub fn shared(self) -> SharedFrame {
        Arc::new(self)
    }
}
