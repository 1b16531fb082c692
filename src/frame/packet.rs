//! Compressed packets

use bytes::{Bytes, BytesMut};

use super::{Codec, StreamKind};

/// One compressed unit
///
/// Timestamps are milliseconds; negative values are clamped to zero on
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub kind: StreamKind,
    pub codec: Codec,
    pub pts: i64,
    pub dts: i64,
    pub data: Bytes,
    /// Codec configuration (AVCDecoderConfigurationRecord, AudioSpecificConfig)
    pub extradata: Option<Bytes>,
    pub keyframe: bool,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// Trailing bytes of `data` appended from the SEI side channel
    pub sei_len: usize,
}

impl MediaPacket {
    pub fn new(kind: StreamKind, codec: Codec, pts: i64, dts: i64, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            codec,
            pts: pts.max(0),
            dts: dts.max(0),
            data: data.into(),
            extradata: None,
            keyframe: false,
            width: 0,
            height: 0,
            sample_rate: 0,
            channels: 0,
            sei_len: 0,
        }
    }

    pub fn video(codec: Codec, pts: i64, dts: i64, data: impl Into<Bytes>) -> Self {
        Self::new(StreamKind::Video, codec, pts, dts, data)
    }

    pub fn audio(codec: Codec, pts: i64, data: impl Into<Bytes>) -> Self {
        Self::new(StreamKind::Audio, codec, pts, pts, data)
    }

    pub fn keyframe(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }

    pub fn extradata(mut self, extradata: impl Into<Bytes>) -> Self {
        self.extradata = Some(extradata.into());
        self
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn audio_params(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    /// Composition offset (pts - dts)
    pub fn composition_time(&self) -> i64 {
        self.pts - self.dts
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Append an already framed side-channel payload
    pub fn append_sei(&mut self, payload: &[u8]) {
        let mut buf = BytesMut::with_capacity(self.data.len() + payload.len());
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(payload);
        self.data = buf.freeze();
        self.sei_len += payload.len();
    }

    /// `data` split into encoder output and appended side-channel bytes
    pub fn split_sei(&self) -> (Bytes, Bytes) {
        let at = self.data.len() - self.sei_len.min(self.data.len());
        (self.data.slice(..at), self.data.slice(at..))
    }
}
