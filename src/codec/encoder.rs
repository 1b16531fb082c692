//! Lazy encoder
//!
//! Video encoders are reopened whenever the input resolution changes. Audio
//! encoders that require a fixed frame size are fed from a carry-over
//! buffer, so callers can hand in frames of any length. Encoded H.264
//! packets pick up one pending SEI payload each from the [`SeiQueues`]
//! table.

use std::sync::Arc;

use bytes::Bytes;

use super::{CodecFactory, EncoderBackend, EncoderParams, SeiQueues, SendStatus};
use crate::error::{MediaError, Result};
use crate::frame::{AudioFrame, Codec, FramePayload, MediaFrame, MediaPacket};

pub struct Encoder {
    factory: Arc<dyn CodecFactory>,
    params: EncoderParams,
    backend: Option<Box<dyn EncoderBackend>>,
    opened_size: (u32, u32),
    sei: Option<Arc<SeiQueues>>,
    sei_key: Option<String>,
    /// Interleaved S16 samples not yet handed to a fixed-size encoder
    carry: Vec<i16>,
    /// PTS of the first sample in `carry`
    carry_pts: f64,
    key_frame_pending: bool,
}

impl Encoder {
    pub fn new(factory: Arc<dyn CodecFactory>, params: EncoderParams) -> Self {
        Self {
            factory,
            params,
            backend: None,
            opened_size: (0, 0),
            sei: None,
            sei_key: None,
            carry: Vec::new(),
            carry_pts: 0.0,
            key_frame_pending: false,
        }
    }

    pub fn with_sei(mut self, table: Arc<SeiQueues>) -> Self {
        self.sei = Some(table);
        self
    }

    pub fn set_sei_key(&mut self, key: Option<String>) {
        self.sei_key = key;
    }

    pub fn params(&self) -> &EncoderParams {
        &self.params
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn extradata(&self) -> Option<Bytes> {
        self.backend.as_ref().and_then(|b| b.extradata())
    }

    /// Ask for an IDR on the next video frame
    pub fn request_key_frame(&mut self) {
        self.key_frame_pending = true;
    }

    /// Encode `frame`, handing every produced packet to `on_packet`.
    ///
    /// An error returned by `on_packet` aborts encoding and is propagated.
    pub fn encode(
        &mut self,
        frame: &MediaFrame,
        mut on_packet: impl FnMut(MediaPacket) -> Result<()>,
    ) -> Result<()> {
        match &frame.payload {
            FramePayload::Video(video) => {
                let size = (video.width, video.height);
                if self.backend.is_none() || self.opened_size != size {
                    self.params = self.params.clone().dimensions(size.0, size.1);
                    self.open()?;
                    self.opened_size = size;
                }
                let sei = self.sei_source();
                let Some(backend) = self.backend.as_mut() else {
                    return Ok(());
                };
                if std::mem::take(&mut self.key_frame_pending) {
                    backend.request_key_frame();
                }
                send_and_drain(&mut **backend, frame, sei, &mut on_packet)
            }
            FramePayload::Audio(audio) => {
                if self.backend.is_none() {
                    self.open()?;
                }
                self.encode_audio(frame.pts, audio, &mut on_packet)
            }
            FramePayload::Raw(_) => Ok(()),
        }
    }

    fn encode_audio(
        &mut self,
        pts: i64,
        audio: &AudioFrame,
        on_packet: &mut impl FnMut(MediaPacket) -> Result<()>,
    ) -> Result<()> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(());
        };
        let frame_size = backend.frame_size();
        if frame_size == 0 {
            let frame = MediaFrame::audio(Codec::Pcm, pts, audio.clone());
            return send_and_drain(&mut **backend, &frame, None, on_packet);
        }

        let samples = audio
            .s16_samples()
            .ok_or_else(|| MediaError::InvalidFrame("encoder expects interleaved S16".into()))?;
        if self.carry.is_empty() {
            self.carry_pts = pts as f64;
        }
        self.carry.extend_from_slice(&samples);

        let channels = audio.channels.max(1);
        let chunk = frame_size * channels as usize;
        let step = frame_size as f64 * 1000.0 / audio.sample_rate.max(1) as f64;
        while self.carry.len() >= chunk {
            let part: Vec<i16> = self.carry.drain(..chunk).collect();
            let frame = MediaFrame::audio(
                Codec::Pcm,
                self.carry_pts.round() as i64,
                AudioFrame::from_s16(&part, audio.sample_rate, channels),
            );
            self.carry_pts += step;
            send_and_drain(&mut **backend, &frame, None, on_packet)?;
        }
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        self.backend = None;
        let backend = self.factory.open_encoder(&self.params)?;
        tracing::info!(
            codec = self.params.codec.name(),
            width = self.params.width,
            height = self.params.height,
            kbps = self.params.bitrate_kbps,
            "Encoder opened"
        );
        self.backend = Some(backend);
        Ok(())
    }

    fn sei_source(&self) -> Option<(Arc<SeiQueues>, String)> {
        if self.params.codec != Codec::H264 {
            return None;
        }
        Some((self.sei.clone()?, self.sei_key.clone()?))
    }
}

fn send_and_drain(
    backend: &mut dyn EncoderBackend,
    frame: &MediaFrame,
    sei: Option<(Arc<SeiQueues>, String)>,
    on_packet: &mut impl FnMut(MediaPacket) -> Result<()>,
) -> Result<()> {
    loop {
        let status = backend.send_frame(frame)?;
        while let Some(mut packet) = backend.receive_packet()? {
            if let Some((table, key)) = &sei {
                if let Some(payload) = table.pop(key) {
                    packet.append_sei(&payload);
                }
            }
            on_packet(packet)?;
        }
        if status == SendStatus::Accepted {
            return Ok(());
        }
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("codec", &self.params.codec)
            .field("open", &self.backend.is_some())
            .field("sei_key", &self.sei_key)
            .finish()
    }
}
