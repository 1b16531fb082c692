//! Built-in uncompressed codecs
//!
//! PCM S16LE and packed raw pictures need no codec library. Everything else
//! is reported as unavailable so the host can plug in a real backend.

use bytes::{Bytes, BytesMut};

use super::{CodecFactory, DecoderBackend, DecoderParams, EncoderBackend, EncoderParams, SendStatus};
use crate::error::{CodecError, MediaError, Result};
use crate::frame::{
    AudioFrame, Codec, FramePayload, MediaFrame, MediaPacket, PixelFormat, Plane, SampleFormat,
    VideoFrame, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct RawCodecFactory;

impl CodecFactory for RawCodecFactory {
    fn open_decoder(&self, params: &DecoderParams) -> Result<Box<dyn DecoderBackend>> {
        match params.codec {
            Codec::Pcm => Ok(Box::new(PcmDecoder {
                sample_rate: nonzero(params.sample_rate, CANONICAL_SAMPLE_RATE),
                channels: if params.channels == 0 { CANONICAL_CHANNELS } else { params.channels },
                pending: None,
            })),
            Codec::RawVideo => Ok(Box::new(RawVideoDecoder { pending: None })),
            other => Err(CodecError::Unavailable(format!("{} decoder", other.name())).into()),
        }
    }

    fn open_encoder(&self, params: &EncoderParams) -> Result<Box<dyn EncoderBackend>> {
        match params.codec {
            Codec::Pcm | Codec::RawVideo => Ok(Box::new(PassthroughEncoder { pending: None })),
            other => Err(CodecError::Unavailable(format!("{} encoder", other.name())).into()),
        }
    }
}

fn nonzero(value: u32, default: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value
    }
}

struct PcmDecoder {
    sample_rate: u32,
    channels: u16,
    pending: Option<MediaFrame>,
}

impl DecoderBackend for PcmDecoder {
    fn send_packet(&mut self, packet: &MediaPacket) -> Result<SendStatus> {
        if self.pending.is_some() {
            return Ok(SendStatus::Again);
        }
        let sample_rate = nonzero(packet.sample_rate, self.sample_rate);
        let channels = if packet.channels == 0 { self.channels } else { packet.channels };
        let bytes_per_frame = 2 * channels as usize;
        let usable = packet.data.len() - packet.data.len() % bytes_per_frame;
        let frame = AudioFrame {
            sample_rate,
            channels,
            format: SampleFormat::S16,
            nb_samples: usable / bytes_per_frame,
            data: vec![packet.data.slice(..usable)],
        };
        self.pending = Some(MediaFrame::audio(Codec::Pcm, packet.pts, frame));
        Ok(SendStatus::Accepted)
    }

    fn receive_frame(&mut self) -> Result<Option<MediaFrame>> {
        Ok(self.pending.take())
    }
}

/// Tightly packed `Yuv420p` or `Rgba`, told apart by payload size
struct RawVideoDecoder {
    pending: Option<MediaFrame>,
}

impl DecoderBackend for RawVideoDecoder {
    fn send_packet(&mut self, packet: &MediaPacket) -> Result<SendStatus> {
        if self.pending.is_some() {
            return Ok(SendStatus::Again);
        }
        let (w, h) = (packet.width, packet.height);
        let format = if packet.data.len() == PixelFormat::Rgba.plane_size(0, w, h).0 * h as usize {
            PixelFormat::Rgba
        } else {
            PixelFormat::Yuv420p
        };

        let mut planes = Vec::with_capacity(format.plane_count());
        let mut offset = 0;
        for i in 0..format.plane_count() {
            let (bw, rows) = format.plane_size(i, w, h);
            let end = offset + bw * rows;
            if w == 0 || h == 0 || end > packet.data.len() {
                return Err(MediaError::InvalidFrame(format!(
                    "raw picture {}x{} with {} bytes",
                    w,
                    h,
                    packet.data.len()
                ))
                .into());
            }
            planes.push(Plane::new(packet.data.slice(offset..end), bw));
            offset = end;
        }

        let frame = VideoFrame {
            width: w,
            height: h,
            format,
            planes,
            x: 0,
            y: 0,
            z: 0,
        };
        self.pending = Some(MediaFrame::video(Codec::RawVideo, packet.pts, frame));
        Ok(SendStatus::Accepted)
    }

    fn receive_frame(&mut self) -> Result<Option<MediaFrame>> {
        Ok(self.pending.take())
    }
}

/// Emits frames as uncompressed packets
struct PassthroughEncoder {
    pending: Option<MediaPacket>,
}

impl EncoderBackend for PassthroughEncoder {
    fn send_frame(&mut self, frame: &MediaFrame) -> Result<SendStatus> {
        if self.pending.is_some() {
            return Ok(SendStatus::Again);
        }
        let packet = match &frame.payload {
            FramePayload::Video(video) => {
                MediaPacket::video(Codec::RawVideo, frame.pts, frame.pts, pack_picture(video))
                    .keyframe(true)
                    .dimensions(video.width, video.height)
            }
            FramePayload::Audio(audio) => {
                let data = audio.data.first().cloned().unwrap_or_default();
                MediaPacket::audio(Codec::Pcm, frame.pts, data).audio_params(audio.sample_rate, audio.channels)
            }
            FramePayload::Raw(packet) => packet.clone(),
        };
        self.pending = Some(packet);
        Ok(SendStatus::Accepted)
    }

    fn receive_packet(&mut self) -> Result<Option<MediaPacket>> {
        Ok(self.pending.take())
    }
}

fn pack_picture(frame: &VideoFrame) -> Bytes {
    let mut buf = BytesMut::new();
    for i in 0..frame.format.plane_count() {
        let (_, rows) = frame.format.plane_size(i, frame.width, frame.height);
        for y in 0..rows {
            buf.extend_from_slice(frame.row(i, y));
        }
    }
    buf.freeze()
}
