//! Scriptable codec backends for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::{
    CodecFactory, DecoderBackend, DecoderParams, EncoderBackend, EncoderParams, RawCodecFactory,
    SendStatus,
};
use crate::error::{CodecError, Result};
use crate::frame::{Codec, FramePayload, MediaFrame, MediaPacket};
use crate::media::aac;

pub(crate) const SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1f, 0xe9];
pub(crate) const PPS: &[u8] = &[0x68, 0xce, 0x38, 0x80];

/// Fake H.264 / AAC encoders; decoding falls back to the raw codecs
#[derive(Debug, Default)]
pub(crate) struct MockCodecFactory {
    encoders: AtomicUsize,
    fail_open: AtomicBool,
}

impl MockCodecFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn encoders_opened(&self) -> usize {
        self.encoders.load(Ordering::SeqCst)
    }

    pub(crate) fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }
}

impl CodecFactory for MockCodecFactory {
    fn open_decoder(&self, params: &DecoderParams) -> Result<Box<dyn DecoderBackend>> {
        RawCodecFactory.open_decoder(params)
    }

    fn open_encoder(&self, params: &EncoderParams) -> Result<Box<dyn EncoderBackend>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CodecError::OpenFailed("mock".into()).into());
        }
        self.encoders.fetch_add(1, Ordering::SeqCst);
        match params.codec {
            Codec::H264 => Ok(Box::new(MockH264 {
                pending: VecDeque::new(),
                count: 0,
                key_requested: true,
            })),
            Codec::Aac => Ok(Box::new(MockAac {
                pending: VecDeque::new(),
                sample_rate: params.sample_rate,
                channels: params.channels,
            })),
            other => RawCodecFactory.open_encoder(&params.clone().codec(other)),
        }
    }
}

struct MockH264 {
    pending: VecDeque<MediaPacket>,
    count: u8,
    key_requested: bool,
}

fn annexb(nals: &[&[u8]]) -> Bytes {
    let mut buf = BytesMut::new();
    for nal in nals {
        buf.put_slice(&[0, 0, 0, 1]);
        buf.put_slice(nal);
    }
    buf.freeze()
}

impl EncoderBackend for MockH264 {
    fn send_frame(&mut self, frame: &MediaFrame) -> Result<SendStatus> {
        if !self.pending.is_empty() {
            return Ok(SendStatus::Again);
        }
        let FramePayload::Video(video) = &frame.payload else {
            return Err(CodecError::SendFailed("not video".into()).into());
        };
        self.count = self.count.wrapping_add(1);
        let key = std::mem::take(&mut self.key_requested);
        let data = if key {
            annexb(&[SPS, PPS, &[0x65, 0x88, self.count][..]])
        } else {
            annexb(&[&[0x41, 0x9a, self.count][..]])
        };
        self.pending.push_back(
            MediaPacket::video(Codec::H264, frame.pts, frame.pts, data)
                .keyframe(key)
                .dimensions(video.width, video.height),
        );
        Ok(SendStatus::Accepted)
    }

    fn receive_packet(&mut self) -> Result<Option<MediaPacket>> {
        Ok(self.pending.pop_front())
    }

    fn request_key_frame(&mut self) {
        self.key_requested = true;
    }
}

struct MockAac {
    pending: VecDeque<MediaPacket>,
    sample_rate: u32,
    channels: u16,
}

impl EncoderBackend for MockAac {
    fn frame_size(&self) -> usize {
        1024
    }

    fn send_frame(&mut self, frame: &MediaFrame) -> Result<SendStatus> {
        if frame.as_audio().map(|a| a.nb_samples) != Some(1024) {
            return Err(CodecError::SendFailed("AAC needs 1024 samples".into()).into());
        }
        let payload = [0x21u8, 0x10, 0x04];
        let mut data = BytesMut::new();
        let sf_index = aac::sampling_frequency_index(self.sample_rate).unwrap_or(aac::SF_INDEX_44100);
        data.put_slice(&aac::adts_header(aac::OBJECT_TYPE_LC, sf_index, self.channels as u8, payload.len()));
        data.put_slice(&payload);
        self.pending.push_back(
            MediaPacket::audio(Codec::Aac, frame.pts, data.freeze())
                .audio_params(self.sample_rate, self.channels),
        );
        Ok(SendStatus::Accepted)
    }

    fn receive_packet(&mut self) -> Result<Option<MediaPacket>> {
        Ok(self.pending.pop_front())
    }
}
