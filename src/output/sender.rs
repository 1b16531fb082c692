//! Packet sender
//!
//! Turns encoded packets into FLV tag bodies and writes them to a
//! [`TagTransport`], connecting on the first send.
//!
//! ```text
//! Disconnected ──send──► Connecting ──ok──► Connected ◄──► Sending
//!      ▲                     │                  │
//!      └──────── error ──────┴──────────────────┘
//! ```
//!
//! A sender that has been connected once never silently starts a fresh
//! stream: with `dont_reconnect` further packets are discarded, and once the
//! H.264 sequence header went out a reconnect is refused.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::amf::AmfObject;
use crate::error::{ProtocolError, Result};
use crate::frame::{Codec, MediaPacket, StreamKind};
use crate::media::aac::{self, AdtsHeader};
use crate::media::flv::{self, SoundFormat, AVC_INTERFRAME, AVC_KEYFRAME};
use crate::media::h264::{self, AvcConfig, NaluType};
use crate::media::FlvTag;
use crate::protocol::message;
use crate::stats::ByteCounter;
use crate::stream::{SinkStatus, StatusObserver};

use super::config::SenderConfig;
use super::transport::{TagTransport, TransportFactory};

const AAC_SEQUENCE_HEADER: u8 = 0x00;
const AAC_RAW: u8 = 0x01;
const AVC_SEQUENCE_HEADER: u8 = 0x00;
const AVC_NALU: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Disconnected,
    Connecting,
    Connected,
    Sending,
}

pub struct RtmpSender {
    url: String,
    config: SenderConfig,
    transports: Arc<dyn TransportFactory>,
    transport: Option<Box<dyn TagTransport>>,
    state: SenderState,
    has_connected: bool,
    dont_reconnect: bool,
    h264_config_sent: bool,
    aac_config_sent: bool,
    video_meta_sent: bool,
    audio_meta_sent: bool,
    metadata: AmfObject,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    bytes: Arc<ByteCounter>,
    observer: Option<(String, Arc<dyn StatusObserver>)>,
}

impl RtmpSender {
    pub fn new(url: impl Into<String>, config: SenderConfig, transports: Arc<dyn TransportFactory>) -> Self {
        let metadata = AmfObject::new().with("copyright", config.copyright.as_str());
        Self {
            url: url.into(),
            config,
            transports,
            transport: None,
            state: SenderState::Disconnected,
            has_connected: false,
            dont_reconnect: false,
            h264_config_sent: false,
            aac_config_sent: false,
            video_meta_sent: false,
            audio_meta_sent: false,
            metadata,
            sps: None,
            pps: None,
            bytes: Arc::new(ByteCounter::new()),
            observer: None,
        }
    }

    /// Share a byte counter that outlives this sender
    pub fn with_counter(mut self, bytes: Arc<ByteCounter>) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn with_observer(mut self, sink_id: impl Into<String>, observer: Arc<dyn StatusObserver>) -> Self {
        self.observer = Some((sink_id.into(), observer));
        self
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_dont_reconnect(&mut self, enabled: bool) {
        self.dont_reconnect = enabled;
    }

    pub fn bytes_sent(&self) -> &Arc<ByteCounter> {
        &self.bytes
    }

    pub fn send(&mut self, packet: &MediaPacket) -> Result<()> {
        if self.transport.is_none() {
            if self.has_connected && self.dont_reconnect {
                return Ok(());
            }
            if self.has_connected && self.h264_config_sent {
                tracing::error!(url = %self.url, "Reconnect after the sequence header was sent");
                return Err(ProtocolError::ConfigAlreadySent.into());
            }
            self.connect()?;
        }

        if self.config.send_metadata {
            self.send_stream_metadata(packet)?;
        }

        match packet.codec {
            Codec::H264 => self.send_h264(packet),
            Codec::Aac => self.send_aac(packet),
            Codec::Mp3 => self.send_mp3(packet),
            other => {
                if matches!(packet.kind, StreamKind::Audio | StreamKind::Video) {
                    tracing::warn!(codec = other.name(), "Codec not supported by FLV, dropping");
                }
                Ok(())
            }
        }
    }

    fn connect(&mut self) -> Result<()> {
        self.state = SenderState::Connecting;
        let transport = match self.transports.open(&self.url, &self.config) {
            Ok(t) => t,
            Err(e) => {
                self.state = SenderState::Disconnected;
                tracing::error!(url = %self.url, error = %e, "Connect failed");
                self.notify(SinkStatus::Error(e.to_string()));
                return Err(e);
            }
        };
        if transport.is_file() {
            self.config = self.config.for_file();
        }
        self.bytes.add(transport.setup_bytes() as u64);
        self.transport = Some(transport);
        self.has_connected = true;
        self.state = SenderState::Connected;
        tracing::info!(url = %self.url, dont_reconnect = self.dont_reconnect, "Connection established");
        self.notify(SinkStatus::Connected);
        Ok(())
    }

    fn notify(&self, status: SinkStatus) {
        if let Some((id, observer)) = &self.observer {
            observer.on_status(id, status);
        }
    }

    fn write(&mut self, tag: FlvTag) -> Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(ProtocolError::NotConnected.into());
        };
        self.state = SenderState::Sending;
        match transport.write_tag(&tag) {
            Ok(n) => {
                self.bytes.add(n as u64);
                self.state = SenderState::Connected;
                Ok(())
            }
            Err(e) => {
                self.transport = None;
                self.state = SenderState::Disconnected;
                tracing::error!(url = %self.url, error = %e, "Send failed");
                self.notify(SinkStatus::Error(e.to_string()));
                Err(e)
            }
        }
    }

    fn send_stream_metadata(&mut self, packet: &MediaPacket) -> Result<()> {
        match packet.kind {
            StreamKind::Audio if !self.audio_meta_sent => {
                if packet.sample_rate > 0 {
                    self.metadata.insert("samplerate", packet.sample_rate);
                }
            }
            StreamKind::Video if !self.video_meta_sent => {
                if packet.width > 0 {
                    self.metadata.insert("width", packet.width);
                }
                if packet.height > 0 {
                    self.metadata.insert("height", packet.height);
                }
            }
            _ => return Ok(()),
        }
        self.write(FlvTag::script(message::metadata(self.metadata.clone())))?;
        match packet.kind {
            StreamKind::Audio => self.audio_meta_sent = true,
            _ => self.video_meta_sent = true,
        }
        Ok(())
    }

    fn send_aac(&mut self, packet: &MediaPacket) -> Result<()> {
        let adts = AdtsHeader::parse(&packet.data);
        if !self.aac_config_sent {
            let config = match adts {
                Some(h) => h.to_config(),
                None => {
                    tracing::warn!("AAC without ADTS header, using LC 44.1 kHz stereo");
                    aac::audio_specific_config(aac::OBJECT_TYPE_LC, aac::SF_INDEX_44100, aac::CHANNELS_STEREO)
                }
            };
            let body = [flv::aac_tag_header(), AAC_SEQUENCE_HEADER, config[0], config[1]];
            self.write(FlvTag::audio(0, Bytes::copy_from_slice(&body)))?;
            self.aac_config_sent = true;
        }

        let raw = aac::strip_adts(&packet.data);
        let mut body = BytesMut::with_capacity(raw.len() + 2);
        body.put_u8(flv::aac_tag_header());
        body.put_u8(AAC_RAW);
        body.put_slice(&raw);
        self.write(FlvTag::audio(timestamp(packet.pts), body.freeze()))
    }

    fn send_mp3(&mut self, packet: &MediaPacket) -> Result<()> {
        let header = flv::audio_tag_header(SoundFormat::Mp3, packet.sample_rate, packet.channels);
        let mut body = BytesMut::with_capacity(packet.data.len() + 1);
        body.put_u8(header);
        body.put_slice(&packet.data);
        self.write(FlvTag::audio(timestamp(packet.pts), body.freeze()))
    }

    fn send_h264(&mut self, packet: &MediaPacket) -> Result<()> {
        let (encoded, sei) = packet.split_sei();
        let nalus = h264::split_annexb(&encoded);
        if nalus.is_empty() && sei.is_empty() {
            tracing::warn!(pts = packet.pts, "No H.264 data in packet");
            return Ok(());
        }

        let mut data: Vec<&[u8]> = Vec::with_capacity(nalus.len());
        for nal in nalus {
            match NaluType::of(nal) {
                NaluType::Slice | NaluType::Idr => data.push(nal),
                NaluType::Sps | NaluType::Pps if self.config.keep_sps_pps => data.push(nal),
                NaluType::Sps => self.sps = Some(Bytes::copy_from_slice(nal)),
                NaluType::Pps => self.pps = Some(Bytes::copy_from_slice(nal)),
                // encoder SEI; side-channel payloads travel in `sei`
                NaluType::Sei => {}
                other => tracing::debug!(?other, "Dropping NAL unit"),
            }
        }

        if !self.h264_config_sent {
            if let (Some(sps), Some(pps)) = (self.sps.clone(), self.pps.clone()) {
                self.send_h264_config(&sps, &pps)?;
            }
        }

        let keyframe = data.iter().any(|nal| NaluType::of(nal) == NaluType::Idr);
        let nal_bytes = h264::join_nalus(&data, self.config.annexb);
        if nal_bytes.is_empty() && sei.is_empty() {
            return Ok(());
        }

        let cts = packet.composition_time().clamp(0, 0xFF_FFFF) as u32;
        let mut body = BytesMut::with_capacity(nal_bytes.len() + sei.len() + 5);
        body.put_u8(if keyframe { AVC_KEYFRAME } else { AVC_INTERFRAME });
        body.put_u8(AVC_NALU);
        body.put_slice(&cts.to_be_bytes()[1..]);
        body.put_slice(&nal_bytes);
        body.put_slice(&sei);
        self.write(FlvTag::video(timestamp(packet.dts), body.freeze()))
    }

    fn send_h264_config(&mut self, sps: &[u8], pps: &[u8]) -> Result<()> {
        let record = AvcConfig::build(sps, pps)?;
        let mut body = BytesMut::with_capacity(record.len() + 5);
        body.put_u8(AVC_KEYFRAME);
        body.put_u8(AVC_SEQUENCE_HEADER);
        body.put_slice(&[0, 0, 0]);
        body.put_slice(&record);
        tracing::info!(sps = sps.len(), pps = pps.len(), "Sending H.264 sequence header");
        self.write(FlvTag::video(0, body.freeze()))?;
        self.h264_config_sent = true;
        Ok(())
    }
}

fn timestamp(ms: i64) -> u32 {
    ms.clamp(0, u32::MAX as i64) as u32
}

impl std::fmt::Debug for RtmpSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtmpSender")
            .field("url", &self.url)
            .field("state", &self.state)
            .field("has_connected", &self.has_connected)
            .field("dont_reconnect", &self.dont_reconnect)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::amf::amf0;
    use crate::codec::mock::{PPS, SPS};
    use crate::error::Error;
    use crate::media::FlvTagType;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Records tags; fails writes while `fail` is set
    #[derive(Default)]
    pub(crate) struct MemoryTransports {
        pub(crate) tags: Mutex<Vec<FlvTag>>,
        pub(crate) fail: AtomicBool,
        pub(crate) opened: AtomicUsize,
        pub(crate) file: bool,
    }

    struct MemoryTransport(Arc<MemoryTransports>);

    impl TagTransport for MemoryTransport {
        fn write_tag(&mut self, tag: &FlvTag) -> Result<usize> {
            if self.0.fail.load(Ordering::SeqCst) {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
            }
            self.0.tags.lock().push(tag.clone());
            Ok(tag.data.len())
        }

        fn is_file(&self) -> bool {
            self.0.file
        }
    }

    impl TransportFactory for Arc<MemoryTransports> {
        fn open(&self, _url: &str, _config: &SenderConfig) -> Result<Box<dyn TagTransport>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MemoryTransport(self.clone())))
        }
    }

    pub(crate) fn memory() -> Arc<MemoryTransports> {
        Arc::new(MemoryTransports::default())
    }

    fn sender(transports: &Arc<MemoryTransports>) -> RtmpSender {
        RtmpSender::new("rtmp://h/live/k", SenderConfig::default(), Arc::new(transports.clone()))
    }

    fn annexb(nals: &[&[u8]]) -> Bytes {
        h264::join_nalus(nals, true)
    }

    fn idr_packet(pts: i64, dts: i64) -> MediaPacket {
        MediaPacket::video(Codec::H264, pts, dts, annexb(&[SPS, PPS, &[6, 5, 1], &[0x65, 0x88]]))
            .keyframe(true)
            .dimensions(640, 480)
    }

    #[test]
    fn test_h264_sequence_header_then_avcc_frame() {
        let transports = memory();
        let mut s = sender(&transports);
        s.send(&idr_packet(80, 40)).unwrap();

        let tags = transports.tags.lock();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].tag_type, FlvTagType::Script);

        let config = &tags[1];
        assert!(config.is_sequence_header());
        assert_eq!(&config.data[..5], &[0x17, 0, 0, 0, 0]);
        assert_eq!(&config.data[5..9], &[0x01, SPS[1], SPS[2], SPS[3]]);
        assert_eq!(&config.data[9..11], &[0xFF, 0xE1]);

        let frame = &tags[2];
        assert_eq!(frame.timestamp, 40);
        // keyframe, NALU, CTS 40, then a single length-prefixed IDR slice
        assert_eq!(frame.data.as_ref(), &[0x17, 0x01, 0, 0, 40, 0, 0, 0, 2, 0x65, 0x88]);
        assert_eq!(s.state(), SenderState::Connected);
    }

    #[test]
    fn test_inter_frame_and_side_channel_sei() {
        let transports = memory();
        let mut s = sender(&transports);
        s.send(&idr_packet(0, 0)).unwrap();

        let mut packet = MediaPacket::video(Codec::H264, 40, 40, annexb(&[&[0x41, 0x9a]]));
        packet.append_sei(&[0, 0, 0, 1, 6, 5, 0xAA]);
        s.send(&packet).unwrap();

        let tags = transports.tags.lock();
        let last = tags.last().unwrap();
        assert_eq!(
            last.data.as_ref(),
            &[0x27, 0x01, 0, 0, 0, 0, 0, 0, 2, 0x41, 0x9a, 0, 0, 0, 1, 6, 5, 0xAA]
        );
        // one config, one metadata
        assert_eq!(tags.iter().filter(|t| t.is_sequence_header()).count(), 1);
        assert_eq!(tags.iter().filter(|t| t.tag_type == FlvTagType::Script).count(), 1);
    }

    #[test]
    fn test_aac_sequence_header_from_adts() {
        let transports = memory();
        let mut s = sender(&transports);
        let sf = aac::sampling_frequency_index(48000).unwrap();
        let mut data = aac::adts_header(aac::OBJECT_TYPE_LC, sf, 2, 3).to_vec();
        data.extend_from_slice(&[1, 2, 3]);
        let packet = MediaPacket::audio(Codec::Aac, 21, data).audio_params(48000, 2);
        s.send(&packet).unwrap();
        s.send(&packet.clone()).unwrap();

        let tags = transports.tags.lock();
        let audio: Vec<_> = tags.iter().filter(|t| t.tag_type == FlvTagType::Audio).collect();
        assert_eq!(audio.len(), 3);
        let asc = aac::audio_specific_config(2, sf, 2);
        assert_eq!(audio[0].data.as_ref(), &[0xAF, 0x00, asc[0], asc[1]]);
        assert_eq!(audio[1].data.as_ref(), &[0xAF, 0x01, 1, 2, 3]);
        assert_eq!(audio[1].timestamp, 21);
    }

    #[test]
    fn test_aac_without_adts_uses_default_config() {
        let transports = memory();
        let mut s = sender(&transports);
        s.send(&MediaPacket::audio(Codec::Aac, 0, vec![0x21, 0x10])).unwrap();
        let tags = transports.tags.lock();
        let header = tags.iter().find(|t| t.is_sequence_header()).unwrap();
        assert_eq!(&header.data[2..], &[0x12, 0x10]);
    }

    #[test]
    fn test_mp3_tag_header() {
        let transports = memory();
        let mut s = sender(&transports);
        s.send(&MediaPacket::audio(Codec::Mp3, 0, vec![0xFF, 0xFB]).audio_params(44100, 2)).unwrap();
        let tags = transports.tags.lock();
        let audio = tags.iter().find(|t| t.tag_type == FlvTagType::Audio).unwrap();
        assert_eq!(audio.data.as_ref(), &[0x2F, 0xFF, 0xFB]);
    }

    #[test]
    fn test_metadata_accumulates_per_kind() {
        let transports = memory();
        let mut s = sender(&transports);
        s.send(&idr_packet(0, 0)).unwrap();
        s.send(&MediaPacket::audio(Codec::Aac, 0, vec![1]).audio_params(48000, 2)).unwrap();
        s.send(&MediaPacket::audio(Codec::Aac, 21, vec![1]).audio_params(48000, 2)).unwrap();

        let tags = transports.tags.lock();
        let scripts: Vec<_> = tags.iter().filter(|t| t.tag_type == FlvTagType::Script).collect();
        assert_eq!(scripts.len(), 2);
        let values = amf0::decode_all(&scripts[1].data).unwrap();
        assert_eq!(values[2].get_string("copyright"), Some(crate::output::config::DEFAULT_COPYRIGHT));
        assert_eq!(values[2].get_number("width"), Some(640.0));
        assert_eq!(values[2].get_number("samplerate"), Some(48000.0));
    }

    #[test]
    fn test_file_mode_keeps_parameter_sets_inline() {
        let transports = Arc::new(MemoryTransports {
            file: true,
            ..Default::default()
        });
        let mut s = sender(&transports);
        s.send(&idr_packet(0, 0)).unwrap();

        let tags = transports.tags.lock();
        assert_eq!(tags.len(), 1);
        let body = &tags[0].data;
        assert_eq!(&body[..2], &[0x17, 0x01]);
        assert_eq!(&body[5..9], &[0, 0, 0, 1]);
        assert_eq!(body[9], SPS[0]);
    }

    #[test]
    fn test_dont_reconnect_discards_after_failure() {
        let transports = memory();
        let mut s = sender(&transports);
        s.set_dont_reconnect(true);
        s.send(&MediaPacket::audio(Codec::Aac, 0, vec![1])).unwrap();
        let bytes = s.bytes_sent().total();
        assert!(bytes > 0);

        transports.fail.store(true, Ordering::SeqCst);
        assert!(s.send(&MediaPacket::audio(Codec::Aac, 21, vec![1])).is_err());
        assert_eq!(s.state(), SenderState::Disconnected);

        transports.fail.store(false, Ordering::SeqCst);
        s.send(&MediaPacket::audio(Codec::Aac, 42, vec![1])).unwrap();
        assert_eq!(s.bytes_sent().total(), bytes);
        assert_eq!(transports.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reconnect_after_sequence_header_refused() {
        let transports = memory();
        let mut s = sender(&transports);
        s.send(&idr_packet(0, 0)).unwrap();
        transports.fail.store(true, Ordering::SeqCst);
        assert!(s.send(&idr_packet(40, 40)).is_err());

        transports.fail.store(false, Ordering::SeqCst);
        let err = s.send(&idr_packet(80, 80)).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::ConfigAlreadySent)));
        assert_eq!(transports.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reconnect_before_video_config_allowed() {
        let transports = memory();
        let mut s = sender(&transports);
        s.send(&MediaPacket::audio(Codec::Aac, 0, vec![1])).unwrap();
        transports.fail.store(true, Ordering::SeqCst);
        assert!(s.send(&MediaPacket::audio(Codec::Aac, 21, vec![1])).is_err());
        transports.fail.store(false, Ordering::SeqCst);
        s.send(&MediaPacket::audio(Codec::Aac, 42, vec![1])).unwrap();
        assert_eq!(transports.opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsupported_codec_ignored() {
        let transports = memory();
        let mut s = sender(&transports);
        s.send(&MediaPacket::audio(Codec::Opus, 0, vec![1])).unwrap();
        let tags = transports.tags.lock();
        assert!(tags.iter().all(|t| t.tag_type == FlvTagType::Script));
    }
}
