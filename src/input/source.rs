//! Packet sources
//!
//! A [`SourceOpener`] turns a URL into a [`Demuxer`] that yields compressed
//! packets with millisecond timestamps. [`DefaultSourceOpener`] pulls
//! `rtmp://` URLs over the network and reads anything else as a local FLV
//! file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::time::Duration;

use bytes::Bytes;

use crate::client::{ClientConfig, RtmpPlayer};
use crate::error::{Error, Result};
use crate::frame::{Codec, MediaPacket};
use crate::media::aac::{AacData, AudioSpecificConfig};
use crate::media::flv::{sound_rate_hz, FlvReader, FlvTag, FlvTagType, SoundFormat};
use crate::media::h264::{avcc_to_annexb, AvcConfig, H264Data};

/// Yields packets from one opened source
pub trait Demuxer: Send {
    /// Next packet, `None` at end of stream
    fn read_packet(&mut self) -> Result<Option<MediaPacket>>;
}

pub trait SourceOpener: Send + Sync {
    /// Open `url`. Reads that stall longer than `stall_timeout` fail with
    /// [`Error::Timeout`].
    fn open(&self, url: &str, stall_timeout: Duration) -> Result<Box<dyn Demuxer>>;
}

/// RTMP player for `rtmp://` URLs, FLV file otherwise
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSourceOpener;

impl SourceOpener for DefaultSourceOpener {
    fn open(&self, url: &str, stall_timeout: Duration) -> Result<Box<dyn Demuxer>> {
        if url.starts_with("rtmp://") {
            RtmpSourceOpener.open(url, stall_timeout)
        } else {
            FileSourceOpener.open(url, stall_timeout)
        }
    }
}

/// Pulls a live stream with RTMP `play`
#[derive(Debug, Default, Clone, Copy)]
pub struct RtmpSourceOpener;

impl SourceOpener for RtmpSourceOpener {
    fn open(&self, url: &str, stall_timeout: Duration) -> Result<Box<dyn Demuxer>> {
        let config = ClientConfig::new(url)
            .connect_timeout(stall_timeout)
            .read_timeout(stall_timeout);
        let player = RtmpPlayer::connect(&config)?;
        Ok(Box::new(RtmpDemuxer {
            player,
            tags: TagConverter::default(),
        }))
    }
}

/// Packets from an RTMP playback
pub struct RtmpDemuxer {
    player: RtmpPlayer,
    tags: TagConverter,
}

impl Demuxer for RtmpDemuxer {
    fn read_packet(&mut self) -> Result<Option<MediaPacket>> {
        while let Some(tag) = self.player.read_tag()? {
            if let Some(packet) = self.tags.convert(&tag)? {
                return Ok(Some(packet));
            }
        }
        Ok(None)
    }
}

/// Opens local FLV files given as a path or `file://` URL
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSourceOpener;

impl SourceOpener for FileSourceOpener {
    fn open(&self, url: &str, _stall_timeout: Duration) -> Result<Box<dyn Demuxer>> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        if path.contains("://") {
            return Err(Error::InvalidUrl(url.to_string()));
        }
        let file = File::open(path)?;
        tracing::info!(url = %url, "Opened FLV file");
        Ok(Box::new(FlvDemuxer::new(BufReader::new(file))))
    }
}

/// Packets from an FLV byte stream
pub struct FlvDemuxer<R: Read + Send> {
    reader: FlvReader<R>,
    tags: TagConverter,
}

impl<R: Read + Send> FlvDemuxer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: FlvReader::new(reader),
            tags: TagConverter::default(),
        }
    }
}

impl<R: Read + Send> Demuxer for FlvDemuxer<R> {
    fn read_packet(&mut self) -> Result<Option<MediaPacket>> {
        while let Some(tag) = self.reader.read_tag()? {
            if let Some(packet) = self.tags.convert(&tag)? {
                return Ok(Some(packet));
            }
        }
        Ok(None)
    }
}

/// Converts FLV tags into packets decoders understand.
///
/// H.264 is rewritten to Annex-B with SPS/PPS in front of key frames; AAC
/// frames carry the AudioSpecificConfig as extradata.
#[derive(Default)]
struct TagConverter {
    avc: Option<(AvcConfig, Bytes)>,
    aac: Option<(AudioSpecificConfig, Bytes)>,
}

impl TagConverter {
    /// `None` for sequence headers, script data and unsupported codecs
    fn convert(&mut self, tag: &FlvTag) -> Result<Option<MediaPacket>> {
        match tag.tag_type {
            FlvTagType::Video => self.video_packet(tag),
            FlvTagType::Audio => self.audio_packet(tag),
            FlvTagType::Script => Ok(None),
        }
    }

    fn video_packet(&mut self, tag: &FlvTag) -> Result<Option<MediaPacket>> {
        if tag.video_codec_id() != Some(7) {
            tracing::debug!(codec = ?tag.video_codec_id(), "Skipping non-AVC video tag");
            return Ok(None);
        }
        match H264Data::parse(tag.data.slice(1..))? {
            H264Data::SequenceHeader(config) => {
                self.avc = Some((config, tag.data.slice(5..)));
                Ok(None)
            }
            H264Data::Frame {
                composition_time,
                nalus,
            } => {
                let keyframe = tag.is_keyframe();
                let length_size = self.avc.as_ref().map_or(4, |(c, _)| c.nalu_length_size);
                let body = avcc_to_annexb(&nalus, length_size);
                let data = match (&self.avc, keyframe) {
                    (Some((config, _)), true) => {
                        let mut joined = config.to_annexb().to_vec();
                        joined.extend_from_slice(&body);
                        Bytes::from(joined)
                    }
                    _ => body,
                };
                let dts = tag.timestamp as i64;
                let mut packet =
                    MediaPacket::video(Codec::H264, dts + composition_time as i64, dts, data).keyframe(keyframe);
                if let Some((_, record)) = &self.avc {
                    packet = packet.extradata(record.clone());
                }
                Ok(Some(packet))
            }
            H264Data::EndOfSequence => Ok(None),
        }
    }

    fn audio_packet(&mut self, tag: &FlvTag) -> Result<Option<MediaPacket>> {
        let Some(&head) = tag.data.first() else {
            return Ok(None);
        };
        let pts = tag.timestamp as i64;
        let channels = if head & 0x01 == 1 { 2 } else { 1 };
        let rate = sound_rate_hz(head >> 2);
        match tag.sound_format() {
            Some(SoundFormat::Aac) => match AacData::parse(tag.data.slice(1..))? {
                AacData::SequenceHeader(config, raw) => {
                    self.aac = Some((config, raw));
                    Ok(None)
                }
                AacData::Frame(raw) => {
                    let mut packet = MediaPacket::audio(Codec::Aac, pts, raw);
                    if let Some((config, asc)) = &self.aac {
                        packet = packet
                            .extradata(asc.clone())
                            .audio_params(config.sample_rate, config.channels());
                    }
                    Ok(Some(packet))
                }
            },
            Some(SoundFormat::Mp3) => Ok(Some(
                MediaPacket::audio(Codec::Mp3, pts, tag.data.slice(1..)).audio_params(rate, channels),
            )),
            Some(SoundFormat::LinearPcmLe) if head & 0x02 != 0 => Ok(Some(
                MediaPacket::audio(Codec::Pcm, pts, tag.data.slice(1..)).audio_params(rate, channels),
            )),
            other => {
                tracing::debug!(format = ?other, "Skipping unsupported audio tag");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::StreamKind;
    use crate::media::flv::FlvWriter;
    use crate::media::h264::{join_nalus, split_annexb};
    use std::io::Cursor;

    const SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1f, 0xe9];
    const PPS: &[u8] = &[0x68, 0xce, 0x38, 0x80];

    fn sample_file() -> Vec<u8> {
        let mut writer = FlvWriter::new(Vec::new());
        writer.write_header(true, true).unwrap();

        let mut seq = vec![0x17, 0x00, 0, 0, 0];
        seq.extend_from_slice(&AvcConfig::build(SPS, PPS).unwrap());
        writer.write_tag(&FlvTag::video(0, seq)).unwrap();
        writer.write_tag(&FlvTag::audio(0, vec![0xAF, 0x00, 0x12, 0x10])).unwrap();

        let mut idr = vec![0x17, 0x01, 0, 0, 40];
        idr.extend_from_slice(&join_nalus(&[&[0x65u8, 0x88][..]], false));
        writer.write_tag(&FlvTag::video(0, idr)).unwrap();
        writer.write_tag(&FlvTag::audio(23, vec![0xAF, 0x01, 0x21, 0x22])).unwrap();
        writer.write_tag(&FlvTag::script(vec![0x02, 0, 0])).unwrap();
        writer.write_tag(&FlvTag::audio(30, vec![0x3F, 1, 0, 2, 0])).unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_flv_demux_h264_and_aac() {
        let mut demuxer = FlvDemuxer::new(Cursor::new(sample_file()));

        let video = demuxer.read_packet().unwrap().unwrap();
        assert_eq!(video.kind, StreamKind::Video);
        assert_eq!(video.codec, Codec::H264);
        assert!(video.keyframe);
        assert_eq!((video.pts, video.dts), (40, 0));
        assert_eq!(split_annexb(&video.data), vec![SPS, PPS, &[0x65u8, 0x88][..]]);
        assert!(video.extradata.is_some());

        let audio = demuxer.read_packet().unwrap().unwrap();
        assert_eq!(audio.codec, Codec::Aac);
        assert_eq!(audio.pts, 23);
        assert_eq!(audio.data.as_ref(), &[0x21, 0x22]);
        assert_eq!(audio.extradata.as_deref(), Some(&[0x12u8, 0x10][..]));
        assert_eq!((audio.sample_rate, audio.channels), (44100, 2));

        let pcm = demuxer.read_packet().unwrap().unwrap();
        assert_eq!(pcm.codec, Codec::Pcm);
        assert_eq!(pcm.data.len(), 4);

        assert!(demuxer.read_packet().unwrap().is_none());
    }

    #[test]
    fn test_rtmp_source_demuxes_and_times_out() {
        use crate::client::testing::spawn_server;
        use crate::protocol::chunk::RtmpMessage;
        use crate::protocol::constants::{CSID_AUDIO, MSG_AUDIO};

        let pcm = vec![0x3Fu8, 1, 0, 2, 0];
        let (url, _rx, server) = spawn_server(false, vec![RtmpMessage::new(CSID_AUDIO, MSG_AUDIO, 1, 30, pcm)]);
        let mut demuxer = DefaultSourceOpener.open(&url, Duration::from_millis(200)).unwrap();

        let packet = demuxer.read_packet().unwrap().unwrap();
        assert_eq!((packet.codec, packet.pts), (Codec::Pcm, 30));
        assert_eq!(packet.data.as_ref(), &[1, 0, 2, 0]);
        assert!(matches!(demuxer.read_packet(), Err(Error::Timeout)));

        drop(demuxer);
        server.join().unwrap();
    }

    #[test]
    fn test_file_opener_rejects_network_urls() {
        let opener = FileSourceOpener;
        assert!(matches!(
            opener.open("rtmp://host/app/stream", Duration::from_secs(1)),
            Err(Error::InvalidUrl(_))
        ));
        assert!(opener.open("/nonexistent/file.flv", Duration::from_secs(1)).is_err());
    }
}
