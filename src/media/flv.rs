//! FLV container
//!
//! The same tag bodies travel as RTMP message payloads and as FLV file tags.
//! A file adds a 9-byte header and an 11-byte header per tag:
//!
//! ```text
//! "FLV" | 0x01 | flags(a=0x04, v=0x01) | offset(4)=9 | prev_size(4)=0
//! +--------+-------------+-----------+--------+-------------+---------+--------------+
//! | Type(1)| DataSize(3) | TS(3)     | TSx(1) | StreamID(3) | Data(N) | PrevSize(4)  |
//! +--------+-------------+-----------+--------+-------------+---------+--------------+
//! ```
//!
//! Audio tag first byte:
//! ```text
//! | SoundFormat(4) | SoundRate(2) | SoundSize(1) | SoundType(1) |
//! ```
//!
//! Video tag first byte:
//! ```text
//! | FrameType(4) | CodecID(4) |
//! ```

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};

pub const FLV_HEADER_SIZE: usize = 9;
pub const TAG_HEADER_SIZE: usize = 11;

/// Video tag byte for an AVC key frame
pub const AVC_KEYFRAME: u8 = 0x17;
/// Video tag byte for an AVC inter frame
pub const AVC_INTERFRAME: u8 = 0x27;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio = 8,
    Video = 9,
    Script = 18,
}

impl FlvTagType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            8 => Some(FlvTagType::Audio),
            9 => Some(FlvTagType::Video),
            18 => Some(FlvTagType::Script),
            _ => None,
        }
    }
}

/// Sound format (upper 4 bits of an audio tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundFormat {
    LinearPcmPlatform = 0,
    Mp3 = 2,
    LinearPcmLe = 3,
    G711ALaw = 7,
    G711MuLaw = 8,
    Aac = 10,
    Speex = 11,
}

impl SoundFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            0 => Some(SoundFormat::LinearPcmPlatform),
            2 => Some(SoundFormat::Mp3),
            3 => Some(SoundFormat::LinearPcmLe),
            7 => Some(SoundFormat::G711ALaw),
            8 => Some(SoundFormat::G711MuLaw),
            10 => Some(SoundFormat::Aac),
            11 => Some(SoundFormat::Speex),
            _ => None,
        }
    }

    /// Bits per sample written into the tag header
    fn is_16bit(&self) -> bool {
        !matches!(self, SoundFormat::G711ALaw | SoundFormat::G711MuLaw)
    }
}

/// Sound rate code (2 bits)
pub fn sound_rate_code(sample_rate: u32) -> u8 {
    match sample_rate {
        0..=10_999 => 0,
        11_000..=21_999 => 1,
        22_000..=43_999 => 2,
        _ => 3,
    }
}

pub fn sound_rate_hz(code: u8) -> u32 {
    match code & 0x03 {
        0 => 5512,
        1 => 11025,
        2 => 22050,
        _ => 44100,
    }
}

/// First byte of an audio tag
pub fn audio_tag_header(format: SoundFormat, sample_rate: u32, channels: u16) -> u8 {
    let size = if format.is_16bit() { 1 } else { 0 };
    let stereo = if channels > 1 { 1 } else { 0 };
    ((format as u8 & 0x0F) << 4) | (sound_rate_code(sample_rate) << 2) | (size << 1) | stereo
}

/// AAC always signals 44 kHz, 16 bit, stereo; the real values live in the
/// AudioSpecificConfig.
pub fn aac_tag_header() -> u8 {
    audio_tag_header(SoundFormat::Aac, 44100, 2)
}

/// One FLV tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvTag {
    pub tag_type: FlvTagType,
    /// Milliseconds
    pub timestamp: u32,
    pub data: Bytes,
}

impl FlvTag {
    pub fn new(tag_type: FlvTagType, timestamp: u32, data: impl Into<Bytes>) -> Self {
        Self {
            tag_type,
            timestamp,
            data: data.into(),
        }
    }

    pub fn video(timestamp: u32, data: impl Into<Bytes>) -> Self {
        Self::new(FlvTagType::Video, timestamp, data)
    }

    pub fn audio(timestamp: u32, data: impl Into<Bytes>) -> Self {
        Self::new(FlvTagType::Audio, timestamp, data)
    }

    pub fn script(data: impl Into<Bytes>) -> Self {
        Self::new(FlvTagType::Script, 0, data)
    }

    pub fn is_keyframe(&self) -> bool {
        self.tag_type == FlvTagType::Video && self.data.first().map_or(false, |b| b >> 4 == 1)
    }

    /// Low nibble of a video tag: 7 is AVC
    pub fn video_codec_id(&self) -> Option<u8> {
        match self.tag_type {
            FlvTagType::Video => self.data.first().map(|b| b & 0x0F),
            _ => None,
        }
    }

    pub fn sound_format(&self) -> Option<SoundFormat> {
        match self.tag_type {
            FlvTagType::Audio => self.data.first().and_then(|b| SoundFormat::from_byte(*b)),
            _ => None,
        }
    }

    pub fn is_sequence_header(&self) -> bool {
        match self.tag_type {
            FlvTagType::Video => self.video_codec_id() == Some(7) && self.data.get(1) == Some(&0),
            FlvTagType::Audio => self.sound_format() == Some(SoundFormat::Aac) && self.data.get(1) == Some(&0),
            FlvTagType::Script => false,
        }
    }

    /// Serialized size including the tag header and trailing size field
    pub fn encoded_len(&self) -> usize {
        TAG_HEADER_SIZE + self.data.len() + 4
    }

    /// Tag header, body and trailing previous-tag-size
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        let len = self.data.len() as u32;
        buf.put_u8(self.tag_type as u8);
        buf.put_slice(&len.to_be_bytes()[1..]);
        buf.put_slice(&self.timestamp.to_be_bytes()[1..]);
        buf.put_u8((self.timestamp >> 24) as u8);
        buf.put_slice(&[0, 0, 0]);
        buf.put_slice(&self.data);
        buf.put_u32(TAG_HEADER_SIZE as u32 + len);
        buf.freeze()
    }
}

/// File header plus the zero previous-tag-size
pub fn file_header(has_audio: bool, has_video: bool) -> [u8; FLV_HEADER_SIZE + 4] {
    let flags = (if has_audio { 0x04 } else { 0 }) | (if has_video { 0x01 } else { 0 });
    [b'F', b'L', b'V', 0x01, flags, 0, 0, 0, 9, 0, 0, 0, 0]
}

/// Writes FLV files
#[derive(Debug)]
pub struct FlvWriter<W: Write> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> FlvWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    pub fn write_header(&mut self, has_audio: bool, has_video: bool) -> Result<()> {
        let header = file_header(has_audio, has_video);
        self.inner.write_all(&header)?;
        self.bytes_written += header.len() as u64;
        Ok(())
    }

    pub fn write_tag(&mut self, tag: &FlvTag) -> Result<usize> {
        let encoded = tag.encode();
        self.inner.write_all(&encoded)?;
        self.bytes_written += encoded.len() as u64;
        Ok(encoded.len())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads FLV files tag by tag
#[derive(Debug)]
pub struct FlvReader<R: Read> {
    inner: R,
    header_read: bool,
}

impl<R: Read> FlvReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            header_read: false,
        }
    }

    fn read_header(&mut self) -> Result<()> {
        let mut header = [0u8; FLV_HEADER_SIZE];
        self.inner.read_exact(&mut header)?;
        if &header[..3] != b"FLV" {
            return Err(MediaError::InvalidFlv("missing signature").into());
        }
        let offset = u32::from_be_bytes([header[5], header[6], header[7], header[8]]) as usize;
        if offset < FLV_HEADER_SIZE {
            return Err(MediaError::InvalidFlv("bad header size").into());
        }
        // skip extra header bytes and PreviousTagSize0
        let mut skip = vec![0u8; offset - FLV_HEADER_SIZE + 4];
        self.inner.read_exact(&mut skip)?;
        self.header_read = true;
        Ok(())
    }

    /// Next tag, `None` at a clean end of file. Unknown tag types are skipped.
    pub fn read_tag(&mut self) -> Result<Option<FlvTag>> {
        if !self.header_read {
            self.read_header()?;
        }
        loop {
            let mut header = [0u8; TAG_HEADER_SIZE];
            match read_full(&mut self.inner, &mut header)? {
                0 => return Ok(None),
                n if n < TAG_HEADER_SIZE => return Err(MediaError::InvalidFlv("truncated tag header").into()),
                _ => {}
            }
            let size = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
            let timestamp = u32::from_be_bytes([header[7], header[4], header[5], header[6]]);

            let mut body = vec![0u8; size + 4];
            self.inner
                .read_exact(&mut body)
                .map_err(|_| MediaError::InvalidFlv("truncated tag body"))?;
            body.truncate(size);

            match FlvTagType::from_byte(header[0]) {
                Some(tag_type) => return Ok(Some(FlvTag::new(tag_type, timestamp, body))),
                None => tracing::debug!(tag_type = header[0], "Skipping unknown FLV tag"),
            }
        }
    }
}

/// Fill `buf` unless EOF comes first; returns the bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
