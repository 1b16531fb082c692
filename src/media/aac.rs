//! AAC framing
//!
//! Encoders emit ADTS-framed AAC; FLV wants raw frames plus an
//! AudioSpecificConfig sequence header.
//!
//! ```text
//! ADTS (7 or 9 bytes):
//!   syncword(12) id(1) layer(2) protection_absent(1)
//!   profile(2) sf_index(4) private(1) channel_cfg(3) ...
//!   frame_length(13) fullness(11) frames(2) [crc(16)]
//!
//! AudioSpecificConfig (2 bytes):
//!   object_type(5) sf_index(4) channel_cfg(4) 000
//! ```

use bytes::{Buf, Bytes};

use crate::error::{MediaError, Result};

/// Sampling frequencies by index
pub const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

pub const OBJECT_TYPE_LC: u8 = 2;
pub const SF_INDEX_44100: u8 = 4;
pub const CHANNELS_STEREO: u8 = 2;

/// Index of `rate` in the sampling frequency table
pub fn sampling_frequency_index(rate: u32) -> Option<u8> {
    SAMPLING_FREQUENCIES.iter().position(|f| *f == rate).map(|i| i as u8)
}

/// Parsed ADTS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// Profile as coded in ADTS (object type minus one)
    pub profile: u8,
    pub sf_index: u8,
    pub channel_configuration: u8,
    pub protection_absent: bool,
    /// Whole frame including the header
    pub frame_length: usize,
}

impl AdtsHeader {
    /// Parse the header at the start of `data`, `None` without a syncword
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 7 || data[0] != 0xFF || data[1] & 0xF0 != 0xF0 {
            return None;
        }
        Some(Self {
            profile: (data[2] >> 6) & 0x03,
            sf_index: (data[2] >> 2) & 0x0F,
            channel_configuration: ((data[2] & 0x01) << 2) | (data[3] >> 6),
            protection_absent: data[1] & 0x01 == 1,
            frame_length: (((data[3] & 0x03) as usize) << 11)
                | ((data[4] as usize) << 3)
                | ((data[5] as usize) >> 5),
        })
    }

    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            7
        } else {
            9
        }
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLING_FREQUENCIES.get(self.sf_index as usize).copied().unwrap_or(0)
    }

    /// Matching AudioSpecificConfig
    pub fn to_config(&self) -> [u8; 2] {
        audio_specific_config(self.profile + 1, self.sf_index, self.channel_configuration)
    }
}

/// Payload of an ADTS frame; data without a header is returned unchanged
pub fn strip_adts(data: &Bytes) -> Bytes {
    match AdtsHeader::parse(data) {
        Some(h) if h.header_len() <= data.len() => data.slice(h.header_len()..),
        _ => data.clone(),
    }
}

/// Two-byte AudioSpecificConfig
pub fn audio_specific_config(object_type: u8, sf_index: u8, channels: u8) -> [u8; 2] {
    let value: u16 = ((object_type as u16) << 11 & 0xF800)
        | ((sf_index as u16) << 7 & 0x0780)
        | ((channels as u16) << 3 & 0x0078);
    value.to_be_bytes()
}

/// ADTS header for a raw frame of `payload_len` bytes
pub fn adts_header(object_type: u8, sf_index: u8, channels: u8, payload_len: usize) -> [u8; 7] {
    let profile = object_type.saturating_sub(1);
    let len = payload_len + 7;
    [
        0xFF,
        0xF1,
        ((profile & 0x03) << 6) | ((sf_index & 0x0F) << 2) | ((channels >> 2) & 0x01),
        ((channels & 0x03) << 6) | ((len >> 11) & 0x03) as u8,
        ((len >> 3) & 0xFF) as u8,
        (((len & 0x07) << 5) | 0x1F) as u8,
        0xFC,
    ]
}

/// Decoded AudioSpecificConfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub sf_index: u8,
    pub sample_rate: u32,
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket.into());
        }
        let object_type = (data[0] >> 3) & 0x1F;
        let sf_index = ((data[0] & 0x07) << 1) | (data[1] >> 7);
        let sample_rate = SAMPLING_FREQUENCIES
            .get(sf_index as usize)
            .copied()
            .ok_or(MediaError::InvalidAacPacket)?;
        Ok(Self {
            object_type,
            sf_index,
            sample_rate,
            channel_configuration: (data[1] >> 3) & 0x0F,
        })
    }

    /// Channel count, 0 when signalled in-band
    pub fn channels(&self) -> u16 {
        match self.channel_configuration {
            7 => 8,
            c @ 0..=6 => c as u16,
            _ => 0,
        }
    }
}

/// FLV AAC packet body (after the sound-format byte)
#[derive(Debug, Clone)]
pub enum AacData {
    SequenceHeader(AudioSpecificConfig, Bytes),
    Frame(Bytes),
}

impl AacData {
    pub fn parse(mut data: Bytes) -> Result<Self> {
        if data.is_empty() {
            return Err(MediaError::InvalidAacPacket.into());
        }
        match data.get_u8() {
            0 => {
                let config = AudioSpecificConfig::parse(&data)?;
                Ok(AacData::SequenceHeader(config, data))
            }
            1 => Ok(AacData::Frame(data)),
            _ => Err(MediaError::InvalidAacPacket.into()),
        }
    }
}
