//! H.264 bitstream helpers
//!
//! Encoders hand out Annex-B (start-code delimited) access units, while FLV
//! carries AVCC (length-prefixed) NAL units plus a separate
//! AVCDecoderConfigurationRecord:
//!
//! ```text
//! Annex-B:  00 00 00 01 | nal | 00 00 01 | nal ...
//! AVCC:     len(4)      | nal | len(4)   | nal ...
//!
//! AVCDecoderConfigurationRecord:
//!   01 | profile | compat | level | FF | E1 | len(2) sps | 01 | len(2) pps
//! ```
//!
//! FLV video tag body for AVC:
//! ```text
//! | FrameType(4) CodecID(4) | AVCPacketType(1) | CompositionTime(SI24) | Data
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};

/// AVC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    SequenceHeader = 0,
    Nalu = 1,
    EndOfSequence = 2,
}

impl AvcPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AvcPacketType::SequenceHeader),
            1 => Some(AvcPacketType::Nalu),
            2 => Some(AvcPacketType::EndOfSequence),
            _ => None,
        }
    }
}

/// NAL unit type (lower 5 bits of the header byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    Slice = 1,
    Idr = 5,
    Sei = 6,
    Sps = 7,
    Pps = 8,
    Aud = 9,
    Other = 0,
}

impl NaluType {
    pub fn of(nal: &[u8]) -> Self {
        match nal.first().map(|b| b & 0x1F) {
            Some(1) => NaluType::Slice,
            Some(5) => NaluType::Idr,
            Some(6) => NaluType::Sei,
            Some(7) => NaluType::Sps,
            Some(8) => NaluType::Pps,
            Some(9) => NaluType::Aud,
            _ => NaluType::Other,
        }
    }

    /// Picture data (slice or IDR slice)
    pub fn is_picture(&self) -> bool {
        matches!(self, NaluType::Slice | NaluType::Idr)
    }
}

/// Length of the start code at the head of `data`: 3, 4, or 0 if none
pub fn start_code_len(data: &[u8]) -> usize {
    let zeros = data.iter().take(4).take_while(|b| **b == 0).count();
    match data.get(zeros) {
        Some(1) if (2..=3).contains(&zeros) => zeros + 1,
        _ => 0,
    }
}

/// Split an Annex-B buffer into NAL units.
///
/// A buffer that does not begin with a start code is returned whole.
pub fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    if start_code_len(data) == 0 {
        return if data.is_empty() { Vec::new() } else { vec![data] };
    }

    let mut nalus = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;
    while i < data.len() {
        let len = start_code_len(&data[i..]);
        if len > 0 {
            if let Some(s) = start {
                nalus.push(&data[s..i]);
            }
            i += len;
            start = Some(i);
        } else {
            i += 1;
        }
    }
    if let Some(s) = start {
        if s < data.len() {
            nalus.push(&data[s..]);
        }
    }
    nalus
}

/// Join NAL units, each preceded by a 4-byte start code or a 4-byte length
pub fn join_nalus(nalus: &[&[u8]], annexb: bool) -> Bytes {
    let total: usize = nalus.iter().map(|n| n.len() + 4).sum();
    let mut buf = BytesMut::with_capacity(total);
    for nal in nalus {
        if annexb {
            buf.put_u32(1);
        } else {
            buf.put_u32(nal.len() as u32);
        }
        buf.put_slice(nal);
    }
    buf.freeze()
}

/// Convert length-prefixed NAL units to Annex-B
pub fn avcc_to_annexb(data: &[u8], nalu_length_size: u8) -> Bytes {
    let nalus: Vec<&[u8]> = NaluIterator::new(data, nalu_length_size).collect();
    join_nalus(&nalus, true)
}

/// AVC decoder configuration
#[derive(Debug, Clone)]
pub struct AvcConfig {
    pub profile: u8,
    pub compatibility: u8,
    pub level: u8,
    /// Bytes in each NAL length prefix
    pub nalu_length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    /// Parse an AVCDecoderConfigurationRecord
    pub fn parse(mut data: Bytes) -> Result<Self> {
        if data.len() < 7 || data.get_u8() != 1 {
            return Err(MediaError::InvalidAvcPacket.into());
        }

        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let sps = read_parameter_sets(&mut data, num_sps)?;
        if data.is_empty() {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let num_pps = data.get_u8() as usize;
        let pps = read_parameter_sets(&mut data, num_pps)?;

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
        })
    }

    /// Build the record for a single SPS/PPS pair
    pub fn build(sps: &[u8], pps: &[u8]) -> Result<Bytes> {
        if sps.len() < 4 || pps.is_empty() {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let mut buf = BytesMut::with_capacity(sps.len() + pps.len() + 11);
        buf.put_u8(0x01);
        buf.put_slice(&sps[1..4]);
        buf.put_u8(0xFF);
        buf.put_u8(0xE1);
        buf.put_u16(sps.len() as u16);
        buf.put_slice(sps);
        buf.put_u8(0x01);
        buf.put_u16(pps.len() as u16);
        buf.put_slice(pps);
        Ok(buf.freeze())
    }

    /// Parameter sets as an Annex-B prefix
    pub fn to_annexb(&self) -> Bytes {
        let nalus: Vec<&[u8]> = self.sps.iter().chain(self.pps.iter()).map(|b| b.as_ref()).collect();
        join_nalus(&nalus, true)
    }
}

fn read_parameter_sets(data: &mut Bytes, count: usize) -> Result<Vec<Bytes>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if data.len() < 2 {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let len = data.get_u16() as usize;
        if data.len() < len {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        sets.push(data.copy_to_bytes(len));
    }
    Ok(sets)
}

/// Parsed AVC video tag body (after the frame-type/codec byte)
#[derive(Debug, Clone)]
pub enum H264Data {
    SequenceHeader(AvcConfig),
    Frame {
        composition_time: i32,
        /// Length-prefixed NAL units
        nalus: Bytes,
    },
    EndOfSequence,
}

impl H264Data {
    pub fn parse(mut data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(MediaError::InvalidAvcPacket.into());
        }

        let packet_type = data.get_u8();
        let raw = ((data.get_u8() as i32) << 16) | ((data.get_u8() as i32) << 8) | data.get_u8() as i32;
        // sign-extend SI24
        let composition_time = (raw << 8) >> 8;

        match AvcPacketType::from_byte(packet_type) {
            Some(AvcPacketType::SequenceHeader) => Ok(H264Data::SequenceHeader(AvcConfig::parse(data)?)),
            Some(AvcPacketType::Nalu) => Ok(H264Data::Frame {
                composition_time,
                nalus: data,
            }),
            Some(AvcPacketType::EndOfSequence) => Ok(H264Data::EndOfSequence),
            None => Err(MediaError::InvalidAvcPacket.into()),
        }
    }
}

/// Iterator over length-prefixed NAL units
pub struct NaluIterator<'a> {
    data: &'a [u8],
    offset: usize,
    nalu_length_size: usize,
}

impl<'a> NaluIterator<'a> {
    pub fn new(data: &'a [u8], nalu_length_size: u8) -> Self {
        Self {
            data,
            offset: 0,
            nalu_length_size: nalu_length_size.clamp(1, 4) as usize,
        }
    }
}

impl<'a> Iterator for NaluIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let header_end = self.offset + self.nalu_length_size;
        if header_end > self.data.len() {
            return None;
        }
        let len = self.data[self.offset..header_end]
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        if header_end + len > self.data.len() {
            return None;
        }
        self.offset = header_end + len;
        Some(&self.data[header_end..self.offset])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x1F, 0xAC];
    const PPS: &[u8] = &[0x68, 0xEF, 0x38];

    #[test]
    fn test_start_code_len() {
        assert_eq!(start_code_len(&[0, 0, 1, 0x65]), 3);
        assert_eq!(start_code_len(&[0, 0, 0, 1, 0x65]), 4);
        assert_eq!(start_code_len(&[0, 1, 0x65]), 0);
        assert_eq!(start_code_len(&[0, 0, 0, 0, 1]), 0);
        assert_eq!(start_code_len(&[0x65]), 0);
    }

    #[test]
    fn test_split_mixed_start_codes() {
        let data = [0, 0, 0, 1, 0x67, 1, 2, 0, 0, 1, 0x68, 3, 0, 0, 0, 1, 0x65, 4, 5];
        let nalus = split_annexb(&data);
        assert_eq!(nalus, vec![&[0x67u8, 1, 2][..], &[0x68u8, 3][..], &[0x65u8, 4, 5][..]]);
        assert_eq!(NaluType::of(nalus[2]), NaluType::Idr);
    }

    #[test]
    fn test_split_without_start_code() {
        assert_eq!(split_annexb(&[0x41, 9]), vec![&[0x41u8, 9][..]]);
        assert!(split_annexb(&[]).is_empty());
    }

    #[test]
    fn test_build_and_parse_config() {
        let record = AvcConfig::build(SPS, PPS).unwrap();
        assert_eq!(&record[..6], &[0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1]);
        assert_eq!(&record[6..8], &[0x00, 0x05]);

        let config = AvcConfig::parse(record).unwrap();
        assert_eq!(config.profile, 100);
        assert_eq!(config.level, 31);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.sps[0].as_ref(), SPS);
        assert_eq!(config.pps[0].as_ref(), PPS);
        assert_eq!(split_annexb(&config.to_annexb()), vec![SPS, PPS]);
    }

    #[test]
    fn test_build_rejects_short_sps() {
        assert!(AvcConfig::build(&[0x67, 1], PPS).is_err());
    }

    #[test]
    fn test_avcc_to_annexb() {
        let avcc = join_nalus(&[&[0x65u8, 1, 2][..], &[0x06u8, 9][..]], false);
        assert_eq!(&avcc[..4], &[0, 0, 0, 3]);
        let annexb = avcc_to_annexb(&avcc, 4);
        assert_eq!(split_annexb(&annexb), vec![&[0x65u8, 1, 2][..], &[0x06u8, 9][..]]);
    }

    #[test]
    fn test_parse_frame_negative_cts() {
        let body = Bytes::from_static(&[0x01, 0xFF, 0xFF, 0xF6, 0, 0, 0, 1, 0x41]);
        match H264Data::parse(body).unwrap() {
            H264Data::Frame { composition_time, nalus } => {
                assert_eq!(composition_time, -10);
                assert_eq!(nalus.len(), 5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_iterator_stops() {
        let data = [0, 0, 0, 9, 0x65];
        assert_eq!(NaluIterator::new(&data, 4).count(), 0);
    }
}
