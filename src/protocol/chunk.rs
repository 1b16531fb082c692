//! RTMP chunk stream
//!
//! Outgoing messages are written with a type 0 header for the first chunk and
//! type 3 headers for continuations. The decoder accepts all four header
//! formats and keeps per-chunk-stream state to reassemble messages.
//!
//! ```text
//! +-------------+----------------+-------------------+------------+
//! | Basic hdr   | Message hdr    | Extended ts       | Chunk data |
//! | 1-3 bytes   | 0/3/7/11 bytes | 0 or 4 bytes      |            |
//! +-------------+----------------+-------------------+------------+
//! ```

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::{DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP, MAX_CHUNK_SIZE};

/// Complete RTMP message
#[derive(Debug, Clone, PartialEq)]
pub struct RtmpMessage {
    pub csid: u32,
    pub type_id: u8,
    pub stream_id: u32,
    pub timestamp: u32,
    pub payload: Bytes,
}

impl RtmpMessage {
    pub fn new(csid: u32, type_id: u8, stream_id: u32, timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            csid,
            type_id,
            stream_id,
            timestamp,
            payload: payload.into(),
        }
    }
}

fn put_basic_header(buf: &mut BytesMut, fmt: u8, csid: u32) {
    match csid {
        2..=63 => buf.put_u8((fmt << 6) | csid as u8),
        64..=319 => {
            buf.put_u8(fmt << 6);
            buf.put_u8((csid - 64) as u8);
        }
        _ => {
            let id = csid - 64;
            buf.put_u8((fmt << 6) | 1);
            buf.put_u8((id & 0xFF) as u8);
            buf.put_u8((id >> 8) as u8);
        }
    }
}

fn put_u24(buf: &mut BytesMut, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}

/// Splits messages into chunks
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: usize,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE as usize,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Takes effect for the next message; the peer must be told first
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE) as usize;
    }

    pub fn encode(&self, msg: &RtmpMessage, buf: &mut BytesMut) {
        let extended = msg.timestamp >= EXTENDED_TIMESTAMP;
        let ts_field = if extended { EXTENDED_TIMESTAMP } else { msg.timestamp };

        put_basic_header(buf, 0, msg.csid);
        put_u24(buf, ts_field);
        put_u24(buf, msg.payload.len() as u32);
        buf.put_u8(msg.type_id);
        buf.put_u32_le(msg.stream_id);
        if extended {
            buf.put_u32(msg.timestamp);
        }

        let mut chunks = msg.payload.chunks(self.chunk_size).peekable();
        if chunks.peek().is_none() {
            return;
        }
        let mut first = true;
        for chunk in chunks {
            if !first {
                put_basic_header(buf, 3, msg.csid);
                if extended {
                    buf.put_u32(msg.timestamp);
                }
            }
            first = false;
            buf.put_slice(chunk);
        }
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone)]
struct ChunkStreamState {
    timestamp: u32,
    delta: u32,
    length: u32,
    type_id: u8,
    stream_id: u32,
    extended: bool,
    partial: BytesMut,
}

/// Reassembles chunks into messages
#[derive(Debug)]
pub struct ChunkDecoder {
    chunk_size: usize,
    streams: HashMap<u32, ChunkStreamState>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE as usize,
            streams: HashMap::new(),
        }
    }

    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE) as usize;
    }

    /// Decode one chunk from the front of `buf`.
    ///
    /// Returns `Ok(None)` without consuming anything when the chunk is not
    /// complete yet, or when it was consumed but did not finish a message
    /// (call again while `buf` shrinks).
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RtmpMessage>> {
        let Some((consumed, message)) = self.try_decode(&buf[..])? else {
            return Ok(None);
        };
        buf.advance(consumed);
        Ok(message)
    }

    /// Decode every complete message currently buffered
    pub fn decode_all(&mut self, buf: &mut BytesMut) -> Result<Vec<RtmpMessage>> {
        let mut out = Vec::new();
        loop {
            let before = buf.len();
            if let Some(msg) = self.decode(buf)? {
                out.push(msg);
            } else if buf.len() == before {
                return Ok(out);
            }
        }
    }

    fn try_decode(&mut self, data: &[u8]) -> Result<Option<(usize, Option<RtmpMessage>)>> {
        let mut cur = data;
        if cur.is_empty() {
            return Ok(None);
        }
        let first = cur.get_u8();
        let fmt = first >> 6;
        let csid = match first & 0x3F {
            0 => {
                if cur.remaining() < 1 {
                    return Ok(None);
                }
                cur.get_u8() as u32 + 64
            }
            1 => {
                if cur.remaining() < 2 {
                    return Ok(None);
                }
                let lo = cur.get_u8() as u32;
                let hi = cur.get_u8() as u32;
                (hi << 8) + lo + 64
            }
            id => id as u32,
        };

        let header_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };
        if cur.remaining() < header_len {
            return Ok(None);
        }

        let known = self.streams.contains_key(&csid);
        if fmt != 0 && !known {
            return Err(ProtocolError::InvalidChunk("continuation without prior header").into());
        }
        let mut state = self.streams.get(&csid).cloned().unwrap_or_default();
        let starting = state.partial.is_empty();

        let mut ts_field = None;
        if fmt <= 2 {
            ts_field = Some(get_u24(&mut cur));
        }
        if fmt <= 1 {
            state.length = get_u24(&mut cur);
            state.type_id = cur.get_u8();
        }
        if fmt == 0 {
            state.stream_id = cur.get_u32_le();
        }
        if let Some(field) = ts_field {
            state.extended = field == EXTENDED_TIMESTAMP;
        }

        let mut value = ts_field.unwrap_or(state.delta);
        if state.extended {
            if cur.remaining() < 4 {
                return Ok(None);
            }
            value = cur.get_u32();
        }

        let want = (state.length as usize - state.partial.len()).min(self.chunk_size);
        if cur.remaining() < want {
            return Ok(None);
        }

        if starting {
            match fmt {
                0 => {
                    state.timestamp = value;
                    state.delta = 0;
                }
                1 | 2 => {
                    state.delta = value;
                    state.timestamp = state.timestamp.wrapping_add(value);
                }
                _ => state.timestamp = state.timestamp.wrapping_add(state.delta),
            }
        }

        state.partial.extend_from_slice(&cur[..want]);
        cur.advance(want);
        let consumed = data.len() - cur.remaining();

        let message = if state.partial.len() >= state.length as usize {
            let payload = std::mem::take(&mut state.partial).freeze();
            Some(RtmpMessage::new(csid, state.type_id, state.stream_id, state.timestamp, payload))
        } else {
            None
        };
        self.streams.insert(csid, state);
        Ok(Some((consumed, message)))
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn get_u24(buf: &mut &[u8]) -> u32 {
    let b = [buf.get_u8(), buf.get_u8(), buf.get_u8()];
    u32::from_be_bytes([0, b[0], b[1], b[2]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::constants::{CSID_COMMAND, CSID_VIDEO, MSG_COMMAND_AMF0, MSG_VIDEO};

    #[test]
    fn test_single_chunk_header_layout() {
        let enc = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        enc.encode(&RtmpMessage::new(CSID_COMMAND, MSG_COMMAND_AMF0, 0, 0, vec![1, 2, 3]), &mut buf);
        assert_eq!(
            &buf[..],
            &[0x03, 0, 0, 0, 0, 0, 3, 20, 0, 0, 0, 0, 1, 2, 3]
        );
    }

    #[test]
    fn test_large_message_split_with_type3() {
        let mut enc = ChunkEncoder::new();
        enc.set_chunk_size(4);
        let mut buf = BytesMut::new();
        enc.encode(&RtmpMessage::new(CSID_VIDEO, MSG_VIDEO, 1, 40, vec![9u8; 10]), &mut buf);
        // 12 header + 4 + (1+4) + (1+2)
        assert_eq!(buf.len(), 12 + 4 + 5 + 3);
        assert_eq!(buf[16], 0xC0 | CSID_VIDEO as u8);

        let mut dec = ChunkDecoder::new();
        dec.set_chunk_size(4);
        let msgs = dec.decode_all(&mut buf).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].payload.len(), 10);
        assert_eq!(msgs[0].timestamp, 40);
        assert_eq!(msgs[0].stream_id, 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extended_timestamp() {
        let mut enc = ChunkEncoder::new();
        enc.set_chunk_size(8);
        let mut buf = BytesMut::new();
        let ts = 0x0100_0000;
        enc.encode(&RtmpMessage::new(CSID_VIDEO, MSG_VIDEO, 1, ts, vec![7u8; 20]), &mut buf);
        assert_eq!(&buf[1..4], &[0xFF, 0xFF, 0xFF]);

        let mut dec = ChunkDecoder::new();
        dec.set_chunk_size(8);
        let msgs = dec.decode_all(&mut buf).unwrap();
        assert_eq!(msgs[0].timestamp, ts);
        assert_eq!(msgs[0].payload.len(), 20);
    }

    #[test]
    fn test_partial_input_waits() {
        let enc = ChunkEncoder::new();
        let mut full = BytesMut::new();
        enc.encode(&RtmpMessage::new(CSID_COMMAND, MSG_COMMAND_AMF0, 0, 0, vec![5u8; 50]), &mut full);

        let mut dec = ChunkDecoder::new();
        let mut buf = BytesMut::from(&full[..20]);
        assert!(dec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 20);
        buf.extend_from_slice(&full[20..]);
        let msg = dec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.payload.len(), 50);
    }

    #[test]
    fn test_delta_headers_accumulate() {
        // fmt 0 at ts 100, then fmt 2 with delta 40, then fmt 3 reusing the delta
        let mut buf = BytesMut::new();
        buf.put_slice(&[0x06, 0, 0, 100, 0, 0, 1, 9, 1, 0, 0, 0, 0xAA]);
        buf.put_slice(&[0x86, 0, 0, 40, 0xBB]);
        buf.put_slice(&[0xC6, 0xCC]);
        let mut dec = ChunkDecoder::new();
        let msgs = dec.decode_all(&mut buf).unwrap();
        let stamps: Vec<_> = msgs.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![100, 140, 180]);
        assert_eq!(msgs[2].payload.as_ref(), &[0xCC]);
    }

    #[test]
    fn test_continuation_without_header_rejected() {
        let mut buf = BytesMut::from(&[0xC7u8, 0x00][..]);
        let err = ChunkDecoder::new().decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidChunk(_))));
    }

    #[test]
    fn test_two_byte_csid() {
        let enc = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        enc.encode(&RtmpMessage::new(100, MSG_VIDEO, 1, 0, vec![1]), &mut buf);
        assert_eq!(&buf[..2], &[0x00, 36]);
        let msg = ChunkDecoder::new().decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.csid, 100);
    }
}
