//! Blocking RTMP publisher
//!
//! Runs on the sink's own thread: connect, handshake, `connect`,
//! `releaseStream`, `FCPublish`, `createStream`, `publish`, then FLV tag
//! bodies written as audio/video/data messages.

use crate::error::{Error, ProtocolError, Result};
use crate::media::{FlvTag, FlvTagType};
use crate::protocol::chunk::RtmpMessage;
use crate::protocol::constants::*;
use crate::protocol::message::Command;

use super::config::{ClientConfig, RtmpUrl};
use super::connection::RtmpConnection;

/// Publishing connection
pub struct RtmpPublisher {
    url: RtmpUrl,
    conn: RtmpConnection,
    stream_id: u32,
}

impl RtmpPublisher {
    /// Connect and negotiate publishing of the URL's stream key
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let url = RtmpUrl::parse(&config.url)?;
        let stream_key = url
            .stream_key
            .clone()
            .ok_or_else(|| Error::InvalidUrl(config.url.clone()))?;

        let mut conn = RtmpConnection::open(&url, config)?;
        conn.connect_app(&url, config)?;
        conn.set_chunk_size(config.chunk_size)?;

        let tid = conn.transaction();
        conn.send_command(0, &Command::release_stream(tid, &stream_key))?;
        let tid = conn.transaction();
        conn.send_command(0, &Command::fc_publish(tid, &stream_key))?;
        let stream_id = conn.create_stream()?;

        let tid = conn.transaction();
        conn.send_command(stream_id, &Command::publish(tid, &stream_key))?;
        conn.wait_for(|cmd| {
            if cmd.name != CMD_ON_STATUS {
                return None;
            }
            match cmd.status_code() {
                Some(NS_PUBLISH_START) => Some(Ok(())),
                Some(code) if code.contains("Error") || code.contains("BadName") || code.contains("Failed") => {
                    Some(Err(ProtocolError::PublishRejected(cmd.description()).into()))
                }
                _ => None,
            }
        })?;
        tracing::info!(url = %config.url, stream_id, "Publishing");
        Ok(Self { url, conn, stream_id })
    }

    /// Write one FLV tag body; returns the bytes put on the wire
    pub fn write_tag(&mut self, tag: &FlvTag) -> Result<usize> {
        let (csid, type_id) = match tag.tag_type {
            FlvTagType::Audio => (CSID_AUDIO, MSG_AUDIO),
            FlvTagType::Video => (CSID_VIDEO, MSG_VIDEO),
            FlvTagType::Script => (CSID_DATA, MSG_DATA_AMF0),
        };
        let msg = RtmpMessage::new(csid, type_id, self.stream_id, tag.timestamp, tag.data.clone());
        self.conn.send(&msg)
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn url(&self) -> &RtmpUrl {
        &self.url
    }
}

impl std::fmt::Debug for RtmpPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtmpPublisher")
            .field("url", &self.url)
            .field("stream_id", &self.stream_id)
            .finish()
    }
}
