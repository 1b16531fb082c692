//! Blocking RTMP play client
//!
//! `connect`, `createStream`, `play`, then audio/video/data messages handed
//! out as FLV tags. A read that sees no bytes for `read_timeout` fails with
//! [`Error::Timeout`](crate::error::Error::Timeout).

use crate::error::{Error, ProtocolError, Result};
use crate::media::{FlvTag, FlvTagType};
use crate::protocol::constants::*;
use crate::protocol::message::Command;

use super::config::{ClientConfig, RtmpUrl};
use super::connection::RtmpConnection;

pub struct RtmpPlayer {
    url: RtmpUrl,
    conn: RtmpConnection,
    stream_id: u32,
}

impl RtmpPlayer {
    /// Connect and start playback of the URL's stream key
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let url = RtmpUrl::parse(&config.url)?;
        let stream_key = url
            .stream_key
            .clone()
            .ok_or_else(|| Error::InvalidUrl(config.url.clone()))?;

        let mut conn = RtmpConnection::open(&url, config)?;
        conn.connect_app(&url, config)?;
        let stream_id = conn.create_stream()?;

        let tid = conn.transaction();
        conn.send_command(stream_id, &Command::play(tid, &stream_key))?;
        conn.wait_for(|cmd| {
            if cmd.name != CMD_ON_STATUS {
                return None;
            }
            match cmd.status_code() {
                Some(NS_PLAY_START) => Some(Ok(())),
                Some(code) if code.contains("NotFound") || code.contains("Failed") || code.contains("Error") => {
                    Some(Err(ProtocolError::PlayRejected(cmd.description()).into()))
                }
                _ => None,
            }
        })?;
        tracing::info!(url = %config.url, stream_id, "Playing");
        Ok(Self { url, conn, stream_id })
    }

    /// Next media tag, `None` once the server stops the stream
    pub fn read_tag(&mut self) -> Result<Option<FlvTag>> {
        loop {
            let msg = self.conn.read_message()?;
            let tag_type = match msg.type_id {
                MSG_AUDIO => FlvTagType::Audio,
                MSG_VIDEO => FlvTagType::Video,
                MSG_DATA_AMF0 => FlvTagType::Script,
                MSG_COMMAND_AMF0 => {
                    let cmd = Command::parse(&msg.payload)?;
                    if cmd.name == CMD_ON_STATUS
                        && matches!(cmd.status_code(), Some(NS_PLAY_STOP) | Some(NS_PLAY_UNPUBLISH))
                    {
                        tracing::info!(url = %self.url.tc_url(), code = ?cmd.status_code(), "Playback ended");
                        return Ok(None);
                    }
                    continue;
                }
                _ => continue,
            };
            return Ok(Some(FlvTag::new(tag_type, msg.timestamp, msg.payload)));
        }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn url(&self) -> &RtmpUrl {
        &self.url
    }
}

impl std::fmt::Debug for RtmpPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtmpPlayer")
            .field("url", &self.url)
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::spawn_server;
    use crate::protocol::chunk::RtmpMessage;
    use std::time::{Duration, Instant};

    #[test]
    fn test_play_then_stall() {
        let media = vec![
            RtmpMessage::new(CSID_VIDEO, MSG_VIDEO, 1, 0, vec![0x17u8, 0, 0, 0, 0]),
            RtmpMessage::new(CSID_AUDIO, MSG_AUDIO, 1, 23, vec![0xAF, 1, 0x21]),
        ];
        let (url, _rx, server) = spawn_server(false, media);
        let config = ClientConfig::new(url).read_timeout(Duration::from_millis(200));
        let mut player = RtmpPlayer::connect(&config).unwrap();
        assert_eq!(player.stream_id(), 1);

        let video = player.read_tag().unwrap().unwrap();
        assert_eq!(video.tag_type, FlvTagType::Video);
        assert!(video.is_keyframe());
        let audio = player.read_tag().unwrap().unwrap();
        assert_eq!((audio.tag_type, audio.timestamp), (FlvTagType::Audio, 23));

        let begin = Instant::now();
        assert!(matches!(player.read_tag(), Err(Error::Timeout)));
        assert!(begin.elapsed() >= Duration::from_millis(150));

        drop(player);
        server.join().unwrap();
    }

    #[test]
    fn test_play_rejected() {
        let (url, _rx, server) = spawn_server(true, Vec::new());
        let err = RtmpPlayer::connect(&ClientConfig::new(url)).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::PlayRejected(_))));
        server.join().unwrap();
    }
}
