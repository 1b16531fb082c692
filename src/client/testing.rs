//! In-process RTMP server for client tests

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

use bytes::BytesMut;

use crate::amf::{AmfObject, AmfValue};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, RtmpMessage};
use crate::protocol::constants::*;
use crate::protocol::handshake::server_handshake;
use crate::protocol::message::{self, Command, ControlMessage};

fn status(code: &str) -> Command {
    Command::new(CMD_ON_STATUS, 0.0).arg(
        AmfObject::new()
            .with("level", "status")
            .with("code", code)
            .with("description", AmfValue::from(code)),
    )
}

/// Publish-accepting server. Forwards every media message it receives and
/// stops when the client disconnects.
pub(crate) fn spawn_fake_server(reject: bool) -> (String, mpsc::Receiver<RtmpMessage>, thread::JoinHandle<()>) {
    spawn_server(reject, Vec::new())
}

/// Like [`spawn_fake_server`], and answers `play` by sending `media` on the
/// play stream. The connection then stays open and silent.
pub(crate) fn spawn_server(
    reject: bool,
    media: Vec<RtmpMessage>,
) -> (String, mpsc::Receiver<RtmpMessage>, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        server_handshake(&mut sock).unwrap();
        let mut decoder = ChunkDecoder::new();
        let encoder = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = match sock.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            for msg in decoder.decode_all(&mut buf).unwrap() {
                if let Some(ControlMessage::SetChunkSize(size)) = ControlMessage::parse(&msg) {
                    decoder.set_chunk_size(size);
                    continue;
                }
                if msg.type_id != MSG_COMMAND_AMF0 {
                    let _ = tx.send(msg);
                    continue;
                }
                let cmd = Command::parse(&msg.payload).unwrap();
                let mut replies = Vec::new();
                match cmd.name.as_str() {
                    CMD_CONNECT => replies.push(message::command_message(
                        0,
                        &Command::new(CMD_RESULT, cmd.transaction_id)
                            .arg(AmfObject::new().with("code", NC_CONNECT_SUCCESS)),
                    )),
                    CMD_CREATE_STREAM => replies.push(message::command_message(
                        0,
                        &Command::new(CMD_RESULT, cmd.transaction_id).arg(1u32),
                    )),
                    CMD_PUBLISH => {
                        let code = if reject { "NetStream.Publish.BadName" } else { NS_PUBLISH_START };
                        replies.push(message::command_message(0, &status(code)));
                    }
                    CMD_PLAY => {
                        let code = if reject { "NetStream.Play.StreamNotFound" } else { NS_PLAY_START };
                        replies.push(message::command_message(msg.stream_id, &status(code)));
                        if !reject {
                            replies.extend(media.iter().cloned());
                        }
                    }
                    _ => {}
                }
                let mut out = BytesMut::new();
                for reply in &replies {
                    encoder.encode(reply, &mut out);
                }
                if !out.is_empty() && sock.write_all(&out).is_err() {
                    return;
                }
            }
        }
    });
    (format!("rtmp://127.0.0.1:{}/live/test", port), rx, handle)
}
