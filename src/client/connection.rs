//! Blocking RTMP connection shared by the publisher and the player
//!
//! Owns the socket and the chunk codecs, answers acknowledgement windows and
//! applies protocol control messages as they arrive. Media that shows up
//! while a command reply is awaited is queued for [`RtmpConnection::read_message`].

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use bytes::BytesMut;

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, RtmpMessage};
use crate::protocol::constants::*;
use crate::protocol::handshake::client_handshake;
use crate::protocol::message::{self, Command, ConnectParams, ControlMessage};

use super::config::{ClientConfig, RtmpUrl};

pub(crate) struct RtmpConnection {
    socket: TcpStream,
    encoder: ChunkEncoder,
    decoder: ChunkDecoder,
    read_buf: BytesMut,
    write_buf: BytesMut,
    pending: VecDeque<RtmpMessage>,
    next_transaction: f64,
    ack_window: u32,
    received: u64,
    last_ack: u64,
}

impl RtmpConnection {
    /// TCP connect and handshake; every later read times out after
    /// `config.read_timeout`
    pub(crate) fn open(url: &RtmpUrl, config: &ClientConfig) -> Result<Self> {
        let addr = url
            .address()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::InvalidUrl(config.url.clone()))?;
        let socket = TcpStream::connect_timeout(&addr, config.connect_timeout)?;
        socket.set_nodelay(true)?;
        socket.set_read_timeout(Some(config.read_timeout))?;

        let mut conn = Self {
            socket,
            encoder: ChunkEncoder::new(),
            decoder: ChunkDecoder::new(),
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(8192),
            pending: VecDeque::new(),
            next_transaction: 1.0,
            ack_window: DEFAULT_WINDOW_ACK_SIZE,
            received: 0,
            last_ack: 0,
        };
        client_handshake(&mut conn.socket)?;
        Ok(conn)
    }

    /// `connect` to the URL's application
    pub(crate) fn connect_app(&mut self, url: &RtmpUrl, config: &ClientConfig) -> Result<()> {
        let mut params = ConnectParams::new(url.app.clone(), url.tc_url());
        params.flash_ver = config.flash_ver.clone();
        let tid = self.transaction();
        self.send_command(0, &Command::connect(tid, &params))?;
        self.wait_result(tid, ProtocolError::ConnectRejected)?;
        Ok(())
    }

    pub(crate) fn create_stream(&mut self) -> Result<u32> {
        let tid = self.transaction();
        self.send_command(0, &Command::create_stream(tid))?;
        let result = self.wait_result(tid, ProtocolError::UnexpectedResponse)?;
        result
            .arguments
            .first()
            .and_then(|v| v.as_number())
            .map(|n| n as u32)
            .ok_or_else(|| ProtocolError::UnexpectedResponse("createStream without stream id".into()).into())
    }

    pub(crate) fn set_chunk_size(&mut self, size: u32) -> Result<()> {
        self.send(&message::set_chunk_size(size))?;
        self.encoder.set_chunk_size(size);
        Ok(())
    }

    pub(crate) fn transaction(&mut self) -> f64 {
        let tid = self.next_transaction;
        self.next_transaction += 1.0;
        tid
    }

    /// Wait for `_result`/`_error` of `tid`
    pub(crate) fn wait_result(&mut self, tid: f64, reject: fn(String) -> ProtocolError) -> Result<Command> {
        self.wait_for(|cmd| {
            if cmd.transaction_id != tid {
                return None;
            }
            match cmd.name.as_str() {
                CMD_RESULT => Some(Ok(cmd.clone())),
                CMD_ERROR => Some(Err(reject(cmd.description()).into())),
                _ => None,
            }
        })
    }

    /// Read commands until `handle` returns a value. Other messages are
    /// queued for [`read_message`](Self::read_message).
    pub(crate) fn wait_for<T>(&mut self, mut handle: impl FnMut(&Command) -> Option<Result<T>>) -> Result<T> {
        loop {
            let msg = self.next_message()?;
            if msg.type_id != MSG_COMMAND_AMF0 {
                self.pending.push_back(msg);
                continue;
            }
            let cmd = Command::parse(&msg.payload)?;
            tracing::debug!(name = %cmd.name, tid = cmd.transaction_id, "Command received");
            if let Some(result) = handle(&cmd) {
                return result;
            }
        }
    }

    /// Next message that is not a protocol control message
    pub(crate) fn read_message(&mut self) -> Result<RtmpMessage> {
        match self.pending.pop_front() {
            Some(msg) => Ok(msg),
            None => self.next_message(),
        }
    }

    fn next_message(&mut self) -> Result<RtmpMessage> {
        loop {
            while let Some(msg) = self.decoder.decode(&mut self.read_buf)? {
                match ControlMessage::parse(&msg) {
                    Some(control) => self.apply_control(control),
                    None => return Ok(msg),
                }
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; 4096];
        let n = match self.socket.read(&mut chunk) {
            Ok(0) => return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into()),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => return Err(Error::Timeout),
            Err(e) => return Err(e.into()),
        };
        self.read_buf.extend_from_slice(&chunk[..n]);
        self.received += n as u64;
        if self.received - self.last_ack >= self.ack_window as u64 {
            self.last_ack = self.received;
            self.send(&message::acknowledgement(self.received as u32))?;
        }
        Ok(())
    }

    fn apply_control(&mut self, control: ControlMessage) {
        match control {
            ControlMessage::SetChunkSize(size) => self.decoder.set_chunk_size(size),
            ControlMessage::WindowAckSize(size) => self.ack_window = size.max(1),
            other => tracing::trace!(?other, "Control message"),
        }
    }

    pub(crate) fn send_command(&mut self, stream_id: u32, cmd: &Command) -> Result<usize> {
        self.send(&message::command_message(stream_id, cmd))
    }

    pub(crate) fn send(&mut self, msg: &RtmpMessage) -> Result<usize> {
        self.write_buf.clear();
        self.encoder.encode(msg, &mut self.write_buf);
        self.socket.write_all(&self.write_buf)?;
        Ok(self.write_buf.len())
    }
}
