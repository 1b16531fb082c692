//! RTMP message payloads
//!
//! Commands (`connect`, `createStream`, `publish`, ...) are AMF0 sequences of
//! name, transaction id, command object and arguments. Protocol control
//! messages carry a single big-endian u32.

use bytes::{BufMut, Bytes, BytesMut};

use crate::amf::{amf0, AmfObject, AmfValue};
use crate::error::{AmfError, ProtocolError, Result};
use crate::protocol::chunk::RtmpMessage;
use crate::protocol::constants::*;

/// Parameters of the `connect` command object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectParams {
    pub app: String,
    pub tc_url: String,
    pub flash_ver: String,
    pub swf_url: Option<String>,
}

impl ConnectParams {
    pub fn new(app: impl Into<String>, tc_url: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            tc_url: tc_url.into(),
            flash_ver: "FMLE/3.0 (compatible; FMSc/1.0)".into(),
            swf_url: None,
        }
    }

    fn to_object(&self) -> AmfObject {
        let mut obj = AmfObject::new()
            .with("app", self.app.as_str())
            .with("type", "nonprivate")
            .with("flashVer", self.flash_ver.as_str());
        if let Some(swf) = &self.swf_url {
            obj.insert("swfUrl", swf.as_str());
        }
        obj.with("tcUrl", self.tc_url.as_str())
    }
}

/// Decoded AMF0 command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub command_object: AmfValue,
    pub arguments: Vec<AmfValue>,
}

impl Command {
    pub fn new(name: impl Into<String>, transaction_id: f64) -> Self {
        Self {
            name: name.into(),
            transaction_id,
            command_object: AmfValue::Null,
            arguments: Vec::new(),
        }
    }

    pub fn object(mut self, obj: impl Into<AmfValue>) -> Self {
        self.command_object = obj.into();
        self
    }

    pub fn arg(mut self, value: impl Into<AmfValue>) -> Self {
        self.arguments.push(value.into());
        self
    }

    pub fn connect(transaction_id: f64, params: &ConnectParams) -> Self {
        Self::new(CMD_CONNECT, transaction_id).object(params.to_object())
    }

    pub fn release_stream(transaction_id: f64, stream: &str) -> Self {
        Self::new(CMD_RELEASE_STREAM, transaction_id).arg(stream)
    }

    pub fn fc_publish(transaction_id: f64, stream: &str) -> Self {
        Self::new(CMD_FC_PUBLISH, transaction_id).arg(stream)
    }

    pub fn create_stream(transaction_id: f64) -> Self {
        Self::new(CMD_CREATE_STREAM, transaction_id)
    }

    pub fn publish(transaction_id: f64, stream: &str) -> Self {
        Self::new(CMD_PUBLISH, transaction_id).arg(stream).arg("live")
    }

    /// Live playback from the start of whatever is being published
    pub fn play(transaction_id: f64, stream: &str) -> Self {
        Self::new(CMD_PLAY, transaction_id).arg(stream).arg(-2.0)
    }

    pub fn encode(&self) -> Bytes {
        let mut values = Vec::with_capacity(3 + self.arguments.len());
        values.push(AmfValue::String(self.name.clone()));
        values.push(AmfValue::Number(self.transaction_id));
        values.push(self.command_object.clone());
        values.extend(self.arguments.iter().cloned());
        amf0::encode_all(&values)
    }

    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut values = amf0::decode_all(payload)?.into_iter();
        let name = match values.next() {
            Some(AmfValue::String(name)) => name,
            Some(_) => return Err(ProtocolError::UnexpectedResponse("command name is not a string".into()).into()),
            None => return Err(AmfError::UnexpectedEof.into()),
        };
        let transaction_id = values.next().and_then(|v| v.as_number()).unwrap_or(0.0);
        let command_object = values.next().unwrap_or_default();
        Ok(Self {
            name,
            transaction_id,
            command_object,
            arguments: values.collect(),
        })
    }

    /// `code` of the first info object among the arguments
    pub fn status_code(&self) -> Option<&str> {
        self.arguments.iter().find_map(|a| a.get_string("code"))
    }

    pub fn description(&self) -> String {
        self.arguments
            .iter()
            .find_map(|a| a.get_string("description").or_else(|| a.get_string("code")))
            .unwrap_or(self.name.as_str())
            .to_string()
    }
}

/// `@setDataFrame onMetaData {props}` data message payload
pub fn metadata(properties: AmfObject) -> Bytes {
    amf0::encode_all(&[
        AmfValue::String(CMD_SET_DATA_FRAME.into()),
        AmfValue::String(ON_METADATA.into()),
        AmfValue::Object(properties),
    ])
}

fn u32_payload(value: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32(value);
    buf.freeze()
}

pub fn set_chunk_size(size: u32) -> RtmpMessage {
    RtmpMessage::new(CSID_PROTOCOL, MSG_SET_CHUNK_SIZE, 0, 0, u32_payload(size & MAX_CHUNK_SIZE))
}

pub fn window_ack_size(size: u32) -> RtmpMessage {
    RtmpMessage::new(CSID_PROTOCOL, MSG_WINDOW_ACK_SIZE, 0, 0, u32_payload(size))
}

pub fn acknowledgement(sequence: u32) -> RtmpMessage {
    RtmpMessage::new(CSID_PROTOCOL, MSG_ACKNOWLEDGEMENT, 0, 0, u32_payload(sequence))
}

pub fn command_message(stream_id: u32, command: &Command) -> RtmpMessage {
    RtmpMessage::new(CSID_COMMAND, MSG_COMMAND_AMF0, stream_id, 0, command.encode())
}

/// Incoming protocol control message
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    SetChunkSize(u32),
    WindowAckSize(u32),
    SetPeerBandwidth(u32, u8),
    Acknowledgement(u32),
    /// Event type and raw event data
    UserControl(u16, Bytes),
}

impl ControlMessage {
    pub fn parse(msg: &RtmpMessage) -> Option<Self> {
        let p = &msg.payload;
        let be32 = || (p.len() >= 4).then(|| u32::from_be_bytes([p[0], p[1], p[2], p[3]]));
        match msg.type_id {
            MSG_SET_CHUNK_SIZE => be32().map(|v| ControlMessage::SetChunkSize(v & MAX_CHUNK_SIZE)),
            MSG_WINDOW_ACK_SIZE => be32().map(ControlMessage::WindowAckSize),
            MSG_ACKNOWLEDGEMENT => be32().map(ControlMessage::Acknowledgement),
            MSG_SET_PEER_BANDWIDTH => {
                let size = be32()?;
                Some(ControlMessage::SetPeerBandwidth(size, p.get(4).copied().unwrap_or(2)))
            }
            MSG_USER_CONTROL if p.len() >= 2 => Some(ControlMessage::UserControl(
                u16::from_be_bytes([p[0], p[1]]),
                p.slice(2..),
            )),
            _ => None,
        }
    }
}
