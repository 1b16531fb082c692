//! Request bodies
//!
//! Every field is optional on the wire; missing values take their defaults and
//! the handlers decide what is required.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::CommandError;
use crate::options::{keys, OptionMap, StretchMode};

use super::peer::{IceCandidate, OfferOptions};

/// Decode a request body, mapping shape errors to `InvalidParams`
pub(crate) fn parse<T: DeserializeOwned>(body: Value) -> Result<T, CommandError> {
    let body = if body.is_null() { Value::Object(Default::default()) } else { body };
    serde_json::from_value(body).map_err(|e| CommandError::invalid_params(e.to_string()))
}

/// Required non-empty string field
pub(crate) fn required<'a>(value: &'a str, name: &str) -> Result<&'a str, CommandError> {
    if value.is_empty() {
        return Err(CommandError::invalid_params(name));
    }
    Ok(value)
}

/// Largest accepted picture width or height
pub const MAX_DIMENSION: i64 = crate::frame::MAX_DIMENSION as i64;

/// Input offsets and z-order are clamped to this magnitude
pub const MAX_OFFSET: i64 = 1 << 20;

/// Reject negative or oversized picture dimensions
pub(crate) fn check_size(w: i64, h: i64) -> Result<(), CommandError> {
    if !(0..=MAX_DIMENSION).contains(&w) || !(0..=MAX_DIMENSION).contains(&h) {
        return Err(CommandError::invalid_params(format!("invalid w or h: {}x{}", w, h)));
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IdRequest {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IceServer {
    pub urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewConnRequest {
    pub rawpkt: bool,
    pub dump_rawpkt: bool,
    pub min_port: i64,
    pub max_port: i64,
    pub ice_servers: Vec<IceServer>,
}

impl NewConnRequest {
    /// Port range, `(0, 0)` unless `0 < min <= max <= limit`
    pub fn port_range(&self, limit: u16) -> (u16, u16) {
        let limit = i64::from(limit);
        if self.min_port > 0 && self.min_port <= self.max_port && self.max_port <= limit {
            (self.min_port as u16, self.max_port as u16)
        } else {
            (0, 0)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OfferRequest {
    pub id: String,
    pub audio: bool,
    pub video: bool,
}

impl OfferRequest {
    pub fn options(&self) -> OfferOptions {
        OfferOptions {
            receive_audio: self.audio,
            receive_video: self.video,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DescRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
    pub audio: bool,
    pub video: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IceRequest {
    pub id: String,
    pub candidate: String,
}

/// `sdpMLineIndex` arrives as a number from some clients and a string from others
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LineIndex {
    Number(u32),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateBody {
    sdp_mid: String,
    #[serde(rename = "sdpMLineIndex")]
    sdp_mline_index: LineIndex,
    candidate: String,
}

/// Parse the JSON document carried in the `candidate` field
pub fn parse_candidate(text: &str) -> Result<IceCandidate, CommandError> {
    let body: CandidateBody =
        serde_json::from_str(text).map_err(|e| CommandError::invalid_params(format!("candidate: {}", e)))?;
    let sdp_mline_index = match body.sdp_mline_index {
        LineIndex::Number(n) => n,
        LineIndex::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| CommandError::invalid_params("sdpMLineIndex"))?,
    };
    Ok(IceCandidate {
        sdp_mid: body.sdp_mid,
        sdp_mline_index,
        candidate: body.candidate,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamRequest {
    pub id: String,
    pub stream_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewMuxerRequest {
    pub w: i64,
    pub h: i64,
    pub fps: i64,
    pub audio_only: bool,
}

/// Placement and behaviour of one muxer input
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputOpt {
    pub w: i64,
    pub h: i64,
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub hidden: bool,
    pub muted: bool,
    #[serde(rename = "supportSEI")]
    pub support_sei: bool,
    pub stretch_mode: String,
}

impl InputOpt {
    pub fn validate(&self) -> Result<(), CommandError> {
        check_size(self.w, self.h)
    }

    /// Write these settings into an input's options.
    ///
    /// A zero width or height hides the input regardless of `hidden`.
    pub fn apply(&self, options: &OptionMap) {
        let hidden = self.w == 0 || self.h == 0 || self.hidden;
        options.set_bool(keys::HIDDEN, hidden);
        options.set_int(keys::WIDTH, self.w);
        options.set_int(keys::HEIGHT, self.h);
        options.set_bool(keys::SUPPORT_SEI, self.support_sei);
        options.set_int(keys::X, self.x.clamp(-MAX_OFFSET, MAX_OFFSET));
        options.set_int(keys::Y, self.y.clamp(-MAX_OFFSET, MAX_OFFSET));
        options.set_int(keys::Z, self.z.clamp(-MAX_OFFSET, MAX_OFFSET));
        options.set_bool(keys::MUTED, self.muted);
        if !self.stretch_mode.is_empty() {
            let mode = StretchMode::parse(&self.stretch_mode).unwrap_or_default();
            options.set_int(keys::STRETCH_MODE, mode.to_int());
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddInputRequest {
    pub id: String,
    pub stream_id: String,
    pub opt: InputOpt,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputEntry {
    pub stream_id: String,
    pub opt: InputOpt,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReplaceInputsRequest {
    pub id: String,
    pub opts: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InputOptEntry {
    pub id: String,
    pub opt: InputOpt,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SetInputsOptRequest {
    pub id: String,
    pub inputs: Vec<InputOptEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddSinkRequest {
    pub id: String,
    pub raw: bool,
    pub url: String,
    pub kbps: i64,
    pub min_rate: i64,
    pub max_rate: i64,
    pub gop: i64,
    pub fps: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SinkRequest {
    pub id: String,
    pub sink_id: String,
    pub dont_reconnect: bool,
    #[serde(rename = "seiKey")]
    pub sei_key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CanvasRequest {
    pub fps: i64,
    pub w: i64,
    pub h: i64,
    pub bg: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UrlStreamRequest {
    pub url: String,
    pub is_pic: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPacketRequest {
    pub id: String,
    pub rawpkt: Vec<u8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PushSeiRequest {
    #[serde(rename = "seiKey")]
    pub sei_key: String,
    pub payload: Vec<u8>,
}
