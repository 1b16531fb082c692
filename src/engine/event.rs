//! Unsolicited notifications sent to the control client

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::output::RawPacketObserver;
use crate::stream::{SinkStatus, StatusObserver};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    IceCandidate {
        id: String,
        sdp_mid: String,
        sdp_mline_index: u32,
        candidate: String,
    },
    IceConnectionChange {
        id: String,
        state: String,
    },
    IceGatheringChange {
        id: String,
        state: String,
    },
    ConnAddStream {
        id: String,
        stream_id: String,
    },
    ConnRemoveStream {
        id: String,
        stream_id: String,
    },
    SinkRawPacket {
        sink_id: String,
        pts: i64,
        data: Bytes,
    },
    SinkStatus {
        sink_id: String,
        status: SinkStatus,
    },
}

impl EngineEvent {
    /// Message type on the control channel
    pub fn message_type(&self) -> &'static str {
        match self {
            EngineEvent::IceCandidate { .. } => "on-ice-candidate",
            EngineEvent::IceConnectionChange { .. } => "on-ice-conn-state-change",
            EngineEvent::IceGatheringChange { .. } => "on-ice-gathering-change",
            EngineEvent::ConnAddStream { .. } => "on-conn-add-stream",
            EngineEvent::ConnRemoveStream { .. } => "on-conn-remove-stream",
            EngineEvent::SinkRawPacket { .. } => "on-sink-rawpkt",
            EngineEvent::SinkStatus { .. } => "on-sink-status",
        }
    }

    /// Message body.
    ///
    /// The ICE candidate is nested as a JSON string with the line index
    /// rendered as a string, the shape browsers hand back to
    /// `addIceCandidate`.
    pub fn to_json(&self) -> Value {
        match self {
            EngineEvent::IceCandidate {
                id,
                sdp_mid,
                sdp_mline_index,
                candidate,
            } => {
                let inner = json!({
                    "sdpMid": sdp_mid,
                    "sdpMLineIndex": sdp_mline_index.to_string(),
                    "candidate": candidate,
                });
                json!({ "id": id, "candidate": inner.to_string() })
            }
            EngineEvent::IceConnectionChange { id, state } | EngineEvent::IceGatheringChange { id, state } => {
                json!({ "id": id, "state": state })
            }
            EngineEvent::ConnAddStream { id, stream_id } | EngineEvent::ConnRemoveStream { id, stream_id } => {
                json!({ "id": id, "streamId": stream_id })
            }
            EngineEvent::SinkRawPacket { sink_id, pts, data } => {
                json!({ "id": sink_id, "pts": pts, "rawpkt": data.as_ref() })
            }
            EngineEvent::SinkStatus { sink_id, status } => {
                let mut body = json!({ "sinkId": sink_id, "status": status.as_str() });
                if let SinkStatus::Error(message) = status {
                    body["error"] = Value::from(message.as_str());
                }
                body
            }
        }
    }
}

/// Turns sink callbacks into [`EngineEvent`]s
#[derive(Debug, Clone)]
pub(crate) struct EventForwarder {
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl EventForwarder {
    pub(crate) fn new(events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { events }
    }

    fn send(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Event receiver closed");
        }
    }
}

impl StatusObserver for EventForwarder {
    fn on_status(&self, sink_id: &str, status: SinkStatus) {
        self.send(EngineEvent::SinkStatus {
            sink_id: sink_id.to_string(),
            status,
        });
    }
}

impl RawPacketObserver for EventForwarder {
    fn on_raw_packet(&self, sink_id: &str, pts: i64, data: Bytes) {
        self.send(EngineEvent::SinkRawPacket {
            sink_id: sink_id.to_string(),
            pts,
            data,
        });
    }
}
