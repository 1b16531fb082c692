//! Raw packet forwarding sink

use std::sync::Arc;

use bytes::Bytes;

use crate::frame::SharedFrame;
use crate::stats::ByteCounter;
use crate::stream::FrameSink;

/// Receives the payload of every raw frame a [`RawPacketSink`] sees
pub trait RawPacketObserver: Send + Sync {
    fn on_raw_packet(&self, sink_id: &str, pts: i64, data: Bytes);
}

/// Hands raw packets to an observer unchanged; decoded frames are ignored
pub struct RawPacketSink {
    id: String,
    observer: Arc<dyn RawPacketObserver>,
    bytes: ByteCounter,
}

impl RawPacketSink {
    pub fn new(id: impl Into<String>, observer: Arc<dyn RawPacketObserver>) -> Self {
        Self {
            id: id.into(),
            observer,
            bytes: ByteCounter::new(),
        }
    }
}

impl FrameSink for RawPacketSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_frame(&self, frame: &SharedFrame) {
        let Some(packet) = frame.as_raw() else {
            return;
        };
        self.bytes.add(packet.data.len() as u64);
        self.observer.on_raw_packet(&self.id, frame.pts, packet.data.clone());
    }

    fn stat_bytes(&self) -> u64 {
        self.bytes.take()
    }
}

impl std::fmt::Debug for RawPacketSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawPacketSink").field("id", &self.id).finish()
    }
}
