//! Frame fan-out
//!
//! A [`Stream`] republishes every frame it is given to all attached sinks.
//! Peer tracks, canvas generators, URL inputs and muxer outputs are all
//! streams; RTMP publishers, raw-packet forwarders and muxer inputs are sinks.
//!
//! ```text
//!                       ┌──► FrameSink (Input of a muxer)
//!  producer ──► Stream ─┼──► FrameSink (RtmpSink)
//!                       └──► FrameSink (RawPacketSink)
//! ```
//!
//! Capabilities are split into small traits so a component can hold exactly
//! the side it needs: [`FrameProducer`] to push, [`SinkRegistry`] to attach.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::{SharedFrame, StreamKind};

/// Receives frames from a stream
pub trait FrameSink: Send + Sync {
    fn id(&self) -> &str;

    fn on_frame(&self, frame: &SharedFrame);

    /// Called when attached to a stream
    fn on_start(&self) {}

    /// Called when detached from a stream
    fn on_stop(&self) {}

    /// Bytes delivered since the previous call
    fn stat_bytes(&self) -> u64 {
        0
    }
}

/// Something frames can be pushed into
pub trait FrameProducer: Send + Sync {
    fn send_frame(&self, frame: SharedFrame);
}

/// Attach and detach sinks
pub trait SinkRegistry: Send + Sync {
    fn add_sink(&self, sink: Arc<dyn FrameSink>);

    fn remove_sink(&self, id: &str) -> Option<Arc<dyn FrameSink>>;

    fn find_sink(&self, id: &str) -> Option<Arc<dyn FrameSink>>;
}

/// Sink lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkStatus {
    Connected,
    Reconnecting,
    Error(String),
    Stopped,
}

impl SinkStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SinkStatus::Connected => "connected",
            SinkStatus::Reconnecting => "reconnecting",
            SinkStatus::Error(_) => "error",
            SinkStatus::Stopped => "stopped",
        }
    }
}

pub trait StatusObserver: Send + Sync {
    fn on_status(&self, sink_id: &str, status: SinkStatus);
}

pub struct Stream {
    id: String,
    sinks: Mutex<Vec<Arc<dyn FrameSink>>>,
    last_video: Mutex<Option<SharedFrame>>,
}

impl Stream {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sinks: Mutex::new(Vec::new()),
            last_video: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn sink_ids(&self) -> Vec<String> {
        self.sinks.lock().iter().map(|s| s.id().to_string()).collect()
    }

    /// Most recent video frame sent through this stream
    pub fn last_video(&self) -> Option<SharedFrame> {
        self.last_video.lock().clone()
    }

    /// Detach every sink
    pub fn clear_sinks(&self) {
        let sinks: Vec<_> = self.sinks.lock().drain(..).collect();
        for sink in sinks {
            sink.on_stop();
        }
    }
}

impl FrameProducer for Stream {
    fn send_frame(&self, frame: SharedFrame) {
        if frame.kind() == StreamKind::Video {
            *self.last_video.lock() = Some(frame.clone());
        }
        // deliver outside the lock so a sink may detach itself
        let sinks: Vec<_> = self.sinks.lock().clone();
        for sink in sinks {
            sink.on_frame(&frame);
        }
    }
}

impl SinkRegistry for Stream {
    fn add_sink(&self, sink: Arc<dyn FrameSink>) {
        {
            let mut sinks = self.sinks.lock();
            if sinks.iter().any(|s| s.id() == sink.id()) {
                tracing::warn!(stream = %self.id, sink = %sink.id(), "Sink already attached");
                return;
            }
            sinks.push(sink.clone());
        }
        tracing::debug!(stream = %self.id, sink = %sink.id(), "Sink attached");
        sink.on_start();
    }

    fn remove_sink(&self, id: &str) -> Option<Arc<dyn FrameSink>> {
        let removed = {
            let mut sinks = self.sinks.lock();
            let pos = sinks.iter().position(|s| s.id() == id)?;
            sinks.remove(pos)
        };
        tracing::debug!(stream = %self.id, sink = %id, "Sink detached");
        removed.on_stop();
        Some(removed)
    }

    fn find_sink(&self, id: &str) -> Option<Arc<dyn FrameSink>> {
        self.sinks.lock().iter().find(|s| s.id() == id).cloned()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("sinks", &self.sink_count())
            .finish()
    }
}
