//! Registered streams and what feeds them

use std::sync::Arc;

use crate::input::Input;
use crate::stream::Stream;

use super::canvas::CanvasStream;

/// Producer behind a registered stream
#[derive(Debug)]
pub enum StreamSource {
    /// Remote track of the connection with this id
    Peer(String),
    /// Composite output of the muxer with this id
    Muxer(String),
    Canvas(CanvasStream),
    Url(Arc<Input>),
    /// Packets pushed over the control channel
    Raw,
}

#[derive(Debug)]
pub struct EngineStream {
    stream: Arc<Stream>,
    source: StreamSource,
}

impl EngineStream {
    pub fn new(stream: Arc<Stream>, source: StreamSource) -> Self {
        Self { stream, source }
    }

    pub fn stream(&self) -> &Arc<Stream> {
        &self.stream
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.source, StreamSource::Raw)
    }

    /// Stop the producer and detach every sink. Blocks on worker threads.
    pub fn stop(&self) {
        match &self.source {
            StreamSource::Canvas(canvas) => canvas.stop(),
            StreamSource::Url(input) => input.stop(),
            StreamSource::Peer(_) | StreamSource::Muxer(_) | StreamSource::Raw => {}
        }
        self.stream.clear_sinks();
    }
}
