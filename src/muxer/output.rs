//! Muxer outputs

use std::sync::Arc;

use crate::frame::SharedFrame;
use crate::options::OptionMap;
use crate::stream::FrameProducer;

/// Named endpoint republishing composited frames
pub struct Output {
    name: String,
    options: OptionMap,
    producer: Arc<dyn FrameProducer>,
}

impl Output {
    pub fn new(name: impl Into<String>, producer: Arc<dyn FrameProducer>) -> Self {
        Self {
            name: name.into(),
            options: OptionMap::new(),
            producer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    pub fn push(&self, frame: SharedFrame) {
        self.producer.send_frame(frame);
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output").field("name", &self.name).finish()
    }
}
