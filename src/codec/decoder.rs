//! Lazy decoder

use std::ops::ControlFlow;
use std::sync::Arc;

use super::{CodecFactory, DecoderBackend, DecoderParams, SendStatus};
use crate::error::Result;
use crate::frame::{Codec, MediaFrame, MediaPacket};

/// Opens its backend from the first packet and keeps it for the whole stream
pub struct Decoder {
    factory: Arc<dyn CodecFactory>,
    backend: Option<Box<dyn DecoderBackend>>,
    codec: Option<Codec>,
}

impl Decoder {
    pub fn new(factory: Arc<dyn CodecFactory>) -> Self {
        Self {
            factory,
            backend: None,
            codec: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn codec(&self) -> Option<Codec> {
        self.codec
    }

    /// Decode `packet`, calling `on_frame` for every frame produced.
    ///
    /// Draining stops early when `on_frame` breaks.
    pub fn decode(
        &mut self,
        packet: &MediaPacket,
        mut on_frame: impl FnMut(MediaFrame) -> ControlFlow<()>,
    ) -> Result<()> {
        if self.backend.is_none() {
            let params = DecoderParams::from_packet(packet);
            let backend = self.factory.open_decoder(&params)?;
            tracing::info!(codec = packet.codec.name(), "Decoder opened");
            self.backend = Some(backend);
            self.codec = Some(packet.codec);
        }
        let Some(backend) = self.backend.as_mut() else {
            return Ok(());
        };

        loop {
            let status = backend.send_packet(packet)?;
            if drain(&mut **backend, &mut on_frame)?.is_break() {
                return Ok(());
            }
            if status == SendStatus::Accepted {
                return Ok(());
            }
        }
    }
}

fn drain(
    backend: &mut dyn DecoderBackend,
    on_frame: &mut impl FnMut(MediaFrame) -> ControlFlow<()>,
) -> Result<ControlFlow<()>> {
    while let Some(frame) = backend.receive_frame()? {
        if on_frame(frame).is_break() {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder").field("codec", &self.codec).finish()
    }
}
