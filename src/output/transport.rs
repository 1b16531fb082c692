//! Where sender tags end up
//!
//! `rtmp://` URLs publish over the network; anything else is treated as a
//! local FLV file path.

use std::fs::File;
use std::io::BufWriter;

use crate::client::{ClientConfig, RtmpPublisher};
use crate::error::Result;
use crate::media::{FlvTag, FlvWriter};

use super::config::SenderConfig;

/// Destination for FLV tag bodies
pub trait TagTransport: Send {
    /// Write one tag; returns the bytes produced
    fn write_tag(&mut self, tag: &FlvTag) -> Result<usize>;

    /// Local file rather than a network peer
    fn is_file(&self) -> bool {
        false
    }

    /// Bytes written while opening (file header, handshake)
    fn setup_bytes(&self) -> usize {
        0
    }
}

/// Opens transports for a sender
pub trait TransportFactory: Send + Sync {
    fn open(&self, url: &str, config: &SenderConfig) -> Result<Box<dyn TagTransport>>;
}

pub fn is_rtmp_url(url: &str) -> bool {
    url.starts_with("rtmp://")
}

/// RTMP publisher or FLV file, picked by URL scheme
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn open(&self, url: &str, config: &SenderConfig) -> Result<Box<dyn TagTransport>> {
        if is_rtmp_url(url) {
            tracing::info!(url = %url, "Connecting");
            let client = ClientConfig::new(url)
                .chunk_size(config.chunk_size)
                .connect_timeout(config.connect_timeout)
                .read_timeout(config.read_timeout);
            Ok(Box::new(RtmpPublisher::connect(&client)?))
        } else {
            tracing::info!(path = %url, "Creating FLV file");
            Ok(Box::new(FlvFileTransport::create(url)?))
        }
    }
}

impl TagTransport for RtmpPublisher {
    fn write_tag(&mut self, tag: &FlvTag) -> Result<usize> {
        RtmpPublisher::write_tag(self, tag)
    }
}

/// FLV file, flushed after every tag
pub struct FlvFileTransport {
    writer: FlvWriter<BufWriter<File>>,
}

impl FlvFileTransport {
    pub fn create(path: &str) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = FlvWriter::new(BufWriter::new(file));
        writer.write_header(true, true)?;
        writer.flush()?;
        Ok(Self { writer })
    }
}

impl TagTransport for FlvFileTransport {
    fn write_tag(&mut self, tag: &FlvTag) -> Result<usize> {
        let n = self.writer.write_tag(tag)?;
        self.writer.flush()?;
        Ok(n)
    }

    fn is_file(&self) -> bool {
        true
    }

    fn setup_bytes(&self) -> usize {
        crate::media::flv::FLV_HEADER_SIZE + 4
    }
}
