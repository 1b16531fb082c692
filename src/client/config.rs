//! Publish connection configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::constants::{DEFAULT_PORT, PUBLISH_CHUNK_SIZE};

/// Parsed `rtmp://host[:port]/app[/...]/stream_key` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpUrl {
    pub host: String,
    pub port: u16,
    pub app: String,
    pub stream_key: Option<String>,
}

impl RtmpUrl {
    /// The app is everything between the authority and the last path
    /// segment; the last segment (with its query) is the stream key.
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || Error::InvalidUrl(url.to_string());
        let rest = url.strip_prefix("rtmp://").ok_or_else(invalid)?;
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        if authority.is_empty() {
            return Err(invalid());
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, DEFAULT_PORT),
        };

        let path = path.trim_matches('/');
        let (app, stream_key) = match path.rsplit_once('/') {
            Some((app, key)) => (app.to_string(), Some(key.to_string())),
            None => (path.to_string(), None),
        };
        if app.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            app,
            stream_key: stream_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn tc_url(&self) -> String {
        format!("rtmp://{}:{}/{}", self.host, self.port, self.app)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub connect_timeout: Duration,
    /// Timeout for each read while waiting on command responses
    pub read_timeout: Duration,
    pub chunk_size: u32,
    pub flash_ver: String,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            chunk_size: PUBLISH_CHUNK_SIZE,
            flash_ver: "FMLE/3.0 (compatible; FMSc/1.0)".into(),
        }
    }

    pub fn parse_url(&self) -> Option<RtmpUrl> {
        RtmpUrl::parse(&self.url).ok()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_url() {
        let url = RtmpUrl::parse("rtmp://live.example.com:1936/app/key123").unwrap();
        assert_eq!(url.host, "live.example.com");
        assert_eq!(url.port, 1936);
        assert_eq!(url.app, "app");
        assert_eq!(url.stream_key.as_deref(), Some("key123"));
        assert_eq!(url.tc_url(), "rtmp://live.example.com:1936/app");
    }

    #[test]
    fn test_default_port_and_nested_app() {
        let url = RtmpUrl::parse("rtmp://h/live/sub/stream?token=1").unwrap();
        assert_eq!(url.port, 1935);
        assert_eq!(url.app, "live/sub");
        assert_eq!(url.stream_key.as_deref(), Some("stream?token=1"));
    }

    #[test]
    fn test_app_without_key() {
        let url = RtmpUrl::parse("rtmp://h/live").unwrap();
        assert_eq!(url.app, "live");
        assert!(url.stream_key.is_none());
    }

    #[test]
    fn test_invalid_urls() {
        for bad in ["http://h/live/k", "rtmp://", "rtmp://h:notaport/live/k", "rtmp://h/"] {
            assert!(matches!(RtmpUrl::parse(bad), Err(Error::InvalidUrl(_))), "{bad}");
        }
    }

    #[test]
    fn test_config_builder() {
        let cfg = ClientConfig::new("rtmp://h/live/k")
            .chunk_size(0)
            .read_timeout(Duration::from_millis(50));
        assert_eq!(cfg.chunk_size, 1);
        assert_eq!(cfg.read_timeout, Duration::from_millis(50));
        assert_eq!(cfg.parse_url().unwrap().stream_key.as_deref(), Some("k"));
    }
}
