//! Peer connection boundary
//!
//! The engine never negotiates sessions itself. A [`PeerFactory`] supplied by
//! the host creates [`PeerConnection`]s; asynchronous operations complete
//! through a oneshot [`Completion`] and the connection reports back through
//! [`PeerEvents`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::stream::Stream;

use super::event::EngineEvent;
use super::registry::Registry;
use super::source::{EngineStream, StreamSource};

/// Failure reported by a peer connection
pub type PeerError = String;

/// One-shot completion handle for an asynchronous peer operation
pub type Completion<T> = oneshot::Sender<Result<T, PeerError>>;

/// Pair of completion handle and the future the engine awaits
pub fn completion<T>() -> (Completion<T>, oneshot::Receiver<Result<T, PeerError>>) {
    oneshot::channel()
}

/// Session description kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Offer/answer options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OfferOptions {
    pub receive_audio: bool,
    pub receive_video: bool,
}

/// Connection settings taken from the `new connection` request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerConfig {
    /// Deliver compressed packets instead of decoded frames
    pub raw_packets: bool,
    pub dump_raw_packets: bool,
    /// Local ICE port range, `(0, 0)` for any
    pub port_range: (u16, u16),
    pub ice_servers: Vec<String>,
}

/// Remote ICE candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub sdp_mid: String,
    pub sdp_mline_index: u32,
    pub candidate: String,
}

/// Track exposed by `add_stream`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackInfo {
    pub id: String,
    pub kind: String,
}

pub trait PeerConnection: Send + Sync {
    fn create_offer(&self, options: OfferOptions, done: Completion<String>);

    /// Create an offer and apply it as the local description
    fn create_offer_set_local(&self, options: OfferOptions, done: Completion<String>);

    fn create_answer(&self, options: OfferOptions, done: Completion<String>);

    fn set_local_description(&self, kind: SdpType, sdp: String, done: Completion<()>);

    fn set_remote_description(&self, kind: SdpType, sdp: String, done: Completion<()>);

    /// Apply a remote offer and answer it
    fn set_remote_description_create_answer(&self, sdp: String, options: OfferOptions, done: Completion<String>);

    fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError>;

    /// Publish `stream` to the peer, returning the tracks created for it
    fn add_stream(&self, stream: Arc<Stream>) -> Result<Vec<TrackInfo>, PeerError>;

    fn stats(&self, done: Completion<serde_json::Value>);
}

pub trait PeerFactory: Send + Sync {
    fn create(&self, config: PeerConfig, events: PeerEvents) -> Result<Arc<dyn PeerConnection>, PeerError>;
}

/// Factory used when the host provides no peer stack
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPeers;

impl PeerFactory for NoPeers {
    fn create(&self, _config: PeerConfig, _events: PeerEvents) -> Result<Arc<dyn PeerConnection>, PeerError> {
        Err("peer connections are not available".into())
    }
}

/// Callbacks from a peer connection
pub enum PeerEvent {
    IceCandidate(IceCandidate),
    IceConnectionChange(String),
    IceGatheringChange(String),
    /// Remote stream with its own id
    AddStream { stream_id: String, stream: Arc<Stream> },
    RemoveStream { stream_id: String },
}

/// Event handle given to one connection.
///
/// Added remote streams are registered with the engine before the event goes
/// out, so a client may use the stream id as soon as it sees it.
#[derive(Clone)]
pub struct PeerEvents {
    conn_id: String,
    streams: Arc<Registry<Arc<EngineStream>>>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl PeerEvents {
    pub(crate) fn new(
        conn_id: String,
        streams: Arc<Registry<Arc<EngineStream>>>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            conn_id,
            streams,
            events,
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn emit(&self, event: PeerEvent) {
        let id = self.conn_id.clone();
        let out = match event {
            PeerEvent::IceCandidate(c) => EngineEvent::IceCandidate {
                id,
                sdp_mid: c.sdp_mid,
                sdp_mline_index: c.sdp_mline_index,
                candidate: c.candidate,
            },
            PeerEvent::IceConnectionChange(state) => EngineEvent::IceConnectionChange { id, state },
            PeerEvent::IceGatheringChange(state) => EngineEvent::IceGatheringChange { id, state },
            PeerEvent::AddStream { stream_id, stream } => {
                let entry = EngineStream::new(stream, StreamSource::Peer(id.clone()));
                self.streams.insert(stream_id.clone(), Arc::new(entry));
                EngineEvent::ConnAddStream { id, stream_id }
            }
            PeerEvent::RemoveStream { stream_id } => EngineEvent::ConnRemoveStream { id, stream_id },
        };
        if self.events.send(out).is_err() {
            tracing::debug!(conn = %self.conn_id, "Event receiver closed");
        }
    }
}

impl std::fmt::Debug for PeerEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerEvents").field("conn_id", &self.conn_id).finish()
    }
}

/// Scriptable in-process peer for tests
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub(crate) struct MockPeer {
        pub(crate) candidates: Mutex<Vec<IceCandidate>>,
        pub(crate) remote: Mutex<Option<(SdpType, String)>>,
        pub(crate) local: Mutex<Option<(SdpType, String)>>,
        pub(crate) events: Mutex<Option<PeerEvents>>,
    }

    impl PeerConnection for MockPeer {
        fn create_offer(&self, options: OfferOptions, done: Completion<String>) {
            let _ = done.send(Ok(format!("v=0 offer audio={} video={}", options.receive_audio, options.receive_video)));
        }

        fn create_offer_set_local(&self, options: OfferOptions, done: Completion<String>) {
            let sdp = format!("v=0 offer audio={} video={}", options.receive_audio, options.receive_video);
            *self.local.lock() = Some((SdpType::Offer, sdp.clone()));
            let _ = done.send(Ok(sdp));
        }

        fn create_answer(&self, _options: OfferOptions, done: Completion<String>) {
            let _ = done.send(Ok("v=0 answer".into()));
        }

        fn set_local_description(&self, kind: SdpType, sdp: String, done: Completion<()>) {
            *self.local.lock() = Some((kind, sdp));
            let _ = done.send(Ok(()));
        }

        fn set_remote_description(&self, kind: SdpType, sdp: String, done: Completion<()>) {
            if !sdp.starts_with("v=0") {
                let _ = done.send(Err("bad sdp".into()));
                return;
            }
            *self.remote.lock() = Some((kind, sdp));
            let _ = done.send(Ok(()));
        }

        fn set_remote_description_create_answer(&self, sdp: String, _options: OfferOptions, done: Completion<String>) {
            *self.remote.lock() = Some((SdpType::Offer, sdp));
            let _ = done.send(Ok("v=0 answer".into()));
        }

        fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
            if candidate.candidate.is_empty() {
                return Err("empty candidate".into());
            }
            self.candidates.lock().push(candidate);
            Ok(())
        }

        fn add_stream(&self, stream: Arc<Stream>) -> Result<Vec<TrackInfo>, PeerError> {
            Ok(vec![
                TrackInfo {
                    id: format!("{}-video", stream.id()),
                    kind: "video".into(),
                },
                TrackInfo {
                    id: format!("{}-audio", stream.id()),
                    kind: "audio".into(),
                },
            ])
        }

        fn stats(&self, done: Completion<serde_json::Value>) {
            let _ = done.send(Ok(serde_json::json!({ "candidates": self.candidates.lock().len() })));
        }
    }

    /// Hands out one shared [`MockPeer`] and keeps its event handle
    #[derive(Default)]
    pub(crate) struct MockPeers {
        pub(crate) peer: Arc<MockPeer>,
        pub(crate) configs: Mutex<Vec<PeerConfig>>,
    }

    impl PeerFactory for MockPeers {
        fn create(&self, config: PeerConfig, events: PeerEvents) -> Result<Arc<dyn PeerConnection>, PeerError> {
            self.configs.lock().push(config);
            *self.peer.events.lock() = Some(events);
            Ok(self.peer.clone())
        }
    }
}
