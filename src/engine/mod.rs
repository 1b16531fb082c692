//! Command surface
//!
//! [`Engine`] owns every connection, stream, muxer and sink created over the
//! control channel and turns named requests into operations on them:
//!
//! ```text
//!  control pump ──► Engine::handle(op, body)
//!                      │
//!                      ├─► conns    (PeerConnection)
//!                      ├─► streams  (peer tracks, canvases, URLs, raw, muxer outputs)
//!                      ├─► muxers   (AvMuxer)
//!                      ├─► sinks    (RtmpSink handles)
//!                      └─► SEI queues
//!
//!  peers / sinks ──► EngineEvent ──► unbounded channel ──► control pump
//! ```
//!
//! Each registry has its own lock. Handlers clone an entry out and release the
//! lock before acting on it, and anything that joins a worker thread runs on
//! the blocking pool.

pub mod canvas;
pub mod config;
pub mod event;
pub mod peer;
pub mod registry;
pub mod request;
pub mod source;

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::codec::{CodecFactory, RawCodecFactory, SeiQueues};
use crate::error::CommandError;
use crate::frame::{Codec, MediaFrame, MediaPacket, StreamKind};
use crate::input::{DefaultSourceOpener, Input, SourceOpener};
use crate::muxer::{AvMuxer, MuxerConfig};
use crate::options::keys;
use crate::output::{DefaultTransportFactory, RawPacketSink, RtmpSink, TransportFactory};
use crate::stream::{FrameProducer, FrameSink, SinkRegistry, Stream};
use crate::sync::{Clock, SystemClock};

pub use canvas::CanvasStream;
pub use config::{CanvasConfig, EngineConfig};
pub use event::EngineEvent;
pub use peer::{
    completion, Completion, IceCandidate, NoPeers, OfferOptions, PeerConfig, PeerConnection, PeerError,
    PeerEvent, PeerEvents, PeerFactory, SdpType, TrackInfo,
};
pub use registry::Registry;
pub use source::{EngineStream, StreamSource};

use event::EventForwarder;
use request::{
    check_size, parse, required, AddInputRequest, AddSinkRequest, CanvasRequest, DescRequest, IceRequest, IdRequest,
    InputEntry, NewConnRequest, NewMuxerRequest, OfferRequest, PushSeiRequest, RawPacketRequest,
    ReplaceInputsRequest, SetInputsOptRequest, SinkRequest, StreamRequest, UrlStreamRequest,
};

type CommandResult = Result<Value, CommandError>;

/// Fresh 16-character object id
pub fn new_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

fn positive(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

async fn wait<T>(done: oneshot::Receiver<Result<T, PeerError>>) -> Result<T, CommandError> {
    match done.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CommandError::invalid_params(e)),
        Err(_) => Err(CommandError::invalid_params("peer dropped the request")),
    }
}

pub struct Engine {
    config: EngineConfig,
    conns: Registry<Arc<dyn PeerConnection>>,
    streams: Arc<Registry<Arc<EngineStream>>>,
    muxers: Registry<Arc<AvMuxer>>,
    sinks: Registry<Arc<RtmpSink>>,
    sei: Arc<SeiQueues>,
    codecs: Arc<dyn CodecFactory>,
    opener: Arc<dyn SourceOpener>,
    transports: Arc<dyn TransportFactory>,
    peers: Arc<dyn PeerFactory>,
    clock: Arc<dyn Clock>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl Engine {
    /// Create an engine and the receiver its events are delivered to
    pub fn new(config: EngineConfig) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            config,
            conns: Registry::new("conn"),
            streams: Arc::new(Registry::new("stream")),
            muxers: Registry::new("muxer"),
            sinks: Registry::new("sink"),
            sei: Arc::new(SeiQueues::new()),
            codecs: Arc::new(RawCodecFactory),
            opener: Arc::new(DefaultSourceOpener),
            transports: Arc::new(DefaultTransportFactory),
            peers: Arc::new(NoPeers),
            clock: Arc::new(SystemClock::new()),
            events,
        };
        (engine, rx)
    }

    pub fn with_codecs(mut self, codecs: Arc<dyn CodecFactory>) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_source_opener(mut self, opener: Arc<dyn SourceOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_transports(mut self, transports: Arc<dyn TransportFactory>) -> Self {
        self.transports = transports;
        self
    }

    pub fn with_peers(mut self, peers: Arc<dyn PeerFactory>) -> Self {
        self.peers = peers;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sei(&self) -> &Arc<SeiQueues> {
        &self.sei
    }

    pub fn stream(&self, id: &str) -> Option<Arc<EngineStream>> {
        self.streams.get(id)
    }

    /// Run one command
    pub async fn handle(&self, op: &str, body: Value) -> CommandResult {
        tracing::debug!(op = %op, "Command");
        let result = match op {
            "echo" => Ok(body),
            "new-conn" => self.new_conn(parse(body)?),
            "create-offer" => self.create_offer(parse(body)?, false).await,
            "create-offer-set-local-desc" => self.create_offer(parse(body)?, true).await,
            "create-answer" => self.create_answer(parse(body)?).await,
            "set-local-desc" => self.set_desc(parse(body)?, true).await,
            "set-remote-desc" => self.set_desc(parse(body)?, false).await,
            "set-remote-desc-create-answer" => self.set_remote_create_answer(parse(body)?).await,
            "add-ice-candidate" => self.add_ice_candidate(parse(body)?),
            "conn-add-stream" => self.conn_add_stream(parse(body)?),
            "conn-stats" => self.conn_stats(parse(body)?).await,
            "new-libmuxer" => self.new_muxer(parse(body)?),
            "libmuxer-add-input" => self.muxer_add_input(parse(body)?),
            "libmuxer-replace-all-inputs" => self.muxer_replace_inputs(parse(body)?).await,
            "libmuxer-remove-input" => self.muxer_remove_input(parse(body)?),
            "libmuxer-set-inputs-opt" => self.muxer_set_inputs_opt(parse(body)?),
            "stream-add-sink" => self.stream_add_sink(parse(body)?),
            "stream-remove-sink" => self.stream_remove_sink(parse(body)?).await,
            "new-canvas-stream" => self.new_canvas_stream(parse(body)?),
            "new-url-stream" => self.new_url_stream(parse(body)?),
            "new-raw-stream" => self.new_raw_stream(),
            "raw-stream-send-packet" => self.raw_stream_send_packet(parse(body)?),
            "sink-stats" => self.sink_stats(parse(body)?),
            "request-key-frame" => self.request_key_frame(parse(body)?),
            "stream-sink-dont-reconnect" => self.sink_dont_reconnect(parse(body)?),
            "stream-sink-sei-key" => self.sink_sei_key(parse(body)?),
            "push-sei" => self.push_sei(parse(body)?),
            _ => Err(CommandError::invalid_params(format!("unknown command {}", op))),
        };
        if let Err(e) = &result {
            tracing::warn!(op = %op, code = e.code.code(), error = %e.message, "Command failed");
        }
        result
    }

    /// Stop every muxer, stream and sink and forget all connections
    pub async fn shutdown(&self) {
        let muxers = self.muxers.drain();
        let streams = self.streams.drain();
        let sinks = self.sinks.drain();
        let conns = self.conns.drain();
        tracing::info!(
            muxers = muxers.len(),
            streams = streams.len(),
            sinks = sinks.len(),
            conns = conns.len(),
            "Engine shutting down"
        );
        let stopped = tokio::task::spawn_blocking(move || {
            for muxer in &muxers {
                muxer.stop();
            }
            for stream in &streams {
                stream.stop();
            }
        })
        .await;
        if stopped.is_err() {
            tracing::error!("Shutdown task panicked");
        }
    }

    fn find_conn(&self, id: &str) -> Result<Arc<dyn PeerConnection>, CommandError> {
        let id = required(id, "id")?;
        self.conns.get(id).ok_or_else(|| CommandError::conn_not_found(id))
    }

    fn find_stream(&self, id: &str, field: &str) -> Result<Arc<EngineStream>, CommandError> {
        let id = required(id, field)?;
        self.streams.get(id).ok_or_else(|| CommandError::stream_not_found(id))
    }

    fn find_muxer(&self, id: &str) -> Result<Arc<AvMuxer>, CommandError> {
        let id = required(id, "id")?;
        self.muxers.get(id).ok_or_else(|| CommandError::muxer_not_found(id))
    }

    /// Stream and attached sink named by a request
    fn find_sink(&self, req: &SinkRequest) -> Result<(Arc<EngineStream>, Arc<dyn FrameSink>), CommandError> {
        let stream = self.find_stream(&req.id, "id")?;
        let sink_id = required(&req.sink_id, "sinkId")?;
        let sink = stream
            .stream()
            .find_sink(sink_id)
            .ok_or_else(|| CommandError::sink_not_found(sink_id))?;
        Ok((stream, sink))
    }

    fn find_rtmp_sink(&self, req: &SinkRequest) -> Result<Arc<RtmpSink>, CommandError> {
        self.find_sink(req)?;
        self.sinks
            .get(&req.sink_id)
            .ok_or_else(|| CommandError::invalid_params("rtmp sink not found"))
    }

    fn register_stream(&self, stream: Arc<Stream>, source: StreamSource) -> String {
        let id = stream.id().to_string();
        self.streams.insert(id.clone(), Arc::new(EngineStream::new(stream, source)));
        id
    }

    fn new_conn(&self, req: NewConnRequest) -> CommandResult {
        let id = new_id();
        let config = PeerConfig {
            raw_packets: req.rawpkt,
            dump_raw_packets: req.dump_rawpkt,
            port_range: req.port_range(self.config.max_peer_port),
            ice_servers: req.ice_servers.into_iter().flat_map(|s| s.urls).collect(),
        };
        let events = PeerEvents::new(id.clone(), self.streams.clone(), self.events.clone());
        let conn = self.peers.create(config, events).map_err(CommandError::invalid_params)?;
        self.conns.insert(id.clone(), conn);
        tracing::info!(conn = %id, "Connection created");
        Ok(json!({ "id": id }))
    }

    async fn create_offer(&self, req: OfferRequest, set_local: bool) -> CommandResult {
        let conn = self.find_conn(&req.id)?;
        let (done, rx) = completion();
        if set_local {
            conn.create_offer_set_local(req.options(), done);
        } else {
            conn.create_offer(req.options(), done);
        }
        let sdp = wait(rx).await?;
        Ok(json!({ "sdp": sdp }))
    }

    async fn create_answer(&self, req: OfferRequest) -> CommandResult {
        let conn = self.find_conn(&req.id)?;
        let (done, rx) = completion();
        conn.create_answer(req.options(), done);
        let sdp = wait(rx).await?;
        Ok(json!({ "sdp": sdp }))
    }

    async fn set_desc(&self, req: DescRequest, local: bool) -> CommandResult {
        let conn = self.find_conn(&req.id)?;
        let kind = match req.kind.as_str() {
            "" if local => SdpType::Offer,
            "" => SdpType::Answer,
            "offer" => SdpType::Offer,
            "answer" => SdpType::Answer,
            other => return Err(CommandError::invalid_params(format!("type {}", other))),
        };
        let sdp = required(&req.sdp, "sdp")?.to_string();
        let (done, rx) = completion();
        if local {
            conn.set_local_description(kind, sdp, done);
        } else {
            conn.set_remote_description(kind, sdp, done);
        }
        wait(rx).await?;
        Ok(json!({}))
    }

    async fn set_remote_create_answer(&self, req: DescRequest) -> CommandResult {
        let conn = self.find_conn(&req.id)?;
        let sdp = required(&req.sdp, "sdp")?.to_string();
        let options = OfferOptions {
            receive_audio: req.audio,
            receive_video: req.video,
        };
        let (done, rx) = completion();
        conn.set_remote_description_create_answer(sdp, options, done);
        let answer = wait(rx).await?;
        Ok(json!({ "sdp": answer }))
    }

    fn add_ice_candidate(&self, req: IceRequest) -> CommandResult {
        let conn = self.find_conn(&req.id)?;
        let candidate = request::parse_candidate(required(&req.candidate, "candidate")?)?;
        conn.add_ice_candidate(candidate).map_err(CommandError::invalid_params)?;
        Ok(json!({}))
    }

    fn conn_add_stream(&self, req: StreamRequest) -> CommandResult {
        let conn = self.find_conn(&req.id)?;
        let stream = self.find_stream(&req.stream_id, "streamId")?;
        let tracks = conn
            .add_stream(stream.stream().clone())
            .map_err(CommandError::invalid_params)?;
        Ok(json!({ "tracks": tracks }))
    }

    async fn conn_stats(&self, req: IdRequest) -> CommandResult {
        let conn = self.find_conn(&req.id)?;
        let (done, rx) = completion();
        conn.stats(done);
        let stats = wait(rx).await?;
        Ok(json!({ "stats": stats }))
    }

    fn new_muxer(&self, req: NewMuxerRequest) -> CommandResult {
        check_size(req.w, req.h)?;
        let (w, h) = (positive(req.w), positive(req.h));
        if !req.audio_only && (w == 0 || h == 0) {
            return Err(CommandError::invalid_params("invalid w or h"));
        }
        let config = MuxerConfig::new(w, h)
            .fps(positive(req.fps))
            .audio_only(req.audio_only)
            .blank_frame_threshold(self.config.blank_frame_threshold)
            .audio_latest_limit(self.config.audio_latest_limit);

        let id = new_id();
        let muxer = AvMuxer::with_clock(id.clone(), config, self.clock.clone());
        let output = Arc::new(Stream::new(new_id()));
        muxer.add_output(output.id(), output.clone());
        let output_id = self.register_stream(output, StreamSource::Muxer(id.clone()));
        if let Err(e) = muxer.start() {
            self.streams.remove(&output_id);
            return Err(CommandError::invalid_params(format!("muxer start: {}", e)));
        }
        self.muxers.insert(id.clone(), muxer);
        Ok(json!({ "id": id, "outputStreamId": output_id }))
    }

    /// Drop the SEI queue registered for a muxer input, if any
    fn release_sei_key(&self, muxer: &AvMuxer, name: &str) {
        if let Some(key) = muxer.remove_input_key(name) {
            self.sei.remove(&key);
        }
    }

    /// New input following `entry.stream_id`, not yet started
    fn build_input(
        &self,
        muxer: &AvMuxer,
        entry: &InputEntry,
    ) -> Result<(Arc<Input>, Arc<EngineStream>, String), CommandError> {
        let upstream = self.find_stream(&entry.stream_id, "streamId")?;
        entry.opt.validate()?;
        self.release_sei_key(muxer, &entry.stream_id);
        let mut sei_key = String::new();
        if entry.opt.support_sei {
            sei_key = SeiQueues::make_key(&entry.stream_id);
            self.sei.create(&sei_key);
            muxer.set_input_key(&entry.stream_id, sei_key.clone());
        }
        let input = Input::with_clock(entry.stream_id.clone(), self.config.muxer_input.clone(), self.clock.clone());
        entry.opt.apply(input.options());
        if let Some(frame) = upstream.stream().last_video() {
            input.set_video(frame);
        }
        Ok((input, upstream, sei_key))
    }

    fn muxer_add_input(&self, req: AddInputRequest) -> CommandResult {
        let muxer = self.find_muxer(&req.id)?;
        let entry = InputEntry {
            stream_id: req.stream_id,
            opt: req.opt,
        };
        let (input, upstream, sei_key) = self.build_input(&muxer, &entry)?;
        input.start_stream(upstream.stream().clone());
        muxer.add_input(input);
        Ok(json!({ "id": entry.stream_id, "seiKey": sei_key }))
    }

    async fn muxer_replace_inputs(&self, req: ReplaceInputsRequest) -> CommandResult {
        let muxer = self.find_muxer(&req.id)?;
        let Some(Value::Array(items)) = req.opts else {
            return Err(CommandError::invalid_params("opts"));
        };
        let entries = items
            .into_iter()
            .map(parse::<InputEntry>)
            .collect::<Result<Vec<_>, _>>()?;
        for entry in &entries {
            self.find_stream(&entry.stream_id, "streamId")?;
            entry.opt.validate()?;
        }

        let mut built = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.build_input(&muxer, &entry) {
                Ok((input, upstream, sei_key)) => built.push((input, upstream, entry.stream_id, sei_key)),
                Err(e) => {
                    for (_, _, stream_id, _) in &built {
                        self.release_sei_key(&muxer, stream_id);
                    }
                    return Err(e);
                }
            }
        }

        let mut inputs = Vec::with_capacity(built.len());
        let mut res = Vec::with_capacity(built.len());
        for (input, upstream, stream_id, sei_key) in built {
            input.start_stream(upstream.stream().clone());
            inputs.push(input);
            res.push(json!({ "id": stream_id, "seiKey": sei_key }));
        }
        // give the new inputs a picture before the old ones go away
        tokio::time::sleep(self.config.replace_settle).await;
        let kept: Vec<String> = inputs.iter().map(|i| i.name().to_string()).collect();
        let old = muxer.replace_all_inputs(inputs);
        for input in &old {
            if !kept.iter().any(|name| name == input.name()) {
                self.release_sei_key(&muxer, input.name());
            }
        }
        tracing::debug!(muxer = %muxer.id(), dropped = old.len(), "Replaced inputs");
        Ok(json!({ "res": res }))
    }

    fn muxer_remove_input(&self, req: StreamRequest) -> CommandResult {
        let muxer = self.find_muxer(&req.id)?;
        if !req.stream_id.is_empty() {
            self.release_sei_key(&muxer, &req.stream_id);
            muxer.remove_input(&req.stream_id);
        }
        Ok(json!({}))
    }

    fn muxer_set_inputs_opt(&self, req: SetInputsOptRequest) -> CommandResult {
        let muxer = self.find_muxer(&req.id)?;
        let mut sei_change = false;
        let mut sei_key = String::new();
        for entry in &req.inputs {
            entry.opt.validate()?;
        }
        for entry in req.inputs {
            let Some(input) = muxer.find_input(&entry.id) else {
                tracing::warn!(muxer = %muxer.id(), input = %entry.id, "No such input");
                continue;
            };
            let before = input.options().is_true(keys::SUPPORT_SEI);
            entry.opt.apply(input.options());
            let after = input.options().is_true(keys::SUPPORT_SEI);
            if before == after {
                continue;
            }
            sei_change = true;
            if after {
                self.release_sei_key(&muxer, &entry.id);
                sei_key = SeiQueues::make_key(&entry.id);
                self.sei.create(&sei_key);
                muxer.set_input_key(&entry.id, sei_key.clone());
            } else {
                self.release_sei_key(&muxer, &entry.id);
            }
        }
        Ok(json!({ "seiChange": sei_change, "seiKey": sei_key }))
    }

    fn stream_add_sink(&self, req: AddSinkRequest) -> CommandResult {
        let stream = self.find_stream(&req.id, "id")?;
        let sink_id = new_id();
        let forwarder = Arc::new(EventForwarder::new(self.events.clone()));
        if req.raw {
            let sink = Arc::new(RawPacketSink::new(sink_id.clone(), forwarder));
            stream.stream().add_sink(sink);
            return Ok(json!({ "id": sink_id }));
        }

        let url = required(&req.url, "url")?;
        let mut config = self
            .config
            .sink
            .clone()
            .video_kbps(positive(req.kbps))
            .gop(positive(req.gop))
            .fps(positive(req.fps));
        if req.min_rate > 0 {
            config.min_rate_kbps = positive(req.min_rate);
        }
        if req.max_rate > 0 {
            config.max_rate_kbps = positive(req.max_rate);
        }
        let sink = Arc::new(
            RtmpSink::new(sink_id.clone(), url, config, self.codecs.clone(), self.transports.clone())
                .with_sei(self.sei.clone())
                .with_observer(forwarder),
        );
        self.sinks.insert(sink_id.clone(), sink.clone());
        stream.stream().add_sink(sink);
        tracing::info!(stream = %req.id, sink = %sink_id, url = %url, "Sink added");
        Ok(json!({ "id": sink_id }))
    }

    async fn stream_remove_sink(&self, req: SinkRequest) -> CommandResult {
        let (stream, _) = self.find_sink(&req)?;
        let sink_id = req.sink_id.clone();
        self.sinks.remove(&sink_id);
        let removed = tokio::task::spawn_blocking(move || stream.stream().remove_sink(&sink_id)).await;
        match removed {
            Ok(Some(_)) => Ok(json!({})),
            Ok(None) => Err(CommandError::sink_not_found(&req.sink_id)),
            Err(e) => Err(CommandError::invalid_params(format!("remove sink: {}", e))),
        }
    }

    fn new_canvas_stream(&self, req: CanvasRequest) -> CommandResult {
        check_size(req.w, req.h)?;
        let mut config = self.config.canvas.clone();
        if req.fps > 0 {
            config.fps = positive(req.fps);
        }
        if req.w > 0 {
            config.width = positive(req.w);
        }
        if req.h > 0 {
            config.height = positive(req.h);
        }
        if let Some(bg) = req.bg {
            config.background = (bg & 0xff_ffff) as u32;
        }
        let canvas = CanvasStream::new(new_id(), config);
        canvas
            .start()
            .map_err(|e| CommandError::invalid_params(format!("canvas start: {}", e)))?;
        let id = self.register_stream(canvas.stream().clone(), StreamSource::Canvas(canvas));
        Ok(json!({ "id": id }))
    }

    fn new_url_stream(&self, req: UrlStreamRequest) -> CommandResult {
        let url = required(&req.url, "url")?;
        let mut config = self.config.url_input.clone();
        if req.is_pic {
            config = config.single_frame(true).rescale(true);
        }
        let input = Input::with_clock(new_id(), config, self.clock.clone());
        input
            .start_url(url, self.opener.clone(), self.codecs.clone())
            .map_err(|e| CommandError::invalid_params(format!("input start: {}", e)))?;
        let id = self.register_stream(input.stream().clone(), StreamSource::Url(input));
        tracing::info!(stream = %id, url = %url, "URL stream created");
        Ok(json!({ "id": id }))
    }

    fn new_raw_stream(&self) -> CommandResult {
        let id = self.register_stream(Arc::new(Stream::new(new_id())), StreamSource::Raw);
        Ok(json!({ "id": id }))
    }

    fn raw_stream_send_packet(&self, req: RawPacketRequest) -> CommandResult {
        let stream = self.find_stream(&req.id, "id")?;
        if req.rawpkt.is_empty() {
            return Err(CommandError::invalid_params("no rawpkt sent"));
        }
        let packet = MediaPacket::new(StreamKind::Raw, Codec::Unknown, 0, 0, req.rawpkt);
        stream.stream().send_frame(MediaFrame::raw(packet).shared());
        Ok(json!({}))
    }

    fn sink_stats(&self, req: SinkRequest) -> CommandResult {
        let (_, sink) = self.find_sink(&req)?;
        Ok(json!({ "bytes": sink.stat_bytes() }))
    }

    fn request_key_frame(&self, req: SinkRequest) -> CommandResult {
        self.find_rtmp_sink(&req)?.request_key_frame();
        Ok(json!({}))
    }

    fn sink_dont_reconnect(&self, req: SinkRequest) -> CommandResult {
        self.find_rtmp_sink(&req)?.set_dont_reconnect(req.dont_reconnect);
        Ok(json!({}))
    }

    fn sink_sei_key(&self, req: SinkRequest) -> CommandResult {
        let sink = self.find_rtmp_sink(&req)?;
        let key = required(&req.sei_key, "seiKey")?;
        sink.set_sei_key(Some(key.to_string()));
        Ok(json!({}))
    }

    fn push_sei(&self, req: PushSeiRequest) -> CommandResult {
        let key = required(&req.sei_key, "seiKey")?;
        if !self.sei.push(key, req.payload) {
            return Err(CommandError::invalid_params("sei key not found"));
        }
        Ok(json!({}))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("conns", &self.conns.len())
            .field("streams", &self.streams.len())
            .field("muxers", &self.muxers.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::mock::MockCodecFactory;
    use crate::error::ErrorCode;
    use crate::output::sender::tests::memory;
    use crate::output::SinkConfig;
    use super::peer::mock::MockPeers;
    use std::time::{Duration, Instant};

    fn engine() -> (Engine, mpsc::UnboundedReceiver<EngineEvent>) {
        let config = EngineConfig::new()
            .replace_settle(Duration::from_millis(10))
            .canvas(CanvasConfig {
                width: 32,
                height: 16,
                ..Default::default()
            })
            .sink(SinkConfig::new().send_backlog(0).idle_interval(Duration::from_millis(1)));
        Engine::new(config)
    }

    fn code(result: CommandResult) -> ErrorCode {
        result.unwrap_err().code
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[test]
    fn test_new_id() {
        let id = new_id();
        assert_eq!(id.len(), 16);
        assert_ne!(id, new_id());
    }

    #[tokio::test]
    async fn test_echo_and_unknown() {
        let (engine, _rx) = engine();
        let body = json!({ "hello": [1, 2] });
        assert_eq!(engine.handle("echo", body.clone()).await.unwrap(), body);
        assert_eq!(code(engine.handle("bogus", json!({})).await), ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let (engine, _rx) = engine();
        assert_eq!(code(engine.handle("new-conn", json!({})).await), ErrorCode::InvalidParams);
        assert_eq!(code(engine.handle("create-offer", json!({})).await), ErrorCode::InvalidParams);
        assert_eq!(code(engine.handle("create-offer", json!({ "id": "x" })).await), ErrorCode::ConnNotFound);
        assert_eq!(
            code(engine.handle("libmuxer-add-input", json!({ "id": "x", "streamId": "s" })).await),
            ErrorCode::MuxerNotFound
        );
        assert_eq!(code(engine.handle("stream-add-sink", json!({ "id": "x", "raw": true })).await), ErrorCode::StreamNotFound);

        let raw = engine.handle("new-raw-stream", json!({})).await.unwrap();
        let id = raw["id"].as_str().unwrap();
        assert_eq!(
            code(engine.handle("stream-remove-sink", json!({ "id": id, "sinkId": "nope" })).await),
            ErrorCode::SinkNotFound
        );
        assert_eq!(code(engine.handle("stream-add-sink", json!({ "id": id })).await), ErrorCode::InvalidParams);
        assert_eq!(code(engine.handle("new-url-stream", json!({})).await), ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn test_peer_flow() {
        let peers = Arc::new(MockPeers::default());
        let (engine, mut rx) = engine();
        let engine = engine.with_peers(peers.clone());

        let conn = engine
            .handle(
                "new-conn",
                json!({ "minPort": 5000, "maxPort": 6000, "iceServers": [{ "urls": ["stun:a", "stun:b"] }] }),
            )
            .await
            .unwrap();
        let id = conn["id"].as_str().unwrap().to_string();
        {
            let configs = peers.configs.lock();
            assert_eq!(configs[0].port_range, (5000, 6000));
            assert_eq!(configs[0].ice_servers, vec!["stun:a".to_string(), "stun:b".to_string()]);
        }

        let offer = engine.handle("create-offer", json!({ "id": id, "audio": true })).await.unwrap();
        assert_eq!(offer["sdp"], "v=0 offer audio=true video=false");

        engine.handle("set-remote-desc", json!({ "id": id, "sdp": "v=0 remote" })).await.unwrap();
        assert_eq!(peers.peer.remote.lock().as_ref().unwrap().0, SdpType::Answer);
        engine.handle("set-local-desc", json!({ "id": id, "sdp": "v=0 local" })).await.unwrap();
        assert_eq!(peers.peer.local.lock().as_ref().unwrap().0, SdpType::Offer);
        assert_eq!(
            code(engine.handle("set-remote-desc", json!({ "id": id, "sdp": "garbage" })).await),
            ErrorCode::InvalidParams
        );
        assert_eq!(code(engine.handle("set-remote-desc", json!({ "id": id })).await), ErrorCode::InvalidParams);

        let answer = engine
            .handle("set-remote-desc-create-answer", json!({ "id": id, "sdp": "v=0 offer" }))
            .await
            .unwrap();
        assert_eq!(answer["sdp"], "v=0 answer");

        let candidate = r#"{"sdpMid":"0","sdpMLineIndex":"0","candidate":"candidate:1"}"#;
        engine
            .handle("add-ice-candidate", json!({ "id": id, "candidate": candidate }))
            .await
            .unwrap();
        assert_eq!(peers.peer.candidates.lock().len(), 1);
        let stats = engine.handle("conn-stats", json!({ "id": id })).await.unwrap();
        assert_eq!(stats["stats"]["candidates"], 1);

        let events = peers.peer.events.lock().clone().unwrap();
        events.emit(PeerEvent::AddStream {
            stream_id: "remote-1".into(),
            stream: Arc::new(Stream::new("remote-1")),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.message_type(), "on-conn-add-stream");
        assert_eq!(event.to_json(), json!({ "id": id, "streamId": "remote-1" }));
        assert!(matches!(engine.stream("remote-1").unwrap().source(), StreamSource::Peer(c) if *c == id));

        let tracks = engine
            .handle("conn-add-stream", json!({ "id": id, "streamId": "remote-1" }))
            .await
            .unwrap();
        assert_eq!(tracks["tracks"][0]["kind"], "video");

        events.emit(PeerEvent::IceGatheringChange("complete".into()));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.to_json(), json!({ "id": id, "state": "complete" }));
    }

    #[tokio::test]
    async fn test_muxer_inputs_and_sei_keys() {
        let (engine, _rx) = engine();
        assert_eq!(code(engine.handle("new-libmuxer", json!({ "w": 0, "h": 48 })).await), ErrorCode::InvalidParams);
        engine.handle("new-libmuxer", json!({ "audioOnly": true })).await.unwrap();

        let muxer = engine.handle("new-libmuxer", json!({ "w": 64, "h": 48, "fps": 10 })).await.unwrap();
        let muxer_id = muxer["id"].as_str().unwrap().to_string();
        let output_id = muxer["outputStreamId"].as_str().unwrap();
        assert!(matches!(engine.stream(output_id).unwrap().source(), StreamSource::Muxer(m) if *m == muxer_id));
        assert_eq!(engine.muxers.get(&muxer_id).unwrap().fps(), 10);

        let canvas = engine.handle("new-canvas-stream", json!({ "fps": 50, "bg": 0x00ff00 })).await.unwrap();
        let canvas_id = canvas["id"].as_str().unwrap().to_string();

        assert_eq!(
            code(engine.handle("libmuxer-add-input", json!({ "id": muxer_id, "streamId": "missing" })).await),
            ErrorCode::StreamNotFound
        );
        let added = engine
            .handle(
                "libmuxer-add-input",
                json!({ "id": muxer_id, "streamId": canvas_id, "opt": { "w": 64, "h": 48, "supportSEI": true } }),
            )
            .await
            .unwrap();
        assert_eq!(added["id"], canvas_id.as_str());
        let key = added["seiKey"].as_str().unwrap().to_string();
        assert!(key.starts_with(&format!("{}.", canvas_id)));
        assert!(engine.sei().contains(&key));

        let handle = engine.muxers.get(&muxer_id).unwrap();
        let input = handle.find_input(&canvas_id).unwrap();
        assert!(!input.options().is_true(keys::HIDDEN));

        let changed = engine
            .handle(
                "libmuxer-set-inputs-opt",
                json!({ "id": muxer_id, "inputs": [{ "id": canvas_id, "opt": { "w": 32, "h": 24, "x": 8 } }] }),
            )
            .await
            .unwrap();
        assert_eq!(changed["seiChange"], true);
        assert!(!engine.sei().contains(&key));
        assert_eq!(input.options().get_int(keys::X), Some(8));

        let changed = engine
            .handle(
                "libmuxer-set-inputs-opt",
                json!({ "id": muxer_id, "inputs": [{ "id": canvas_id, "opt": { "w": 32, "h": 24, "supportSEI": true } }] }),
            )
            .await
            .unwrap();
        assert_eq!(changed["seiChange"], true);
        let key = changed["seiKey"].as_str().unwrap().to_string();
        assert!(engine.sei().contains(&key));

        engine
            .handle("push-sei", json!({ "seiKey": key, "payload": [1, 2, 3] }))
            .await
            .unwrap();
        assert_eq!(engine.sei().len(&key), 1);
        assert_eq!(
            code(engine.handle("push-sei", json!({ "seiKey": "nope", "payload": [1] })).await),
            ErrorCode::InvalidParams
        );

        engine
            .handle("libmuxer-remove-input", json!({ "id": muxer_id, "streamId": canvas_id }))
            .await
            .unwrap();
        assert!(handle.find_input(&canvas_id).is_none());
        assert!(!engine.sei().contains(&key));

        engine.shutdown().await;
        assert!(engine.stream(&canvas_id).is_none());
    }

    #[tokio::test]
    async fn test_replace_all_inputs() {
        let (engine, _rx) = engine();
        let muxer = engine.handle("new-libmuxer", json!({ "w": 64, "h": 48 })).await.unwrap();
        let muxer_id = muxer["id"].as_str().unwrap().to_string();
        let a = engine.handle("new-raw-stream", json!({})).await.unwrap();
        let b = engine.handle("new-raw-stream", json!({})).await.unwrap();
        let (a, b) = (a["id"].as_str().unwrap(), b["id"].as_str().unwrap());

        assert_eq!(
            code(engine.handle("libmuxer-replace-all-inputs", json!({ "id": muxer_id, "opts": {} })).await),
            ErrorCode::InvalidParams
        );
        assert_eq!(
            code(
                engine
                    .handle(
                        "libmuxer-replace-all-inputs",
                        json!({ "id": muxer_id, "opts": [{ "streamId": a }, { "streamId": "missing" }] })
                    )
                    .await
            ),
            ErrorCode::StreamNotFound
        );

        engine
            .handle("libmuxer-add-input", json!({ "id": muxer_id, "streamId": a }))
            .await
            .unwrap();
        let replaced = engine
            .handle(
                "libmuxer-replace-all-inputs",
                json!({ "id": muxer_id, "opts": [{ "streamId": b, "opt": { "w": 10, "h": 10 } }] }),
            )
            .await
            .unwrap();
        assert_eq!(replaced["res"].as_array().unwrap().len(), 1);
        assert_eq!(replaced["res"][0]["id"], b);
        let handle = engine.muxers.get(&muxer_id).unwrap();
        assert_eq!(handle.input_names(), vec![b.to_string()]);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_sei_queues_follow_inputs() {
        let (engine, _rx) = engine();
        let muxer = engine.handle("new-libmuxer", json!({ "w": 64, "h": 48 })).await.unwrap();
        let muxer_id = muxer["id"].as_str().unwrap().to_string();
        let raw = engine.handle("new-raw-stream", json!({})).await.unwrap();
        let raw_id = raw["id"].as_str().unwrap().to_string();
        let sei = json!({ "w": 16, "h": 16, "supportSEI": true });

        let mut last_key = String::new();
        for _ in 0..3 {
            let added = engine
                .handle("libmuxer-add-input", json!({ "id": muxer_id, "streamId": raw_id, "opt": sei }))
                .await
                .unwrap();
            last_key = added["seiKey"].as_str().unwrap().to_string();
        }
        assert_eq!(engine.sei().queue_count(), 1);
        assert!(engine.sei().contains(&last_key));

        // replacing an input with itself keeps exactly one live queue
        let replaced = engine
            .handle(
                "libmuxer-replace-all-inputs",
                json!({ "id": muxer_id, "opts": [{ "streamId": raw_id, "opt": sei }] }),
            )
            .await
            .unwrap();
        let key = replaced["res"][0]["seiKey"].as_str().unwrap().to_string();
        assert_eq!(engine.sei().queue_count(), 1);
        assert!(engine.sei().contains(&key));
        assert!(!engine.sei().contains(&last_key));

        engine
            .handle("libmuxer-replace-all-inputs", json!({ "id": muxer_id, "opts": [] }))
            .await
            .unwrap();
        let handle = engine.muxers.get(&muxer_id).unwrap();
        assert!(handle.input_names().is_empty());
        assert_eq!(engine.sei().queue_count(), 0);
        assert!(handle.input_key(&raw_id).is_none());

        // a failing batch leaves nothing behind
        let result = engine
            .handle(
                "libmuxer-replace-all-inputs",
                json!({ "id": muxer_id, "opts": [{ "streamId": raw_id, "opt": sei }, { "streamId": "missing" }] }),
            )
            .await;
        assert_eq!(code(result), ErrorCode::StreamNotFound);
        assert_eq!(engine.sei().queue_count(), 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_sizes_rejected() {
        let (engine, _rx) = engine();
        for body in [json!({ "w": -64, "h": 48 }), json!({ "w": 100_000, "h": 48 })] {
            assert_eq!(code(engine.handle("new-libmuxer", body).await), ErrorCode::InvalidParams);
        }
        assert_eq!(
            code(engine.handle("new-canvas-stream", json!({ "w": 1_048_576, "h": 16 })).await),
            ErrorCode::InvalidParams
        );

        let muxer = engine.handle("new-libmuxer", json!({ "w": 64, "h": 48 })).await.unwrap();
        let muxer_id = muxer["id"].as_str().unwrap().to_string();
        let canvas = engine.handle("new-canvas-stream", json!({ "fps": 50 })).await.unwrap();
        let canvas_id = canvas["id"].as_str().unwrap().to_string();
        assert!(
            wait_for(|| engine
                .stream(&canvas_id)
                .map_or(false, |s| s.stream().last_video().is_some()))
            .await
        );

        let result = engine
            .handle(
                "libmuxer-add-input",
                json!({ "id": muxer_id, "streamId": canvas_id, "opt": { "w": -4, "h": -4 } }),
            )
            .await;
        assert_eq!(code(result), ErrorCode::InvalidParams);
        let handle = engine.muxers.get(&muxer_id).unwrap();
        assert!(handle.find_input(&canvas_id).is_none());

        engine
            .handle("libmuxer-add-input", json!({ "id": muxer_id, "streamId": canvas_id, "opt": { "w": 8, "h": 8 } }))
            .await
            .unwrap();
        let result = engine
            .handle(
                "libmuxer-set-inputs-opt",
                json!({ "id": muxer_id, "inputs": [{ "id": canvas_id, "opt": { "w": 8, "h": -1 } }] }),
            )
            .await;
        assert_eq!(code(result), ErrorCode::InvalidParams);
        let input = handle.find_input(&canvas_id).unwrap();
        assert_eq!(input.options().get_int(keys::HEIGHT), Some(8));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_raw_stream_and_raw_sink() {
        let (engine, mut rx) = engine();
        let raw = engine.handle("new-raw-stream", json!({})).await.unwrap();
        let id = raw["id"].as_str().unwrap();
        let sink = engine.handle("stream-add-sink", json!({ "id": id, "raw": true })).await.unwrap();
        let sink_id = sink["id"].as_str().unwrap();

        assert_eq!(
            code(engine.handle("raw-stream-send-packet", json!({ "id": id, "rawpkt": [] })).await),
            ErrorCode::InvalidParams
        );
        engine
            .handle("raw-stream-send-packet", json!({ "id": id, "rawpkt": [9, 8, 7] }))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.to_json(), json!({ "id": sink_id, "pts": 0, "rawpkt": [9, 8, 7] }));

        let stats = engine.handle("sink-stats", json!({ "id": id, "sinkId": sink_id })).await.unwrap();
        assert_eq!(stats["bytes"], 3);
        // RTMP-only controls reject a raw sink
        assert_eq!(
            code(engine.handle("request-key-frame", json!({ "id": id, "sinkId": sink_id })).await),
            ErrorCode::InvalidParams
        );

        engine
            .handle("stream-remove-sink", json!({ "id": id, "sinkId": sink_id }))
            .await
            .unwrap();
        assert_eq!(
            code(engine.handle("sink-stats", json!({ "id": id, "sinkId": sink_id })).await),
            ErrorCode::SinkNotFound
        );
    }

    #[tokio::test]
    async fn test_rtmp_sink_controls() {
        let transports = memory();
        let (engine, mut rx) = engine();
        let engine = engine
            .with_codecs(MockCodecFactory::new())
            .with_transports(Arc::new(transports.clone()));

        let canvas = engine.handle("new-canvas-stream", json!({ "fps": 50 })).await.unwrap();
        let id = canvas["id"].as_str().unwrap().to_string();
        let sink = engine
            .handle("stream-add-sink", json!({ "id": id, "url": "rtmp://h/live/k", "kbps": 500, "gop": 10 }))
            .await
            .unwrap();
        let sink_id = sink["id"].as_str().unwrap().to_string();
        assert!(engine.sinks.get(&sink_id).unwrap().is_running());

        assert!(wait_for(|| transports.tags.lock().len() >= 3).await);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.to_json(), json!({ "sinkId": sink_id, "status": "connected" }));

        let req = json!({ "id": id, "sinkId": sink_id });
        engine.handle("request-key-frame", req.clone()).await.unwrap();
        engine
            .handle("stream-sink-dont-reconnect", json!({ "id": id, "sinkId": sink_id, "dontReconnect": true }))
            .await
            .unwrap();
        assert_eq!(code(engine.handle("stream-sink-sei-key", req.clone()).await), ErrorCode::InvalidParams);
        engine
            .handle("stream-sink-sei-key", json!({ "id": id, "sinkId": sink_id, "seiKey": "k.1" }))
            .await
            .unwrap();

        let stats = engine.handle("sink-stats", req.clone()).await.unwrap();
        assert!(stats["bytes"].as_u64().unwrap() > 0);

        engine.handle("stream-remove-sink", req.clone()).await.unwrap();
        assert!(engine.sinks.get(&sink_id).is_none());
        assert_eq!(code(engine.handle("stream-remove-sink", req).await), ErrorCode::SinkNotFound);
        engine.shutdown().await;
    }
}
