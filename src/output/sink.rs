//! RTMP sink
//!
//! Attached to a stream, the sink queues composited frames and runs one
//! worker thread that encodes them and hands the packets to an
//! [`RtmpSender`]. Each sender generation gets fresh encoders; when a
//! generation fails and reconnecting is allowed, queues are flushed and a new
//! generation starts.
//!
//! ```text
//! on_frame ──► muxed queue ──► encoders ──► video queue ─┐
//!                                      └──► audio queue ─┴─► sender
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec::{CodecFactory, Encoder, SeiQueues};
use crate::error::Result;
use crate::frame::{Codec, MediaFrame, MediaPacket, SharedFrame, StreamKind};
use crate::stats::{ByteCounter, SinkStats};
use crate::stream::{FrameSink, SinkStatus, StatusObserver};
use crate::sync::{CancelToken, SharedQueue};
use crate::transform::AudioResampler;

use super::config::SinkConfig;
use super::sender::RtmpSender;
use super::transport::TransportFactory;

const POP_TIMEOUT: Duration = Duration::from_millis(10);

/// State shared between the sink handle and its worker
struct Shared {
    muxed: SharedQueue<SharedFrame>,
    resampler: Mutex<AudioResampler>,
    dont_reconnect: AtomicBool,
    key_frame: AtomicBool,
    sei_key: Mutex<Option<String>>,
    bytes: Arc<ByteCounter>,
    stats: Mutex<SinkStats>,
}

pub struct RtmpSink {
    id: String,
    url: String,
    config: SinkConfig,
    codecs: Arc<dyn CodecFactory>,
    transports: Arc<dyn TransportFactory>,
    sei: Option<Arc<SeiQueues>>,
    observer: Option<Arc<dyn StatusObserver>>,
    shared: Arc<Shared>,
    worker: Mutex<Option<(CancelToken, JoinHandle<()>)>>,
}

impl RtmpSink {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        config: SinkConfig,
        codecs: Arc<dyn CodecFactory>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let shared = Arc::new(Shared {
            muxed: SharedQueue::new(config.muxed_queue_depth),
            resampler: Mutex::new(AudioResampler::new()),
            dont_reconnect: AtomicBool::new(config.dont_reconnect),
            key_frame: AtomicBool::new(false),
            sei_key: Mutex::new(None),
            bytes: Arc::new(ByteCounter::new()),
            stats: Mutex::new(SinkStats::new()),
        });
        Self {
            id: id.into(),
            url: url.into(),
            config,
            codecs,
            transports,
            sei: None,
            observer: None,
            shared,
            worker: Mutex::new(None),
        }
    }

    /// Table the video encoder pulls SEI payloads from
    pub fn with_sei(mut self, table: Arc<SeiQueues>) -> Self {
        self.sei = Some(table);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Keep the current connection only; never start a second one
    pub fn set_dont_reconnect(&self, enabled: bool) {
        tracing::info!(sink = %self.id, enabled, "Dont reconnect");
        self.shared.dont_reconnect.store(enabled, Ordering::SeqCst);
    }

    pub fn request_key_frame(&self) {
        self.shared.key_frame.store(true, Ordering::SeqCst);
    }

    /// Select the SEI queue appended to outgoing video; `None` stops injection
    pub fn set_sei_key(&self, key: Option<String>) {
        tracing::debug!(sink = %self.id, key = ?key, "SEI key");
        *self.shared.sei_key.lock() = key;
    }

    pub fn stats(&self) -> SinkStats {
        let mut stats = self.shared.stats.lock().clone();
        stats.bytes_sent = self.shared.bytes.total();
        stats
    }

    fn spawn(&self) -> std::io::Result<(CancelToken, JoinHandle<()>)> {
        let cancel = CancelToken::new();
        let worker = Worker {
            id: self.id.clone(),
            url: self.url.clone(),
            config: self.config.clone(),
            codecs: self.codecs.clone(),
            transports: self.transports.clone(),
            sei: self.sei.clone(),
            observer: self.observer.clone(),
            shared: self.shared.clone(),
            cancel: cancel.clone(),
            video_q: SharedQueue::new(self.config.packet_queue_depth),
            audio_q: SharedQueue::new(self.config.packet_queue_depth),
        };
        let handle = std::thread::Builder::new()
            .name(format!("sink-{}", self.id))
            .spawn(move || worker.run())?;
        Ok((cancel, handle))
    }

    fn count_drop(&self, kind: StreamKind) {
        self.shared.stats.lock().dropped_frames += 1;
        tracing::trace!(sink = %self.id, kind = ?kind, "Muxed queue full, frame dropped");
    }
}

impl FrameSink for RtmpSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_frame(&self, frame: &SharedFrame) {
        match frame.kind() {
            StreamKind::Audio => {
                let Some(audio) = frame.as_audio() else {
                    return;
                };
                let chunks = match self.shared.resampler.lock().resample_timed(frame.pts, audio) {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        tracing::warn!(sink = %self.id, error = %e, "Audio resample failed");
                        return;
                    }
                };
                for (pts, chunk) in chunks {
                    let shared = MediaFrame::audio(Codec::Pcm, pts, chunk).shared();
                    if !self.shared.muxed.try_push(shared) {
                        self.count_drop(StreamKind::Audio);
                    }
                }
            }
            StreamKind::Video => {
                if !self.shared.muxed.try_push(frame.clone()) {
                    self.count_drop(StreamKind::Video);
                }
            }
            StreamKind::Raw => {}
        }
    }

    fn on_start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        match self.spawn() {
            Ok(handle) => {
                tracing::info!(sink = %self.id, url = %self.url, "Sink started");
                *worker = Some(handle);
            }
            Err(e) => tracing::error!(sink = %self.id, error = %e, "Failed to spawn sink thread"),
        }
    }

    fn on_stop(&self) {
        let Some((cancel, handle)) = self.worker.lock().take() else {
            return;
        };
        cancel.cancel();
        if handle.join().is_err() {
            tracing::error!(sink = %self.id, "Sink thread panicked");
        }
        self.shared.muxed.clear();
        tracing::info!(sink = %self.id, "Sink stopped");
    }

    fn stat_bytes(&self) -> u64 {
        self.shared.bytes.take()
    }
}

impl Drop for RtmpSink {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.worker.lock().as_ref() {
            cancel.cancel();
        }
    }
}

impl std::fmt::Debug for RtmpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtmpSink")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Queue to send from next: the older head by DTS, video on ties
pub(crate) fn next_kind(video: Option<i64>, audio: Option<i64>) -> Option<StreamKind> {
    match (video, audio) {
        (Some(v), Some(a)) if v <= a => Some(StreamKind::Video),
        (Some(_), Some(_)) => Some(StreamKind::Audio),
        (Some(_), None) => Some(StreamKind::Video),
        (None, Some(_)) => Some(StreamKind::Audio),
        (None, None) => None,
    }
}

struct Worker {
    id: String,
    url: String,
    config: SinkConfig,
    codecs: Arc<dyn CodecFactory>,
    transports: Arc<dyn TransportFactory>,
    sei: Option<Arc<SeiQueues>>,
    observer: Option<Arc<dyn StatusObserver>>,
    shared: Arc<Shared>,
    cancel: CancelToken,
    video_q: SharedQueue<MediaPacket>,
    audio_q: SharedQueue<MediaPacket>,
}

impl Worker {
    fn run(self) {
        while !self.cancel.is_cancelled() {
            let mut sender = RtmpSender::new(&self.url, self.config.sender.clone(), self.transports.clone())
                .with_counter(self.shared.bytes.clone());
            if let Some(observer) = &self.observer {
                sender = sender.with_observer(&self.id, observer.clone());
            }
            let mut video = Encoder::new(self.codecs.clone(), self.config.video_params());
            if let Some(table) = &self.sei {
                video = video.with_sei(table.clone());
            }
            let mut audio = Encoder::new(self.codecs.clone(), self.config.audio_params());

            if let Err(e) = self.generation(&mut sender, &mut video, &mut audio) {
                tracing::error!(sink = %self.id, error = %e, "Sender failed, reconnecting");
                self.video_q.clear();
                self.audio_q.clear();
                self.shared.stats.lock().reconnects += 1;
                self.notify(SinkStatus::Reconnecting);
            }
            if !self.cancel.sleep(self.config.idle_interval) {
                break;
            }
        }
        self.notify(SinkStatus::Stopped);
    }

    /// Encode and send until cancelled; an error ends this sender generation
    fn generation(&self, sender: &mut RtmpSender, video: &mut Encoder, audio: &mut Encoder) -> Result<()> {
        while !self.cancel.is_cancelled() {
            let dont_reconnect = self.shared.dont_reconnect.load(Ordering::SeqCst);
            sender.set_dont_reconnect(dont_reconnect);
            if self.shared.key_frame.swap(false, Ordering::SeqCst) {
                video.request_key_frame();
            }
            video.set_sei_key(self.shared.sei_key.lock().clone());

            let Some(frame) = self.shared.muxed.pop_timeout(POP_TIMEOUT) else {
                continue;
            };
            let result = self.encode(&frame, video, audio).and_then(|_| self.drain(sender));
            match result {
                Ok(()) => {}
                Err(e) if dont_reconnect => {
                    tracing::error!(sink = %self.id, error = %e, "Send failed, not reconnecting");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn encode(&self, frame: &MediaFrame, video: &mut Encoder, audio: &mut Encoder) -> Result<()> {
        let (encoder, queue) = match frame.kind() {
            StreamKind::Video => (video, &self.video_q),
            StreamKind::Audio => (audio, &self.audio_q),
            StreamKind::Raw => return Ok(()),
        };
        encoder.encode(frame, |packet| {
            if !queue.try_push(packet) {
                tracing::warn!(sink = %self.id, "Packet queue full, packet dropped");
            }
            Ok(())
        })
    }

    fn drain(&self, sender: &mut RtmpSender) -> Result<()> {
        while self.video_q.len() + self.audio_q.len() > self.config.send_backlog {
            let video_dts = self.video_q.peek().map(|p| p.dts);
            let audio_dts = self.audio_q.peek().map(|p| p.dts);
            let packet = match next_kind(video_dts, audio_dts) {
                Some(StreamKind::Video) => self.video_q.try_pop(),
                Some(_) => self.audio_q.try_pop(),
                None => None,
            };
            let Some(packet) = packet else {
                break;
            };
            sender.send(&packet)?;
            let mut stats = self.shared.stats.lock();
            match packet.kind {
                StreamKind::Video => stats.video_packets += 1,
                _ => stats.audio_packets += 1,
            }
            if packet.keyframe {
                stats.keyframes += 1;
            }
        }
        Ok(())
    }

    fn notify(&self, status: SinkStatus) {
        if let Some(observer) = &self.observer {
            observer.on_status(&self.id, status);
        }
    }
}
