//! Muxer inputs
//!
//! An [`Input`] normalizes frames from one source for the compositor:
//!
//! ```text
//!  URL ──► Demuxer ──► Decoder ─┐
//!                               ├─► set_video ─► rescale, stamp x/y/z ─► video queue (1)
//!  Stream ──► InputSink ────────┤                                        └─► input stream
//!                               └─► set_audio ─► resample ─► audio queue (100)
//!                                                            └─► input stream
//! ```
//!
//! The muxer reads back with [`Input::get_video`] (sticky: the last picture
//! is repeated while no new one arrives) and [`Input::get_audio_latest`].

pub mod config;
pub mod pacing;
pub mod source;

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::codec::{CodecFactory, Decoder};
use crate::frame::{
    AudioFrame, Codec, MediaFrame, PixelFormat, SharedFrame, StreamKind, AUDIO_FRAME_SAMPLES,
    CANONICAL_SAMPLE_RATE, MAX_DIMENSION,
};
use crate::options::{keys, OptionMap};
use crate::stream::{FrameProducer, FrameSink, SinkRegistry, Stream};
use crate::sync::{CancelToken, Clock, SharedQueue, SystemClock};
use crate::transform::{AudioResampler, VideoRescaler};

pub use config::InputConfig;
pub use pacing::NativeRatePacer;
pub use source::{
    DefaultSourceOpener, Demuxer, FileSourceOpener, FlvDemuxer, RtmpDemuxer, RtmpSourceOpener, SourceOpener,
};

/// Target size from an option value; zero keeps the source size
fn dimension(value: i64, source: u32) -> Option<u32> {
    if value == 0 {
        return Some(source);
    }
    u32::try_from(value).ok().filter(|v| *v <= MAX_DIMENSION)
}

fn offset(value: i64) -> i32 {
    value.clamp(-i64::from(i32::MAX), i64::from(i32::MAX)) as i32
}

/// Input lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Created,
    Receiving,
    Stopped,
}

pub struct Input {
    name: String,
    config: InputConfig,
    options: OptionMap,
    video_q: SharedQueue<SharedFrame>,
    audio_q: SharedQueue<SharedFrame>,
    last_video: Mutex<Option<SharedFrame>>,
    rescaler: Mutex<Option<VideoRescaler>>,
    resampler: Mutex<AudioResampler>,
    stream: Arc<Stream>,
    state: Mutex<InputState>,
    cancel: CancelToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    upstream: Mutex<Option<(Arc<dyn SinkRegistry>, String)>>,
    clock: Arc<dyn Clock>,
}

impl Input {
    pub fn new(name: impl Into<String>, config: InputConfig) -> Arc<Self> {
        Self::with_clock(name, config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(name: impl Into<String>, config: InputConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            stream: Arc::new(Stream::new(name.clone())),
            video_q: SharedQueue::new(config.video_queue_depth),
            audio_q: SharedQueue::new(config.audio_queue_depth),
            name,
            config,
            options: OptionMap::new(),
            last_video: Mutex::new(None),
            rescaler: Mutex::new(None),
            resampler: Mutex::new(AudioResampler::new()),
            state: Mutex::new(InputState::Created),
            cancel: CancelToken::new(),
            worker: Mutex::new(None),
            upstream: Mutex::new(None),
            clock,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    /// Frames after normalization are republished here
    pub fn stream(&self) -> &Arc<Stream> {
        &self.stream
    }

    pub fn state(&self) -> InputState {
        *self.state.lock()
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Pull `url` on a dedicated thread until stopped
    pub fn start_url(
        self: &Arc<Self>,
        url: &str,
        opener: Arc<dyn SourceOpener>,
        codecs: Arc<dyn CodecFactory>,
    ) -> std::io::Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() || self.state() != InputState::Created {
            tracing::warn!(input = %self.name, "Input already started");
            return Ok(());
        }
        let input = self.clone();
        let url = url.to_string();
        let handle = std::thread::Builder::new()
            .name(format!("input-{}", self.name))
            .spawn(move || input.receive_loop(&url, opener, codecs))?;
        *worker = Some(handle);
        *self.state.lock() = InputState::Receiving;
        Ok(())
    }

    /// Follow an existing stream; no thread of its own
    pub fn start_stream(self: &Arc<Self>, upstream: Arc<dyn SinkRegistry>) {
        let sink_id = format!("input-{}-{}", self.name, uuid::Uuid::new_v4().simple());
        let sink = Arc::new(InputSink {
            id: sink_id.clone(),
            input: Arc::downgrade(self),
        });
        upstream.add_sink(sink);
        *self.upstream.lock() = Some((upstream, sink_id));
        *self.state.lock() = InputState::Receiving;
    }

    /// Cancel, join the receive thread and leave the upstream stream
    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!(input = %self.name, "Input thread panicked");
            }
        }
        if let Some((upstream, sink_id)) = self.upstream.lock().take() {
            upstream.remove_sink(&sink_id);
        }
        let mut state = self.state.lock();
        if *state != InputState::Stopped {
            tracing::info!(input = %self.name, "Input stopped");
            *state = InputState::Stopped;
        }
    }

    fn receive_loop(&self, url: &str, opener: Arc<dyn SourceOpener>, codecs: Arc<dyn CodecFactory>) {
        tracing::info!(input = %self.name, url = %url, "Input receiving");
        let mut pacer = NativeRatePacer::new();

        while !self.cancel.is_cancelled() {
            let mut demuxer = match opener.open(url, self.config.stall_timeout) {
                Ok(demuxer) => demuxer,
                Err(e) => {
                    tracing::warn!(input = %self.name, url = %url, error = %e, "Could not open source");
                    self.cancel.sleep(self.config.retry_backoff);
                    continue;
                }
            };

            let mut video_decoder = Decoder::new(codecs.clone());
            let mut audio_decoder = Decoder::new(codecs.clone());
            let mut delivered = 0usize;

            while !self.cancel.is_cancelled() {
                let packet = match demuxer.read_packet() {
                    Ok(Some(packet)) => packet,
                    Ok(None) => {
                        tracing::info!(input = %self.name, packets = delivered, "Source ended");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(input = %self.name, error = %e, "Source read failed");
                        delivered = 0;
                        break;
                    }
                };
                delivered += 1;

                let decoder = match packet.kind {
                    StreamKind::Video => &mut video_decoder,
                    StreamKind::Audio => &mut audio_decoder,
                    StreamKind::Raw => continue,
                };
                let result = decoder.decode(&packet, |frame| self.on_decoded(frame, &mut pacer));
                if let Err(e) = result {
                    tracing::warn!(input = %self.name, codec = packet.codec.name(), error = %e, "Decode failed");
                }
            }

            if delivered == 0 {
                self.cancel.sleep(self.config.retry_backoff);
            }
        }
        tracing::debug!(input = %self.name, "Receive loop exited");
    }

    fn on_decoded(&self, frame: MediaFrame, pacer: &mut NativeRatePacer) -> ControlFlow<()> {
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        if self.config.native_rate && !pacer.pace(frame.pts, self.clock.as_ref(), &self.cancel) {
            return ControlFlow::Break(());
        }
        if self.config.single_frame && frame.kind() == StreamKind::Video {
            self.repeat_single_frame(&frame);
            return ControlFlow::Break(());
        }
        match frame.kind() {
            StreamKind::Video => self.set_video(frame.shared()),
            StreamKind::Audio => self.set_audio(frame.shared()),
            StreamKind::Raw => {}
        }
        ControlFlow::Continue(())
    }

    /// Re-send `frame` every interval with silent audio alongside, until cancelled
    fn repeat_single_frame(&self, frame: &MediaFrame) {
        let interval = self.config.single_frame_interval;
        let step = interval.as_millis() as i64;
        let start = self.clock.now();
        let (mut vpts, mut audio_frames) = (0i64, 0i64);
        tracing::info!(input = %self.name, "Single-frame mode");

        while !self.cancel.is_cancelled() {
            self.set_video(frame.with_pts(vpts).shared());

            let elapsed = self.clock.now().saturating_sub(start).as_millis() as i64;
            loop {
                let apts = audio_frames * AUDIO_FRAME_SAMPLES as i64 * 1000 / CANONICAL_SAMPLE_RATE as i64;
                if apts >= elapsed {
                    break;
                }
                self.set_audio(MediaFrame::audio(Codec::Pcm, apts, AudioFrame::silent()).shared());
                audio_frames += 1;
            }

            if !self.clock.sleep(interval, &self.cancel) {
                break;
            }
            vpts += step;
        }
    }

    pub fn set_video(&self, frame: SharedFrame) {
        let Some(video) = frame.as_video() else {
            return;
        };

        let mut out = video.clone();
        if self.config.rescale {
            let (Some(width), Some(height)) = (
                dimension(self.options.int_or(keys::WIDTH, 0), video.width),
                dimension(self.options.int_or(keys::HEIGHT, 0), video.height),
            ) else {
                tracing::warn!(input = %self.name, "Dropping frame, target size out of range");
                return;
            };
            let mode = self.options.stretch_mode();

            let mut rescaler = self.rescaler.lock();
            match rescaler.as_mut() {
                None => {
                    if width != video.width || height != video.height || video.format != PixelFormat::Yuv420p {
                        *rescaler = Some(VideoRescaler::new(width, height, mode, 0x000000));
                    }
                }
                Some(r) => {
                    if r.target_width() != width || r.target_height() != height || r.mode() != mode {
                        r.reset(width, height, mode);
                    }
                }
            }
            if let Some(r) = rescaler.as_mut() {
                match r.rescale(video) {
                    Ok(scaled) => out = scaled,
                    Err(e) => {
                        tracing::warn!(input = %self.name, error = %e, "Dropping frame that failed to rescale");
                        return;
                    }
                }
            }
        }

        let x = self.options.get_int(keys::X).map_or(video.x, offset);
        let y = self.options.get_int(keys::Y).map_or(video.y, offset);
        let z = self.options.get_int(keys::Z).map_or(video.z, offset);
        let stamped = MediaFrame::video(frame.codec, frame.pts, out.positioned(x, y, z)).shared();

        self.video_q.force_push(stamped.clone());
        self.stream.send_frame(stamped);
    }

    pub fn set_audio(&self, frame: SharedFrame) {
        let Some(audio) = frame.as_audio() else {
            return;
        };
        if !self.config.resample {
            self.audio_q.force_push(frame.clone());
            self.stream.send_frame(frame);
            return;
        }

        let outputs = match self.resampler.lock().resample_timed(frame.pts, audio) {
            Ok(outputs) => outputs,
            Err(e) => {
                tracing::warn!(input = %self.name, error = %e, "Dropping audio that failed to resample");
                return;
            }
        };
        for (pts, out) in outputs {
            let shared = MediaFrame::audio(Codec::Pcm, pts, out).shared();
            self.audio_q.force_push(shared.clone());
            self.stream.send_frame(shared);
        }
    }

    /// Newest picture, or the last one returned if nothing new arrived
    pub fn get_video(&self) -> Option<SharedFrame> {
        let mut last = self.last_video.lock();
        if let Some(frame) = self.video_q.try_pop() {
            *last = Some(frame);
        }
        last.clone()
    }

    /// Drop queued audio beyond `limit` frames, then pop the oldest
    pub fn get_audio_latest(&self, limit: usize) -> Option<SharedFrame> {
        let dropped = self.audio_q.critical_section(|items| {
            let excess = items.len().saturating_sub(limit);
            for _ in 0..excess {
                items.pop_back();
            }
            excess
        });
        if dropped > 0 {
            tracing::trace!(input = %self.name, dropped, "Discarded stale audio");
        }
        self.audio_q.try_pop()
    }

    pub fn get_audio(&self) -> Option<SharedFrame> {
        self.audio_q.try_pop()
    }

    pub fn audio_queue_len(&self) -> usize {
        self.audio_q.len()
    }
}

impl Drop for Input {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Routes frames from an upstream stream into an input
struct InputSink {
    id: String,
    input: Weak<Input>,
}

impl FrameSink for InputSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_frame(&self, frame: &SharedFrame) {
        let Some(input) = self.input.upgrade() else {
            return;
        };
        match frame.kind() {
            StreamKind::Video => input.set_video(frame.clone()),
            StreamKind::Audio => input.set_audio(frame.clone()),
            StreamKind::Raw => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RawCodecFactory;
    use crate::error::Result;
    use crate::frame::{MediaPacket, Picture};
    use crate::options::StretchMode;
    use crate::stream::tests::CollectSink;
    use crate::sync::ManualClock;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn picture(w: u32, h: u32, luma: u8) -> SharedFrame {
        let frame = Picture::filled(w, h, [luma, 128, 128], None).into_frame();
        MediaFrame::video(Codec::RawVideo, 0, frame).shared()
    }

    fn audio(pts: i64) -> SharedFrame {
        MediaFrame::audio(Codec::Pcm, pts, AudioFrame::silent()).shared()
    }

    #[test]
    fn test_sticky_video() {
        let input = Input::new("in", InputConfig::default());
        assert!(input.get_video().is_none());
        input.set_video(picture(8, 8, 50));
        let first = input.get_video().unwrap();
        let again = input.get_video().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(Arc::ptr_eq(&input.get_video().unwrap(), &first));

        input.set_video(picture(8, 8, 60));
        let next = input.get_video().unwrap();
        assert_eq!(next.as_video().unwrap().row(0, 0)[0], 60);
    }

    #[test]
    fn test_video_queue_keeps_newest() {
        let input = Input::new("in", InputConfig::default());
        input.set_video(picture(8, 8, 1));
        input.set_video(picture(8, 8, 2));
        input.set_video(picture(8, 8, 3));
        assert_eq!(input.get_video().unwrap().as_video().unwrap().row(0, 0)[0], 3);
    }

    #[test]
    fn test_set_video_rescales_and_stamps() {
        let input = Input::new("in", InputConfig::default());
        input.options().set_int(keys::WIDTH, 4);
        input.options().set_int(keys::HEIGHT, 4);
        input.options().set_int(keys::X, 10);
        input.options().set_int(keys::Z, 3);
        input.options().set_str(keys::STRETCH_MODE, StretchMode::ScaleToFit.as_str());
        input.set_video(picture(16, 8, 100));

        let frame = input.get_video().unwrap();
        let video = frame.as_video().unwrap();
        assert_eq!((video.width, video.height), (4, 4));
        assert_eq!((video.x, video.y, video.z), (10, 0, 3));
        assert_eq!(video.row(0, 3)[3], 100);
    }

    #[test]
    fn test_zero_size_uses_source() {
        let input = Input::new("in", InputConfig::default());
        input.options().set_int(keys::WIDTH, 0);
        input.set_video(picture(6, 4, 9));
        let frame = input.get_video().unwrap();
        assert_eq!(frame.as_video().unwrap().width, 6);
    }

    #[test]
    fn test_out_of_range_size_drops_frame() {
        let input = Input::new("in", InputConfig::default());
        input.options().set_int(keys::WIDTH, -4);
        input.options().set_int(keys::HEIGHT, -4);
        input.set_video(picture(8, 8, 1));
        assert!(input.get_video().is_none());

        input.options().set_int(keys::WIDTH, i64::from(MAX_DIMENSION) + 1);
        input.options().set_int(keys::HEIGHT, 8);
        input.set_video(picture(8, 8, 1));
        assert!(input.get_video().is_none());
    }

    #[test]
    fn test_offsets_saturate() {
        let input = Input::new("in", InputConfig::default());
        input.options().set_int(keys::X, i64::MIN);
        input.options().set_int(keys::Y, i64::MAX);
        input.set_video(picture(8, 8, 1));
        let frame = input.get_video().unwrap();
        let video = frame.as_video().unwrap();
        assert_eq!((video.x, video.y), (-i32::MAX, i32::MAX));
    }

    #[test]
    fn test_get_audio_latest_discards_stale() {
        let input = Input::new("in", InputConfig::default());
        for i in 0..30 {
            input.set_audio(audio(i * 21));
        }
        assert_eq!(input.audio_queue_len(), 30);
        let frame = input.get_audio_latest(20).unwrap();
        // ten oldest dropped, then the oldest remaining popped
        assert_eq!(frame.pts, 10 * 21);
        assert_eq!(input.audio_queue_len(), 19);
        assert_eq!(input.get_audio().unwrap().pts, 11 * 21);
    }

    #[test]
    fn test_audio_resampled_to_canonical_frames() {
        let input = Input::new("in", InputConfig::default());
        let mono = AudioFrame::from_s16(&vec![100i16; 1600], 16000, 1);
        input.set_audio(MediaFrame::audio(Codec::Pcm, 0, mono).shared());
        // 1600 samples at 16 kHz are 4800 at 48 kHz: four full frames
        assert_eq!(input.audio_queue_len(), 4);
        let frame = input.get_audio().unwrap();
        assert!(frame.as_audio().unwrap().is_canonical());
        assert_eq!(frame.as_audio().unwrap().nb_samples, 1024);
    }

    #[test]
    fn test_start_stream_follows_upstream() {
        let upstream = Arc::new(Stream::new("peer"));
        let input = Input::new("in", InputConfig::default());
        let observer = CollectSink::new("obs");
        input.stream().add_sink(observer.clone());

        input.start_stream(upstream.clone());
        assert_eq!(upstream.sink_count(), 1);
        upstream.send_frame(picture(8, 8, 77));
        upstream.send_frame(audio(0));
        assert!(input.get_video().is_some());
        assert_eq!(observer.frames.lock().len(), 2);

        input.stop();
        assert_eq!(upstream.sink_count(), 0);
        assert_eq!(input.state(), InputState::Stopped);
    }

    #[test]
    fn test_single_frame_mode() {
        let clock = Arc::new(ManualClock::new());
        let config = InputConfig::default().single_frame(true);
        let input = Input::with_clock("pic", config, clock.clone());

        struct StopAt {
            token: CancelToken,
            frames: Mutex<Vec<SharedFrame>>,
        }
        impl FrameSink for StopAt {
            fn id(&self) -> &str {
                "stop-at"
            }
            fn on_frame(&self, frame: &SharedFrame) {
                self.frames.lock().push(frame.clone());
                if frame.kind() == StreamKind::Video && frame.pts >= 500 {
                    self.token.cancel();
                }
            }
        }
        let sink = Arc::new(StopAt {
            token: input.cancel_token().clone(),
            frames: Mutex::new(Vec::new()),
        });
        input.stream().add_sink(sink.clone());

        let source = MediaFrame::video(Codec::RawVideo, 1234, Picture::filled(8, 8, [90, 128, 128], None).into_frame());
        let mut pacer = NativeRatePacer::new();
        assert!(input.on_decoded(source, &mut pacer).is_break());

        let frames = sink.frames.lock();
        let video: Vec<_> = frames.iter().filter(|f| f.kind() == StreamKind::Video).collect();
        let audio: Vec<_> = frames.iter().filter(|f| f.kind() == StreamKind::Audio).collect();

        // cancellation lands on the 520 ms picture
        assert_eq!(video.len(), 14);
        for (i, frame) in video.iter().enumerate() {
            assert_eq!(frame.pts, i as i64 * 40);
            assert_eq!(frame.as_video(), video[0].as_video());
        }
        assert!(!audio.is_empty());
        // pts follow the sample count, not a rounded 21 ms step
        for (i, frame) in audio.iter().enumerate() {
            assert_eq!(frame.pts, i as i64 * 1024 * 1000 / 48000);
        }
        let last_audio = audio.last().unwrap().pts;
        let last_video = video.last().unwrap().pts;
        assert!((last_video - last_audio).abs() <= 40);
        assert_eq!(clock.now(), Duration::from_millis(520));
    }

    struct ScriptedDemuxer {
        packets: VecDeque<MediaPacket>,
    }

    impl Demuxer for ScriptedDemuxer {
        fn read_packet(&mut self) -> Result<Option<MediaPacket>> {
            Ok(self.packets.pop_front())
        }
    }

    struct ScriptedOpener {
        opens: AtomicUsize,
    }

    impl SourceOpener for ScriptedOpener {
        fn open(&self, _url: &str, _stall: Duration) -> Result<Box<dyn Demuxer>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let pcm = AudioFrame::from_s16(&vec![5i16; 2048], 48000, 2).data[0].clone();
            let mut packets = VecDeque::new();
            packets.push_back(MediaPacket::audio(Codec::Pcm, 0, pcm).audio_params(48000, 2));
            packets.push_back(
                MediaPacket::video(Codec::RawVideo, 0, 0, vec![16u8; 8 * 8 + 2 * 16]).dimensions(8, 8),
            );
            Ok(Box::new(ScriptedDemuxer { packets }))
        }
    }

    struct StalledDemuxer;

    impl Demuxer for StalledDemuxer {
        fn read_packet(&mut self) -> Result<Option<MediaPacket>> {
            Err(crate::error::Error::Timeout)
        }
    }

    /// Stalls on the first connection, then delivers
    struct FlakyOpener {
        inner: ScriptedOpener,
        stalls: Mutex<Vec<Duration>>,
    }

    impl SourceOpener for FlakyOpener {
        fn open(&self, url: &str, stall: Duration) -> Result<Box<dyn Demuxer>> {
            let mut stalls = self.stalls.lock();
            stalls.push(stall);
            if stalls.len() == 1 {
                return Ok(Box::new(StalledDemuxer));
            }
            self.inner.open(url, stall)
        }
    }

    #[test]
    fn test_stalled_source_reopened() {
        let config = InputConfig::default()
            .stall_timeout(Duration::from_millis(300))
            .retry_backoff(Duration::from_millis(10));
        let input = Input::new("live", config);
        let opener = Arc::new(FlakyOpener {
            inner: ScriptedOpener {
                opens: AtomicUsize::new(0),
            },
            stalls: Mutex::new(Vec::new()),
        });
        input.start_url("rtmp://host/live/a", opener.clone(), Arc::new(RawCodecFactory)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while input.get_video().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let resumed = input.get_video().is_some();
        input.stop();

        assert!(resumed);
        let stalls = opener.stalls.lock();
        assert!(stalls.len() >= 2);
        assert!(stalls.iter().all(|d| *d == Duration::from_millis(300)));
        assert!(opener.inner.opens.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_url_receive_thread() {
        let input = Input::new("file", InputConfig::default());
        let opener = Arc::new(ScriptedOpener {
            opens: AtomicUsize::new(0),
        });
        input.start_url("scripted://a", opener.clone(), Arc::new(RawCodecFactory)).unwrap();
        assert_eq!(input.state(), InputState::Receiving);

        let deadline = Instant::now() + Duration::from_secs(5);
        while input.get_video().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(input.get_video().is_some());
        assert!(opener.opens.load(Ordering::SeqCst) >= 1);

        input.stop();
        assert_eq!(input.state(), InputState::Stopped);
    }
}
