//! Audio/video muxer
//!
//! An [`AvMuxer`] owns a set of [`Input`]s and [`Output`]s and runs two
//! threads:
//!
//! ```text
//!  video loop, every 1/fps:
//!      inputs (not hidden) ─ get_video ─► VideoMuxer ─► outputs (pts = now - start)
//!
//!  audio loop, every 1024/48000 s:
//!      while drift > frame:
//!          inputs (not muted) ─ get_audio_latest(20) ─► AudioMixer ─► outputs
//! ```
//!
//! Both loops sleep through the muxer's [`CancelToken`], so `stop` returns
//! promptly.

pub mod config;
pub mod output;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::compose::{AudioMixer, VideoMuxer};
use crate::frame::{Codec, MediaFrame, SharedFrame, AUDIO_FRAME_SAMPLES, CANONICAL_SAMPLE_RATE};
use crate::input::Input;
use crate::options::{keys, OptionMap, OptionValue};
use crate::stream::FrameProducer;
use crate::sync::{CancelToken, Clock, SharedQueue, SystemClock};

pub use config::MuxerConfig;
pub use output::Output;

/// Wall-clock drift accounting for the audio loop
#[derive(Debug)]
struct AudioTimeline {
    last: Duration,
    drift: f64,
    /// Frames produced so far
    frames: i64,
}

impl AudioTimeline {
    fn new(start: Duration) -> Self {
        Self {
            last: start,
            drift: 0.0,
            frames: 0,
        }
    }
}

fn audio_frame_duration() -> f64 {
    AUDIO_FRAME_SAMPLES as f64 / CANONICAL_SAMPLE_RATE as f64
}

pub struct AvMuxer {
    id: String,
    config: MuxerConfig,
    options: OptionMap,
    inputs: SharedQueue<Arc<Input>>,
    outputs: SharedQueue<Arc<Output>>,
    input_keys: Mutex<HashMap<String, String>>,
    video: Mutex<VideoMuxer>,
    mixer: AudioMixer,
    fps: AtomicU32,
    audio_only: AtomicBool,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AvMuxer {
    pub fn new(id: impl Into<String>, config: MuxerConfig) -> Arc<Self> {
        Self::with_clock(id, config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(id: impl Into<String>, config: MuxerConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let video = VideoMuxer::new(config.width, config.height).with_blank_threshold(config.blank_frame_threshold);
        Arc::new(Self {
            id: id.into(),
            fps: AtomicU32::new(config.fps.max(1)),
            audio_only: AtomicBool::new(config.audio_only),
            config,
            options: OptionMap::new(),
            inputs: SharedQueue::unbounded(),
            outputs: SharedQueue::unbounded(),
            input_keys: Mutex::new(HashMap::new()),
            video: Mutex::new(video),
            mixer: AudioMixer::new(),
            clock,
            cancel: CancelToken::new(),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &MuxerConfig {
        &self.config
    }

    /// Muxer-level options (`bg`)
    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::Relaxed)
    }

    /// Change the composite frame rate; zero is ignored
    pub fn set_fps(&self, fps: u32) {
        if fps > 0 {
            self.fps.store(fps, Ordering::Relaxed);
        }
    }

    pub fn is_audio_only(&self) -> bool {
        self.audio_only.load(Ordering::Relaxed)
    }

    pub fn set_audio_only(&self, audio_only: bool) {
        self.audio_only.store(audio_only, Ordering::Relaxed);
    }

    /// Spawn the video and audio loops
    pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            tracing::warn!(muxer = %self.id, "Muxer already started");
            return Ok(());
        }
        let start = self.clock.now();
        tracing::info!(
            muxer = %self.id,
            width = self.config.width,
            height = self.config.height,
            fps = self.fps(),
            audio_only = self.is_audio_only(),
            "Muxer started"
        );

        let muxer = self.clone();
        workers.push(
            std::thread::Builder::new()
                .name(format!("mux-video-{}", self.id))
                .spawn(move || muxer.video_loop(start))?,
        );
        let muxer = self.clone();
        workers.push(
            std::thread::Builder::new()
                .name(format!("mux-audio-{}", self.id))
                .spawn(move || muxer.audio_loop(start))?,
        );
        Ok(())
    }

    /// Cancel and join both loops, then stop every input
    pub fn stop(&self) {
        self.cancel.cancel();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!(muxer = %self.id, "Muxer thread panicked");
            }
        }
        let inputs = self.inputs.critical_section(|items| items.drain(..).collect::<Vec<_>>());
        for input in inputs {
            input.stop();
        }
        tracing::info!(muxer = %self.id, "Muxer stopped");
    }

    fn video_loop(&self, start: Duration) {
        while !self.cancel.is_cancelled() {
            if !self.is_audio_only() {
                self.mux_video(start);
            }
            let interval = Duration::from_secs_f64(1.0 / self.fps() as f64);
            if !self.clock.sleep(interval, &self.cancel) {
                break;
            }
        }
    }

    fn audio_loop(&self, start: Duration) {
        let mut timeline = AudioTimeline::new(start);
        let frame = Duration::from_secs_f64(audio_frame_duration());
        while !self.cancel.is_cancelled() {
            self.mux_audio(&mut timeline);
            if !self.clock.sleep(frame, &self.cancel) {
                break;
            }
        }
    }

    /// Compose one canvas from the visible inputs
    fn mux_video(&self, start: Duration) {
        let frames: Vec<_> = self
            .inputs
            .snapshot()
            .into_iter()
            .filter(|input| !input.options().is_true(keys::HIDDEN))
            .filter_map(|input| input.get_video())
            .map(Some)
            .collect();

        let composed = {
            let mut video = self.video.lock();
            if let Some(rgb) = self.options.get_int(keys::BACKGROUND) {
                video.set_background(rgb as u32);
            }
            video.mux(&frames)
        };

        if let Some(canvas) = composed {
            let pts = self.clock.now().saturating_sub(start).as_millis() as i64;
            self.feed_outputs(MediaFrame::video(Codec::RawVideo, pts, canvas).shared());
        }
    }

    /// Emit as many mixed frames as wall-clock drift calls for
    fn mux_audio(&self, timeline: &mut AudioTimeline) -> usize {
        let frame_duration = audio_frame_duration();
        let now = self.clock.now();
        timeline.drift += now.saturating_sub(timeline.last).as_secs_f64();
        timeline.last = now;

        let mut produced = 0;
        while timeline.drift > frame_duration {
            let frames: Vec<_> = self
                .inputs
                .snapshot()
                .into_iter()
                .filter(|input| !input.options().is_true(keys::MUTED))
                .filter_map(|input| input.get_audio_latest(self.config.audio_latest_limit))
                .map(Some)
                .collect();

            let mixed = self.mixer.mix(&frames);
            let pts = timeline.frames * AUDIO_FRAME_SAMPLES as i64 * 1000 / CANONICAL_SAMPLE_RATE as i64;
            self.feed_outputs(MediaFrame::audio(Codec::Pcm, pts, mixed).shared());

            timeline.frames += 1;
            timeline.drift -= frame_duration;
            produced += 1;
        }
        produced
    }

    /// Push to every output outside the queue lock
    fn feed_outputs(&self, frame: SharedFrame) {
        for output in self.outputs.snapshot() {
            output.push(frame.clone());
        }
    }

    /// Add an input, replacing any input with the same name
    pub fn add_input(&self, input: Arc<Input>) {
        if let Some(old) = self.remove_input(input.name()) {
            tracing::debug!(muxer = %self.id, input = %old.name(), "Replaced input");
        }
        tracing::info!(muxer = %self.id, input = %input.name(), "Input added");
        self.inputs.push(input);
    }

    /// Remove and stop the named input
    pub fn remove_input(&self, name: &str) -> Option<Arc<Input>> {
        let removed = self.inputs.critical_section(|items| {
            let pos = items.iter().position(|i| i.name() == name)?;
            items.remove(pos)
        })?;
        removed.stop();
        tracing::info!(muxer = %self.id, input = %name, "Input removed");
        Some(removed)
    }

    pub fn find_input(&self, name: &str) -> Option<Arc<Input>> {
        self.inputs.find_if(|i| i.name() == name)
    }

    /// Swap the whole input set; returns the inputs that were dropped
    pub fn replace_all_inputs(&self, inputs: Vec<Arc<Input>>) -> Vec<Arc<Input>> {
        let old = self.inputs.critical_section(|items| {
            let old: Vec<_> = items.drain(..).collect();
            for input in inputs {
                items.push_front(input);
            }
            old
        });
        for input in &old {
            input.stop();
        }
        tracing::info!(muxer = %self.id, replaced = old.len(), inputs = self.inputs.len(), "Inputs replaced");
        old
    }

    pub fn input_names(&self) -> Vec<String> {
        self.inputs.snapshot().iter().map(|i| i.name().to_string()).collect()
    }

    pub fn set_input_option(&self, name: &str, key: &str, value: OptionValue) -> bool {
        match self.find_input(name) {
            Some(input) => {
                input.options().set(key, value);
                true
            }
            None => false,
        }
    }

    pub fn del_input_option(&self, name: &str, key: &str) -> bool {
        match self.find_input(name) {
            Some(input) => {
                input.options().remove(key);
                true
            }
            None => false,
        }
    }

    /// Associate an input with its SEI key
    pub fn set_input_key(&self, name: &str, key: impl Into<String>) {
        self.input_keys.lock().insert(name.to_string(), key.into());
    }

    pub fn input_key(&self, name: &str) -> Option<String> {
        self.input_keys.lock().get(name).cloned()
    }

    pub fn remove_input_key(&self, name: &str) -> Option<String> {
        self.input_keys.lock().remove(name)
    }

    pub fn add_output(&self, name: impl Into<String>, producer: Arc<dyn FrameProducer>) -> Arc<Output> {
        let output = Arc::new(Output::new(name, producer));
        self.outputs.push(output.clone());
        output
    }

    pub fn find_output(&self, name: &str) -> Option<Arc<Output>> {
        self.outputs.find_if(|o| o.name() == name)
    }

    pub fn set_output_option(&self, name: &str, key: &str, value: OptionValue) -> bool {
        match self.find_output(name) {
            Some(output) => {
                output.options().set(key, value);
                true
            }
            None => false,
        }
    }

    pub fn remove_output(&self, name: &str) -> bool {
        self.outputs.critical_section(|items| {
            let before = items.len();
            items.retain(|o| o.name() != name);
            items.len() != before
        })
    }
}

impl Drop for AvMuxer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for AvMuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvMuxer")
            .field("id", &self.id)
            .field("width", &self.config.width)
            .field("height", &self.config.height)
            .field("inputs", &self.inputs.len())
            .finish()
    }
}
